//! XMLTV timestamp helpers
//!
//! Guide timestamps look like `20230101120000 +0100`: fourteen digits of
//! local date-time followed by an optional zone suffix. The catalog stores
//! them as received (after hour correction) and compares on the leading
//! digits only.

use std::sync::OnceLock;

use chrono::{Duration, NaiveDateTime};
use regex::Regex;

use crate::config::HourCorrectionMode;

const XMLTV_FORMAT: &str = "%Y%m%d%H%M%S";

fn hour_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{10}").expect("valid hour prefix regex"))
}

fn full_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{14}").expect("valid timestamp regex"))
}

/// Format a date-time as the fourteen XMLTV digits, without zone
pub fn xmltv_timestamp(dt: NaiveDateTime) -> String {
    dt.format(XMLTV_FORMAT).to_string()
}

/// Parse the leading fourteen digits of an XMLTV timestamp
pub fn parse_xmltv_timestamp(ts: &str) -> Result<NaiveDateTime, String> {
    let digits = ts
        .get(..14)
        .filter(|d| full_prefix().is_match(d))
        .ok_or_else(|| format!("Invalid XMLTV timestamp: '{}'", ts))?;

    NaiveDateTime::parse_from_str(digits, XMLTV_FORMAT)
        .map_err(|e| format!("Invalid XMLTV timestamp '{}': {}", ts, e))
}

/// Shift the hour of an XMLTV timestamp by `hours`.
///
/// `InPlace` rewrites only the two hour digits with `(hour + hours) mod 24`,
/// so the date never moves even when the shift crosses midnight. `Carry`
/// shifts the whole date-time. The zone suffix is kept verbatim in both
/// modes.
pub fn apply_hour_correction(
    ts: &str,
    hours: i32,
    mode: HourCorrectionMode,
) -> Result<String, String> {
    if !hour_prefix().is_match(ts) {
        return Err(format!("Timestamp '{}' carries no hour", ts));
    }

    if hours == 0 {
        return Ok(ts.to_string());
    }

    match mode {
        HourCorrectionMode::InPlace => {
            let hour: i32 = ts[8..10]
                .parse()
                .map_err(|e| format!("Invalid hour in '{}': {}", ts, e))?;
            let corrected = (hour + hours.rem_euclid(24)).rem_euclid(24);
            Ok(format!("{}{:02}{}", &ts[..8], corrected, &ts[10..]))
        }
        HourCorrectionMode::Carry => {
            let dt = parse_xmltv_timestamp(ts)?;
            let shifted = dt
                .checked_add_signed(Duration::hours(i64::from(hours)))
                .ok_or_else(|| format!("Hour correction {} out of range for '{}'", hours, ts))?;
            Ok(format!("{}{}", xmltv_timestamp(shifted), &ts[14..]))
        }
    }
}
