//! Extended M3U line handling.
//!
//! A playlist entry is an `#EXTINF:<attributes>,<display name>` line, an
//! optional `#EXTGRP:<title>` line, then the playback URL. The attribute
//! portion is tokenized shell-style by [`split_attributes`]; the
//! [`RecordAssembler`] pairs entries with their URL lines and applies the
//! catalog defaults.

use crate::models::{NewStation, BLANK_LOGO};

const EXTINF_PREFIX: &str = "#EXTINF:";
const EXTGRP_PREFIX: &str = "#EXTGRP:";

/// Split an attribute string into whitespace separated tokens.
///
/// A backslash escapes the next character anywhere. An unescaped `"` opens
/// a quoted run in which whitespace is kept; the quotes themselves are
/// dropped, so `tvg-name="A B"` yields the token `tvg-name=A B`. A quoted
/// run that closes with nothing collected leaves the tokenizer idle.
pub fn split_attributes(input: &str) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Idle,
        Arg,
        QuotedArg,
    }

    let mut tokens = Vec::new();
    let mut arg = String::new();
    let mut state = State::Idle;
    let mut escape = false;

    for c in input.chars() {
        if !escape && c == '\\' {
            escape = true;
            continue;
        }

        let quote = !escape && c == '"';
        state = match state {
            State::Idle if quote => State::QuotedArg,
            State::Idle if escape || !c.is_whitespace() => {
                arg.push(c);
                State::Arg
            }
            State::Idle => State::Idle,
            State::Arg if quote => State::QuotedArg,
            State::Arg if escape || !c.is_whitespace() => {
                arg.push(c);
                State::Arg
            }
            State::Arg => {
                tokens.push(std::mem::take(&mut arg));
                State::Idle
            }
            State::QuotedArg if quote => {
                if arg.is_empty() {
                    State::Idle
                } else {
                    State::Arg
                }
            }
            State::QuotedArg => {
                arg.push(c);
                State::QuotedArg
            }
        };
        escape = false;
    }

    if !arg.is_empty() {
        tokens.push(arg);
    }

    tokens
}

/// Split the text after `#EXTINF:` at the first comma outside quotes.
///
/// Returns the attribute portion and the trimmed display name; the name is
/// empty when there is no such comma.
pub fn split_extinf(body: &str) -> (&str, &str) {
    let mut in_quotes = false;
    let mut escape = false;

    for (idx, c) in body.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match c {
            '\\' => escape = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return (&body[..idx], body[idx + 1..].trim()),
            _ => {}
        }
    }

    (body, "")
}

/// The recognised attributes of one `#EXTINF` line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtinfEntry {
    pub display_name: String,
    pub tvg_name: Option<String>,
    pub tvg_id: Option<String>,
    pub group_title: Option<String>,
    pub tvg_logo: Option<String>,
    pub tvg_chno: Option<String>,
}

impl ExtinfEntry {
    /// Parse an `#EXTINF:` line; `None` for any other line
    pub fn parse(line: &str) -> Option<Self> {
        let body = line.strip_prefix(EXTINF_PREFIX)?;
        let (attributes, display_name) = split_extinf(body);

        let mut entry = Self {
            display_name: display_name.to_string(),
            ..Self::default()
        };

        for token in split_attributes(attributes) {
            // The duration and other bare tokens carry no '='
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let slot = match key.trim() {
                "tvg-name" => &mut entry.tvg_name,
                "tvg-id" => &mut entry.tvg_id,
                "group-title" => &mut entry.group_title,
                "tvg-logo" => &mut entry.tvg_logo,
                "tvg-chno" => &mut entry.tvg_chno,
                _ => continue,
            };
            *slot = Some(value.to_string());
        }

        Some(entry)
    }

    /// Apply defaults and pair the entry with its playback URL
    pub fn into_record(
        self,
        url: &str,
        extgrp: Option<String>,
        ungrouped_title: &str,
    ) -> StationRecord {
        let group_title = self
            .group_title
            .or(extgrp)
            .unwrap_or_else(|| ungrouped_title.to_string());
        let channel_number = self
            .tvg_chno
            .and_then(|chno| chno.parse::<i64>().ok())
            .unwrap_or(0);

        StationRecord {
            station: NewStation {
                name: self.tvg_name.unwrap_or(self.display_name),
                epg_channel_id: self.tvg_id.unwrap_or_default(),
                logo: self.tvg_logo.unwrap_or_else(|| BLANK_LOGO.to_string()),
                url: url.to_string(),
            },
            group_title,
            channel_number,
        }
    }
}

/// One fully assembled playlist entry, ready for the resolver
#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    pub station: NewStation,
    pub group_title: String,
    pub channel_number: i64,
}

/// What a single input line contributed
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// A URL line completed a pending entry
    Record(StationRecord),
    /// A line that had to be dropped (URL without entry, superseded entry)
    Skipped(String),
}

/// True when `line` starts with one of the playback URL schemes
pub fn is_url_line(line: &str, schemes: &[String]) -> bool {
    schemes.iter().any(|scheme| line.starts_with(scheme.as_str()))
}

/// Normalise a raw line as read from the input
pub fn clean_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}

/// Pairs `#EXTINF` entries with the URL lines that follow them
#[derive(Debug)]
pub struct RecordAssembler {
    schemes: Vec<String>,
    ungrouped_title: String,
    pending: Option<ExtinfEntry>,
    pending_group: Option<String>,
}

impl RecordAssembler {
    pub fn new(schemes: Vec<String>, ungrouped_title: impl Into<String>) -> Self {
        Self {
            schemes,
            ungrouped_title: ungrouped_title.into(),
            pending: None,
            pending_group: None,
        }
    }

    pub fn push_line(&mut self, line: &str) -> Option<LineEvent> {
        if let Some(entry) = ExtinfEntry::parse(line) {
            let superseded = self.pending.replace(entry);
            self.pending_group = None;
            return superseded.map(|old| {
                LineEvent::Skipped(format!("entry '{}' has no URL", old.display_name))
            });
        }

        if let Some(title) = line.strip_prefix(EXTGRP_PREFIX) {
            let title = title.trim();
            if self.pending.is_some() && !title.is_empty() {
                self.pending_group = Some(title.to_string());
            }
            return None;
        }

        if !is_url_line(line, &self.schemes) {
            return None;
        }

        match self.pending.take() {
            Some(entry) => {
                let extgrp = self.pending_group.take();
                Some(LineEvent::Record(entry.into_record(
                    line,
                    extgrp,
                    &self.ungrouped_title,
                )))
            }
            None => Some(LineEvent::Skipped(format!("URL '{}' has no #EXTINF", line))),
        }
    }

    /// Flush an entry left without URL at end of input
    pub fn finish(&mut self) -> Option<LineEvent> {
        self.pending_group = None;
        self.pending
            .take()
            .map(|entry| LineEvent::Skipped(format!("entry '{}' has no URL", entry.display_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schemes() -> Vec<String> {
        vec!["http".to_string(), "rtp".to_string()]
    }

    #[test]
    fn test_split_attributes_quoted_values() {
        let tokens = split_attributes(
            r#"-1 tvg-name="Das Erste HD" tvg-id="ard.de" group-title="News""#,
        );
        assert_eq!(
            tokens,
            vec!["-1", "tvg-name=Das Erste HD", "tvg-id=ard.de", "group-title=News"]
        );
    }

    #[test]
    fn test_split_attributes_escapes() {
        assert_eq!(split_attributes(r#"a\ b c"#), vec!["a b", "c"]);
        assert_eq!(
            split_attributes(r#"tvg-name="say \"hi\"""#),
            vec![r#"tvg-name=say "hi""#]
        );
        assert_eq!(split_attributes(r#"x=a\\b"#), vec![r#"x=a\b"#]);
    }

    #[test]
    fn test_split_attributes_empty_quotes() {
        assert_eq!(split_attributes(r#""" a"#), vec!["a"]);
        assert_eq!(split_attributes(r#"k="" next"#), vec!["k=", "next"]);
        assert!(split_attributes("   ").is_empty());
    }

    #[test]
    fn test_split_extinf_ignores_quoted_commas() {
        let (attrs, name) = split_extinf(r#"-1 tvg-name="A, B" group-title="G", A, B "#);
        assert_eq!(attrs, r#"-1 tvg-name="A, B" group-title="G""#);
        assert_eq!(name, "A, B");

        let (attrs, name) = split_extinf("-1 tvg-id=x");
        assert_eq!(attrs, "-1 tvg-id=x");
        assert_eq!(name, "");
    }

    #[test]
    fn test_extinf_defaults() {
        let entry = ExtinfEntry::parse("#EXTINF:-1 foo=bar broken tvg-chno=abc,Display").unwrap();
        let record = entry.into_record("http://x/a", None, "Ungrouped");

        assert_eq!(record.station.name, "Display");
        assert_eq!(record.station.epg_channel_id, "");
        assert_eq!(record.station.logo, BLANK_LOGO);
        assert_eq!(record.group_title, "Ungrouped");
        assert_eq!(record.channel_number, 0);
    }

    #[test]
    fn test_extinf_attributes_win_over_defaults() {
        let line = concat!(
            r#"#EXTINF:-1 tvg-name="A" tvg-id="a.id" group-title="G" "#,
            r#"tvg-logo="http://l/a.png" tvg-chno="7",Shown"#
        );
        let record = ExtinfEntry::parse(line)
            .unwrap()
            .into_record("http://x/a", Some("Other".to_string()), "Ungrouped");

        assert_eq!(record.station.name, "A");
        assert_eq!(record.station.epg_channel_id, "a.id");
        assert_eq!(record.station.logo, "http://l/a.png");
        assert_eq!(record.group_title, "G");
        assert_eq!(record.channel_number, 7);
    }

    #[test]
    fn test_parse_rejects_other_lines() {
        assert!(ExtinfEntry::parse("#EXTM3U").is_none());
        assert!(ExtinfEntry::parse("http://x/a").is_none());
    }

    #[test]
    fn test_assembler_pairs_entries_and_urls() {
        let mut assembler = RecordAssembler::new(schemes(), "Ungrouped");

        assert_eq!(assembler.push_line("#EXTM3U"), None);
        assert_eq!(assembler.push_line("#EXTINF:-1,First"), None);
        assert_eq!(assembler.push_line("#EXTGRP:Movies"), None);

        match assembler.push_line("http://x/1") {
            Some(LineEvent::Record(record)) => {
                assert_eq!(record.station.name, "First");
                assert_eq!(record.group_title, "Movies");
            }
            other => panic!("expected record, got {:?}", other),
        }

        assert!(matches!(
            assembler.push_line("rtp://x/orphan"),
            Some(LineEvent::Skipped(_))
        ));
        assert_eq!(assembler.push_line("udp://ignored"), None);
    }

    #[test]
    fn test_assembler_drops_superseded_entries() {
        let mut assembler = RecordAssembler::new(schemes(), "Ungrouped");

        assert_eq!(assembler.push_line("#EXTINF:-1,Lost"), None);
        assert!(matches!(
            assembler.push_line("#EXTINF:-1,Kept"),
            Some(LineEvent::Skipped(_))
        ));
        assert!(matches!(
            assembler.push_line("http://x/kept"),
            Some(LineEvent::Record(_))
        ));

        assert_eq!(assembler.push_line("#EXTINF:-1,Dangling"), None);
        assert!(matches!(assembler.finish(), Some(LineEvent::Skipped(_))));
        assert_eq!(assembler.finish(), None);
    }

    #[test]
    fn test_clean_line_is_lossy() {
        assert_eq!(clean_line(b"http://x/a\r\n"), "http://x/a");
        assert_eq!(clean_line(b"  #EXTINF:-1,A\xff "), "#EXTINF:-1,A\u{fffd}");
    }
}
