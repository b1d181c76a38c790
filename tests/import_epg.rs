mod common;

use chrono::{NaiveDate, NaiveDateTime};
use common::*;
use m3u_catalog::config::{EpgConfig, EpgPurgeMode, HourCorrectionMode};
use m3u_catalog::database::Database;
use m3u_catalog::errors::{AppError, SourceError};
use m3u_catalog::ingestor::{EpgIngestor, IngestionStateManager};
use m3u_catalog::models::*;
use tokio_test::{assert_err, assert_ok};

const GUIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv generator-info-name="test">
  <channel id="a.id"><display-name>A</display-name></channel>
  <programme start="20230101100000 +0100" stop="20230101110000 +0100" channel="a.id">
    <title lang="en">Morning &amp; News</title>
    <desc>First slot</desc>
  </programme>
  <programme start="20230101110000 +0100" stop="20230101120000 +0100" channel="a.id">
    <title><![CDATA[Noon <Live>]]></title>
  </programme>
  <programme start="20230101110000 +0100" stop="20230101120000 +0100" channel="a.id">
    <title>Noon again</title>
  </programme>
  <programme start="20230101120000 +0100" stop="20230101130000 +0100" channel="b.id"/>
</tv>
"#;

fn epg_config(purge: EpgPurgeMode) -> EpgConfig {
    EpgConfig {
        hour_correction: 0,
        hour_correction_mode: HourCorrectionMode::InPlace,
        purge,
    }
}

fn noon() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

async fn import_epg(
    database: &Database,
    config: EpgConfig,
    xml: &str,
) -> Result<EpgSummary, AppError> {
    EpgIngestor::new(database.clone(), IngestionStateManager::new(), config)
        .ingest_at(xml.as_bytes(), noon())
        .await
}

#[tokio::test]
async fn test_duplicate_programmes_collapse_to_one_row() {
    let database = test_database().await;

    let summary = assert_ok!(import_epg(&database, epg_config(EpgPurgeMode::None), GUIDE).await);
    assert_eq!(summary.outcome, ImportOutcome::Completed);
    assert_eq!(summary.processed, 4);
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.failed, 0);

    let programs = assert_ok!(database.list_programs_for_channel("a.id").await);
    assert_eq!(programs.len(), 2);
    assert_eq!(programs[0].title, "Morning & News");
    assert_eq!(programs[0].description, "First slot");
    assert_eq!(programs[1].title, "Noon <Live>");

    let empty = assert_ok!(database.list_programs_for_channel("b.id").await);
    assert_eq!(empty[0].title, "");
}

#[tokio::test]
async fn test_reimporting_a_guide_is_idempotent() {
    let database = test_database().await;

    assert_ok!(import_epg(&database, epg_config(EpgPurgeMode::None), GUIDE).await);
    let summary = assert_ok!(import_epg(&database, epg_config(EpgPurgeMode::None), GUIDE).await);

    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.duplicates, 4);
    assert_eq!(assert_ok!(database.count_programs().await), 3);
}

#[tokio::test]
async fn test_purge_modes() {
    let database = test_database().await;
    assert_ok!(import_epg(&database, epg_config(EpgPurgeMode::None), GUIDE).await);

    // At noon only the 10:00-11:00 slot has stopped
    let summary =
        assert_ok!(import_epg(&database, epg_config(EpgPurgeMode::Elapsed), "<tv/>").await);
    assert_eq!(summary.purged, 1);
    assert_eq!(assert_ok!(database.count_programs().await), 2);

    let summary = assert_ok!(import_epg(&database, epg_config(EpgPurgeMode::All), GUIDE).await);
    assert_eq!(summary.purged, 2);
    assert_eq!(summary.inserted, 3);
    assert_eq!(assert_ok!(database.count_programs().await), 3);
}

#[tokio::test]
async fn test_hour_correction_modes() {
    let xml = r#"<tv>
      <programme start="20230101230000 +0000" stop="20230102000000 +0000" channel="c">
        <title>Late</title>
      </programme>
    </tv>"#;

    let database = test_database().await;
    let config = EpgConfig {
        hour_correction: 2,
        ..epg_config(EpgPurgeMode::None)
    };
    assert_ok!(import_epg(&database, config, xml).await);
    let program = &assert_ok!(database.list_programs_for_channel("c").await)[0];
    assert_eq!(program.start, "20230101010000 +0000");
    assert_eq!(program.stop, "20230102020000 +0000");

    let database = test_database().await;
    let config = EpgConfig {
        hour_correction: 2,
        hour_correction_mode: HourCorrectionMode::Carry,
        purge: EpgPurgeMode::None,
    };
    assert_ok!(import_epg(&database, config, xml).await);
    let program = &assert_ok!(database.list_programs_for_channel("c").await)[0];
    assert_eq!(program.start, "20230102010000 +0000");
    assert_eq!(program.stop, "20230102020000 +0000");
}

#[tokio::test]
async fn test_invalid_programmes_are_skipped() {
    let xml = r#"<tv>
      <programme stop="20230101110000" channel="a.id"><title>No start</title></programme>
      <programme start="2023" stop="20230101110000" channel="a.id"><title>Short</title></programme>
      <programme start="20230101100000" stop="20230101110000"><title>No channel</title></programme>
      <programme start="20230101100000" stop="20230101110000" channel="a.id">
        <title>Good</title>
      </programme>
    </tv>"#;

    let database = test_database().await;
    let summary = assert_ok!(import_epg(&database, epg_config(EpgPurgeMode::None), xml).await);

    assert_eq!(summary.processed, 4);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.inserted, 1);
}

#[tokio::test]
async fn test_malformed_guide_keeps_inserted_rows() {
    let xml = r#"<tv>
      <programme start="20230101100000" stop="20230101110000" channel="a.id">
        <title>Kept</title>
      </programme>
      <programme start="20230101110000" stop="20230101120000" channel="a.id">
        <title>Broken</desc>
      </programme>
    </tv>"#;

    let database = test_database().await;
    let manager = IngestionStateManager::new();
    let err = assert_err!(
        EpgIngestor::new(database.clone(), manager.clone(), epg_config(EpgPurgeMode::None))
            .ingest_at(xml.as_bytes(), noon())
            .await
    );

    assert!(matches!(err, AppError::Source(SourceError::ParseError { .. })));
    assert!(err.to_string().contains("at byte"));
    assert_eq!(assert_ok!(database.count_programs().await), 1);
    assert!(manager.active_session().await.is_none());
}

#[tokio::test]
async fn test_truncated_guide_is_a_parse_error() {
    let xml = concat!(
        r#"<tv><programme start="20230101100000" stop="20230101110000" channel="a.id">"#,
        "<title>Cut"
    );

    let database = test_database().await;
    let err = assert_err!(import_epg(&database, epg_config(EpgPurgeMode::None), xml).await);
    assert!(matches!(err, AppError::Source(SourceError::ParseError { .. })));
    assert_eq!(assert_ok!(database.count_programs().await), 0);
}

#[tokio::test]
async fn test_cancelled_guide_import() {
    let database = test_database().await;
    let manager = cancelling_manager(IngestionState::Running, 0);

    let summary = assert_ok!(
        EpgIngestor::new(database.clone(), manager, epg_config(EpgPurgeMode::None))
            .ingest_at(GUIDE.as_bytes(), noon())
            .await
    );

    assert_eq!(summary.outcome, ImportOutcome::Cancelled);
    assert_eq!(summary.processed, 1);
    assert_eq!(assert_ok!(database.count_programs().await), 1);
}

#[tokio::test]
async fn test_epg_only_playlist_filter() {
    let database = test_database().await;
    import_m3u(
        &database,
        "#EXTM3U\n\
         #EXTINF:-1 tvg-name=\"A\" tvg-id=\"a.id\" group-title=\"G\",A\nhttp://x/a\n\
         #EXTINF:-1 tvg-name=\"Z\" tvg-id=\"z.id\" group-title=\"G\",Z\nhttp://x/z\n\
         #EXTINF:-1 tvg-name=\"N\" group-title=\"G\",N\nhttp://x/n\n",
    )
    .await;
    assert_ok!(import_epg(&database, epg_config(EpgPurgeMode::None), GUIDE).await);

    let playlist = assert_ok!(database.get_playlist_by_name("G").await).unwrap();
    let items = assert_ok!(
        database
            .list_playlist_items(&PlaylistItemQuery {
                playlist_id: playlist.id,
                epg_only: true,
                ..Default::default()
            })
            .await
    );
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "A");
}
