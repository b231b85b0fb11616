use std::collections::BTreeMap;
use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};

use arxiv_watch::config::{StateFile, default_search_queries};
use arxiv_watch::domain::PaperId;
use arxiv_watch::error::WatchError;
use arxiv_watch::scheduler::Scheduler;
use arxiv_watch::store::{CycleUpdate, LoadOutcome, WatermarkStore};

fn state_path(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join("arxiv_config.json")).unwrap()
}

fn at(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap()
}

#[test]
fn missing_file_is_created_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = state_path(&dir);

    let (store, outcome) = WatermarkStore::open(path.clone()).unwrap();
    assert_eq!(outcome, LoadOutcome::Created);
    assert!(path.as_std_path().exists());
    assert_eq!(store.search_queries(), default_search_queries().as_slice());
    assert!(store.first_run());
    assert!(store.organize_by_query());
    assert_eq!(store.max_results(), 10);
    assert_eq!(store.check_interval_hours(), 6);
    assert_eq!(store.downloaded_count(), 0);

    let written = StateFile::parse(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written, StateFile::default());
}

#[test]
fn corrupt_file_falls_back_to_defaults_without_overwriting() {
    let dir = tempfile::tempdir().unwrap();
    let path = state_path(&dir);
    fs::write(&path, "{ not json").unwrap();

    let (store, outcome) = WatermarkStore::open(path.clone()).unwrap();
    assert_matches!(outcome, LoadOutcome::Recovered { .. });
    assert!(store.first_run());
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
}

#[test]
fn partial_file_fills_defaults_and_keeps_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = state_path(&dir);
    fs::write(
        &path,
        r#"{
  "search_queries": ["cat:cs.RO", "cat:cs.RO", "robot learning"],
  "downloaded_papers": ["2301.00001"],
  "first_run": false,
  "query_last_check": {
    "cat:cs.RO": "2024-06-01T12:00:00Z",
    "removed query": "2024-05-01T12:00:00Z"
  },
  "theme": {"color": "green"}
}"#,
    )
    .unwrap();

    let (store, outcome) = WatermarkStore::open(path.clone()).unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded);
    assert_eq!(store.search_queries(), ["cat:cs.RO", "robot learning"]);
    assert_eq!(store.watermark("cat:cs.RO"), Some("2024-06-01T12:00:00Z"));
    assert_eq!(store.watermark("removed query"), None);
    assert!(store.is_downloaded(&"2301.00001v2".parse::<PaperId>().unwrap()));
    assert_eq!(store.max_results(), 10);

    store.save().unwrap();
    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["theme"]["color"], "green");
    assert_eq!(raw["max_results"], 10);
    assert!(raw["query_last_check"].get("removed query").is_none());
}

#[test]
fn add_and_remove_queries() {
    let dir = tempfile::tempdir().unwrap();
    let (mut store, _) = WatermarkStore::open(state_path(&dir)).unwrap();

    assert!(store.add_query("  diffusion models ").unwrap());
    assert!(!store.add_query("diffusion models").unwrap());
    assert_matches!(store.add_query("   "), Err(WatchError::InvalidQuery(_)));
    assert_eq!(store.search_queries().last().unwrap(), "diffusion models");

    assert_matches!(
        store.remove_query("not there"),
        Err(WatchError::QueryNotFound(_))
    );
    assert_matches!(
        store.remove_query_at(99),
        Err(WatchError::QueryIndexOutOfRange(99))
    );
    assert_eq!(store.remove_query_at(0).unwrap(), "cat:cs.AI");
    store.remove_query("diffusion models").unwrap();
    assert_eq!(store.search_queries(), ["cat:cs.LG", "cat:cs.CV"]);
}

#[test]
fn re_added_query_starts_without_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let (mut store, _) = WatermarkStore::open(state_path(&dir)).unwrap();
    store.apply_cycle(CycleUpdate {
        watermarks: BTreeMap::from([("cat:cs.AI".to_string(), at("2024-06-01T00:00:00Z"))]),
        completed: true,
        ..CycleUpdate::default()
    });
    assert_eq!(store.watermark("cat:cs.AI"), Some("2024-06-01T00:00:00Z"));

    store.remove_query("cat:cs.AI").unwrap();
    store.save().unwrap();
    let (mut reloaded, _) = WatermarkStore::open(store.path().to_path_buf()).unwrap();
    reloaded.add_query("cat:cs.AI").unwrap();
    assert_eq!(reloaded.watermark("cat:cs.AI"), None);
    assert_eq!(reloaded.query_state("cat:cs.AI"), None);
}

#[test]
fn apply_cycle_drops_watermarks_of_removed_queries() {
    let dir = tempfile::tempdir().unwrap();
    let (mut store, _) = WatermarkStore::open(state_path(&dir)).unwrap();
    store.remove_query("cat:cs.CV").unwrap();

    store.apply_cycle(CycleUpdate {
        watermarks: BTreeMap::from([
            ("cat:cs.AI".to_string(), at("2024-06-01T00:00:00Z")),
            ("cat:cs.CV".to_string(), at("2024-06-01T00:00:00Z")),
        ]),
        succeeded: vec!["2406.00001".parse().unwrap()],
        completed: true,
        checked_at: Some(at("2024-06-01T00:00:05Z")),
    });

    assert_eq!(store.watermark("cat:cs.CV"), None);
    assert_eq!(store.watermark("cat:cs.AI"), Some("2024-06-01T00:00:00Z"));
    assert_eq!(store.last_check_global(), Some("2024-06-01T00:00:05Z"));
    assert_eq!(store.downloaded_ids().collect::<Vec<_>>(), ["2406.00001"]);
    assert!(!store.first_run());
}

#[test]
fn incomplete_cycle_keeps_first_run() {
    let dir = tempfile::tempdir().unwrap();
    let (mut store, _) = WatermarkStore::open(state_path(&dir)).unwrap();
    store.apply_cycle(CycleUpdate {
        succeeded: vec!["2406.00001".parse().unwrap()],
        completed: false,
        ..CycleUpdate::default()
    });
    assert!(store.first_run());
    assert_eq!(store.downloaded_count(), 1);
}

#[test]
fn settings_are_validated_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = state_path(&dir);
    let (mut store, _) = WatermarkStore::open(path.clone()).unwrap();

    assert_matches!(
        store.set_check_interval_hours(0),
        Err(WatchError::InvalidSetting(_))
    );
    assert_matches!(store.set_max_results(0), Err(WatchError::InvalidSetting(_)));
    store.set_check_interval_hours(12).unwrap();
    store.set_max_results(25).unwrap();
    store.set_organize_by_query(false);
    store.set_download_path("/tmp/papers");
    store.save().unwrap();

    let (reloaded, _) = WatermarkStore::open(path).unwrap();
    assert_eq!(reloaded.check_interval_hours(), 12);
    assert_eq!(reloaded.max_results(), 25);
    assert!(!reloaded.organize_by_query());
    assert_eq!(reloaded.download_path().as_str(), "/tmp/papers");
}

#[test]
fn reset_forgets_history() {
    let dir = tempfile::tempdir().unwrap();
    let (mut store, _) = WatermarkStore::open(state_path(&dir)).unwrap();
    store.apply_cycle(CycleUpdate {
        watermarks: BTreeMap::from([("cat:cs.AI".to_string(), at("2024-06-01T00:00:00Z"))]),
        succeeded: vec!["2406.00001".parse().unwrap()],
        completed: true,
        checked_at: Some(at("2024-06-01T00:00:00Z")),
    });

    store.reset();
    assert!(store.first_run());
    assert_eq!(store.downloaded_count(), 0);
    assert_eq!(store.watermark("cat:cs.AI"), None);
    assert_eq!(store.last_check_global(), None);
    assert_eq!(store.search_queries(), default_search_queries().as_slice());
}

#[test]
fn zero_settings_on_disk_fall_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = state_path(&dir);
    fs::write(&path, r#"{"check_interval_hours": 0, "max_results": 0}"#).unwrap();

    let (store, outcome) = WatermarkStore::open(path).unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded);
    assert_eq!(store.check_interval_hours(), 6);
    assert_eq!(store.max_results(), 10);
    assert!(Scheduler::every_hours(store.check_interval_hours()).is_ok());
}
