use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::clock::{Clock, parse_timestamp};
use crate::domain::Item;
use crate::feed::FeedClient;
use crate::store::WatermarkStore;

pub const DEFAULT_BOOTSTRAP_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatermarkPolicy {
    /// Advance to "now" after every attempt, including failed feed calls.
    #[default]
    Always,
    /// Advance only when the feed call succeeded and none of the query's downloads failed, so
    /// an outage does not narrow the next window.
    OnSuccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    pub bootstrap_window: TimeDelta,
    pub watermark_policy: WatermarkPolicy,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            bootstrap_window: TimeDelta::days(DEFAULT_BOOTSTRAP_DAYS),
            watermark_policy: WatermarkPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Watermark {
    At(DateTime<Utc>),
    Unparseable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecencyFilter {
    Bootstrap { cutoff: DateTime<Utc> },
    Incremental(Option<Watermark>),
}

impl RecencyFilter {
    pub fn for_query(
        store: &WatermarkStore,
        query: &str,
        now: DateTime<Utc>,
        options: &DiscoveryOptions,
    ) -> Self {
        if store.first_run() {
            return RecencyFilter::Bootstrap {
                cutoff: now - options.bootstrap_window,
            };
        }
        let watermark = store.watermark(query).map(|raw| match parse_timestamp(raw) {
            Some(at) => Watermark::At(at),
            None => Watermark::Unparseable(raw.to_string()),
        });
        RecencyFilter::Incremental(watermark)
    }

    pub fn keeps(&self, item: &Item) -> bool {
        match self {
            RecencyFilter::Bootstrap { cutoff } => item.published > *cutoff,
            RecencyFilter::Incremental(None) => true,
            RecencyFilter::Incremental(Some(Watermark::At(at))) => item.published > *at,
            // fail open: a duplicate is cheaper than a silently dropped paper
            RecencyFilter::Incremental(Some(Watermark::Unparseable(_))) => true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryReport {
    pub query: String,
    pub returned: usize,
    pub already_downloaded: usize,
    pub outside_window: usize,
    pub kept: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub planned: Vec<Item>,
    pub watermarks: BTreeMap<String, DateTime<Utc>>,
    pub reports: Vec<QueryReport>,
    pub cross_query_duplicates: usize,
    pub cancelled: bool,
}

impl Discovery {
    pub fn returned(&self) -> usize {
        self.reports.iter().map(|report| report.returned).sum()
    }

    pub fn failed_queries(&self) -> usize {
        self.reports
            .iter()
            .filter(|report| report.error.is_some())
            .count()
    }
}

pub fn discover<F: FeedClient + ?Sized>(
    feed: &F,
    store: &WatermarkStore,
    options: &DiscoveryOptions,
    clock: &dyn Clock,
    cancel: &CancelFlag,
) -> Discovery {
    let mut discovery = Discovery::default();
    let mut survivors: Vec<Item> = Vec::new();
    let cap = store.max_results();

    for query in store.search_queries() {
        if cancel.is_cancelled() {
            info!(query = %query, "stop requested, skipping remaining queries");
            discovery.cancelled = true;
            break;
        }

        let mut report = QueryReport {
            query: query.clone(),
            ..QueryReport::default()
        };
        let filter = RecencyFilter::for_query(store, query, clock.now(), options);
        debug!(query = %query, filter = ?filter, "searching");

        let fetched = match feed.search(query, cap) {
            Ok(items) => Some(items),
            Err(err) => {
                warn!(query = %query, error = %err, "feed request failed");
                report.error = Some(err.to_string());
                None
            }
        };

        if let Some(items) = &fetched {
            report.returned = items.len();
            for item in items {
                if store.is_downloaded(&item.id) {
                    report.already_downloaded += 1;
                    continue;
                }
                if !filter.keeps(item) {
                    report.outside_window += 1;
                    continue;
                }
                report.kept += 1;
                survivors.push(item.clone());
            }
            info!(
                query = %query,
                returned = report.returned,
                kept = report.kept,
                "query checked"
            );
        }

        let advance = match options.watermark_policy {
            WatermarkPolicy::Always => true,
            WatermarkPolicy::OnSuccess => fetched.is_some(),
        };
        if advance {
            discovery.watermarks.insert(query.clone(), clock.now());
        }
        discovery.reports.push(report);
    }

    let mut seen = HashSet::new();
    for item in survivors {
        if seen.insert(item.id.clone()) {
            discovery.planned.push(item);
        } else {
            debug!(
                id = %item.id,
                query = %item.origin_query,
                "already planned by an earlier query"
            );
            discovery.cross_query_duplicates += 1;
        }
    }

    discovery
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateFile;
    use camino::Utf8PathBuf;

    fn item(published: DateTime<Utc>) -> Item {
        Item {
            id: "2301.00001".parse().unwrap(),
            title: "T".to_string(),
            authors: Vec::new(),
            summary: String::new(),
            published,
            categories: Vec::new(),
            asset_url: String::new(),
            origin_query: "q".to_string(),
        }
    }

    fn store(first_run: bool, watermark: Option<&str>) -> WatermarkStore {
        let mut state = StateFile {
            search_queries: vec!["q".to_string()],
            first_run,
            ..StateFile::default()
        };
        if let Some(raw) = watermark {
            state
                .query_last_check
                .insert("q".to_string(), raw.to_string());
        }
        WatermarkStore::from_state(Utf8PathBuf::from("unused.json"), state)
    }

    #[test]
    fn bootstrap_uses_cutoff() {
        let now = "2024-06-10T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let options = DiscoveryOptions::default();
        let filter = RecencyFilter::for_query(&store(true, None), "q", now, &options);
        assert!(filter.keeps(&item(now - TimeDelta::days(6))));
        assert!(!filter.keeps(&item(now - TimeDelta::days(8))));
    }

    #[test]
    fn incremental_without_watermark_keeps_everything() {
        let now = Utc::now();
        let options = DiscoveryOptions::default();
        let filter = RecencyFilter::for_query(&store(false, None), "q", now, &options);
        assert_eq!(filter, RecencyFilter::Incremental(None));
        assert!(filter.keeps(&item(now - TimeDelta::days(400))));
    }

    #[test]
    fn incremental_with_watermark_is_strict() {
        let at = "2024-06-10T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let filter = RecencyFilter::for_query(
            &store(false, Some("2024-06-10T00:00:00Z")),
            "q",
            Utc::now(),
            &DiscoveryOptions::default(),
        );
        assert!(!filter.keeps(&item(at)));
        assert!(filter.keeps(&item(at + TimeDelta::seconds(1))));
    }

    #[test]
    fn unparseable_watermark_fails_open() {
        let filter = RecencyFilter::for_query(
            &store(false, Some("last tuesday")),
            "q",
            Utc::now(),
            &DiscoveryOptions::default(),
        );
        assert_eq!(
            filter,
            RecencyFilter::Incremental(Some(Watermark::Unparseable("last tuesday".to_string())))
        );
        assert!(filter.keeps(&item(Utc::now() - TimeDelta::days(1000))));
    }
}
