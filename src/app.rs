use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::asset::AssetClient;
use crate::cancel::CancelFlag;
use crate::clock::{Clock, SystemClock, format_timestamp};
use crate::discovery::{self, DiscoveryOptions, QueryReport, WatermarkPolicy};
use crate::domain::{Item, PaperId};
use crate::error::WatchError;
use crate::feed::FeedClient;
use crate::fetch::{FetchFailure, Fetcher};
use crate::folders;
use crate::fs_util;
use crate::notify::Notifier;
use crate::store::{CycleUpdate, WatermarkStore};

pub const CONNECTION_TEST_QUERY: &str = "cat:cs.AI";

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadedPaper {
    pub id: PaperId,
    pub title: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub published: DateTime<Utc>,
    pub summary: String,
    pub asset_url: String,
    pub query: String,
    pub path: Utf8PathBuf,
    pub reused: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub first_run: bool,
    pub checked_at: String,
    pub queries: Vec<QueryReport>,
    pub discovered: usize,
    pub new: usize,
    pub downloaded: usize,
    pub reused: usize,
    pub failed: usize,
    pub failures: Vec<FetchFailure>,
    pub papers: Vec<DownloadedPaper>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub state_file: String,
    pub query_count: usize,
    pub downloaded_count: usize,
    pub download_path: String,
    pub check_interval_hours: u64,
    pub max_results: u32,
    pub organize_by_query: bool,
    pub first_run: bool,
    pub last_check: Option<String>,
    pub pdf_files: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryListing {
    pub queries: Vec<QueryEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryEntry {
    pub query: String,
    pub folder: String,
    pub last_checked_at: Option<String>,
}

pub struct App<F: FeedClient, A: AssetClient, N: Notifier> {
    feed: F,
    assets: A,
    notifier: N,
    clock: Box<dyn Clock>,
    options: DiscoveryOptions,
}

impl<F: FeedClient, A: AssetClient, N: Notifier> App<F, A, N> {
    pub fn new(feed: F, assets: A, notifier: N) -> Self {
        Self {
            feed,
            assets,
            notifier,
            clock: Box::new(SystemClock),
            options: DiscoveryOptions::default(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_options(mut self, options: DiscoveryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    pub fn run_cycle(
        &self,
        store: &mut WatermarkStore,
        cancel: &CancelFlag,
        sink: &dyn ProgressSink,
    ) -> Result<CycleSummary, WatchError> {
        let base = store.download_path().to_path_buf();
        folders::ensure_directory(&base, None, false).map_err(|err| {
            WatchError::BaseDirectory {
                path: base.clone(),
                message: err.to_string(),
            }
        })?;

        let first_run = store.first_run();
        if first_run {
            info!(
                days = self.options.bootstrap_window.num_days(),
                "first run, backfilling the bootstrap window"
            );
        }

        sink.event(ProgressEvent {
            message: format!(
                "phase=Discover; {} queries",
                store.search_queries().len()
            ),
            elapsed: None,
        });
        let start = std::time::Instant::now();
        let discovery =
            discovery::discover(&self.feed, store, &self.options, self.clock.as_ref(), cancel);
        sink.event(ProgressEvent {
            message: format!(
                "discovered {} new of {} returned",
                discovery.planned.len(),
                discovery.returned()
            ),
            elapsed: Some(start.elapsed()),
        });

        let fetcher = Fetcher::new(&self.assets, &base, store.organize_by_query());
        let report = fetcher.execute(&discovery.planned, cancel, sink);

        let completed = !discovery.cancelled && !report.cancelled;
        let checked_at = self.clock.now();
        let papers = discovery
            .planned
            .iter()
            .filter_map(|item| {
                report
                    .saved
                    .iter()
                    .find(|saved| saved.id == item.id)
                    .map(|saved| downloaded_paper(item, saved.path.clone(), saved.reused()))
            })
            .collect::<Vec<_>>();

        let mut watermarks = if completed {
            discovery.watermarks.clone()
        } else {
            Default::default()
        };
        if self.options.watermark_policy == WatermarkPolicy::OnSuccess {
            for failure in &report.failures {
                watermarks.remove(&failure.query);
            }
        }

        store.apply_cycle(CycleUpdate {
            watermarks,
            succeeded: report.succeeded(),
            completed,
            checked_at: Some(checked_at),
        });
        sink.event(ProgressEvent {
            message: "phase=Store; saving state".to_string(),
            elapsed: None,
        });
        store.save()?;

        let summary = CycleSummary {
            first_run,
            checked_at: format_timestamp(checked_at),
            queries: discovery.reports.clone(),
            discovered: discovery.returned(),
            new: discovery.planned.len(),
            downloaded: report.transferred(),
            reused: report.reused(),
            failed: report.failures.len(),
            failures: report.failures.clone(),
            papers,
            cancelled: !completed,
        };

        info!(
            discovered = summary.discovered,
            new = summary.new,
            downloaded = summary.downloaded,
            failed = summary.failed,
            "cycle finished"
        );
        if summary.failed > 0 || discovery.failed_queries() > 0 {
            warn!(
                failed_downloads = summary.failed,
                failed_queries = discovery.failed_queries(),
                "cycle finished with failures"
            );
        }

        if summary.downloaded > 0 {
            let message = format!("Downloaded {} new papers", summary.downloaded);
            if let Err(err) = self.notifier.notify("arXiv update", &message) {
                warn!(error = %err, "notification failed");
            }
        }

        Ok(summary)
    }

    pub fn test_connection(&self) -> Result<Option<Item>, WatchError> {
        let items = self.feed.search(CONNECTION_TEST_QUERY, 2)?;
        Ok(items.into_iter().next())
    }
}

pub fn list_queries(store: &WatermarkStore) -> QueryListing {
    QueryListing {
        queries: store
            .search_queries()
            .iter()
            .map(|query| QueryEntry {
                query: query.clone(),
                folder: folders::resolve(query),
                last_checked_at: store.watermark(query).map(str::to_string),
            })
            .collect(),
    }
}

pub fn collect_stats(store: &WatermarkStore) -> Result<Stats, WatchError> {
    let root = store.download_path();
    let mut pdf_files = 0;
    let mut total_bytes = 0;
    if root.as_std_path().is_dir() {
        for path in fs_util::walk_files(root.as_std_path())? {
            if path.extension().map(|ext| ext == "pdf").unwrap_or(false) {
                pdf_files += 1;
                total_bytes += std::fs::metadata(&path)
                    .map(|meta| meta.len())
                    .map_err(|err| WatchError::Filesystem(err.to_string()))?;
            }
        }
    }

    Ok(Stats {
        state_file: store.path().to_string(),
        query_count: store.search_queries().len(),
        downloaded_count: store.downloaded_count(),
        download_path: root.to_string(),
        check_interval_hours: store.check_interval_hours(),
        max_results: store.max_results(),
        organize_by_query: store.organize_by_query(),
        first_run: store.first_run(),
        last_check: store.last_check_global().map(str::to_string),
        pdf_files,
        total_bytes,
    })
}

fn downloaded_paper(item: &Item, path: Utf8PathBuf, reused: bool) -> DownloadedPaper {
    DownloadedPaper {
        id: item.id.clone(),
        title: item.title.clone(),
        authors: item.authors.clone(),
        categories: item.categories.clone(),
        published: item.published,
        summary: item.summary.clone(),
        asset_url: item.asset_url.clone(),
        query: item.origin_query.clone(),
        path,
        reused,
    }
}
