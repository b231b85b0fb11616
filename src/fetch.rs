use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::asset::AssetClient;
use crate::cancel::CancelFlag;
use crate::domain::{Item, PaperId};
use crate::error::WatchError;
use crate::folders;
use crate::fs_util;

#[derive(Debug, Clone)]
pub struct QueryGroup<'a> {
    pub query: &'a str,
    pub items: Vec<&'a Item>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedAsset {
    pub id: PaperId,
    pub path: Utf8PathBuf,
    /// `None` when the file was already on disk and nothing was transferred.
    pub bytes: Option<usize>,
}

impl SavedAsset {
    pub fn reused(&self) -> bool {
        self.bytes.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchFailure {
    pub id: PaperId,
    pub query: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    pub attempted: usize,
    pub saved: Vec<SavedAsset>,
    pub failures: Vec<FetchFailure>,
    pub cancelled: bool,
}

impl FetchReport {
    pub fn succeeded(&self) -> Vec<PaperId> {
        self.saved.iter().map(|saved| saved.id.clone()).collect()
    }

    pub fn reused(&self) -> usize {
        self.saved.iter().filter(|saved| saved.reused()).count()
    }

    pub fn transferred(&self) -> usize {
        self.saved.len() - self.reused()
    }
}

pub fn group_by_query(planned: &[Item]) -> Vec<QueryGroup<'_>> {
    let mut groups: Vec<QueryGroup<'_>> = Vec::new();
    for item in planned {
        match groups
            .iter_mut()
            .find(|group| group.query == item.origin_query)
        {
            Some(group) => group.items.push(item),
            None => groups.push(QueryGroup {
                query: &item.origin_query,
                items: vec![item],
            }),
        }
    }
    groups
}

pub struct Fetcher<'a, A: AssetClient + ?Sized> {
    assets: &'a A,
    base: &'a Utf8Path,
    organize_by_query: bool,
}

impl<'a, A: AssetClient + ?Sized> Fetcher<'a, A> {
    pub fn new(assets: &'a A, base: &'a Utf8Path, organize_by_query: bool) -> Self {
        Self {
            assets,
            base,
            organize_by_query,
        }
    }

    pub fn execute(
        &self,
        planned: &[Item],
        cancel: &CancelFlag,
        sink: &dyn ProgressSink,
    ) -> FetchReport {
        let mut report = FetchReport::default();
        let total = planned.len();

        for group in group_by_query(planned) {
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Fetch; {} ({} papers)",
                    group.query,
                    group.items.len()
                ),
                elapsed: None,
            });
            for item in group.items {
                if cancel.is_cancelled() {
                    info!("stop requested, leaving remaining downloads for the next cycle");
                    report.cancelled = true;
                    return report;
                }
                report.attempted += 1;
                sink.event(ProgressEvent {
                    message: format!("download {}/{total}; {}", report.attempted, item.id),
                    elapsed: None,
                });
                let start = std::time::Instant::now();
                match self.fetch_one(item) {
                    Ok(saved) => {
                        sink.event(ProgressEvent {
                            message: format!("saved {}", saved.path),
                            elapsed: Some(start.elapsed()),
                        });
                        report.saved.push(saved);
                    }
                    Err(err) => {
                        warn!(
                            id = %item.id,
                            query = %item.origin_query,
                            error = %err,
                            "download failed"
                        );
                        report.failures.push(FetchFailure {
                            id: item.id.clone(),
                            query: item.origin_query.clone(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }

        report
    }

    fn fetch_one(&self, item: &Item) -> Result<SavedAsset, WatchError> {
        let dir =
            folders::ensure_directory(self.base, Some(&item.origin_query), self.organize_by_query)?;
        let path = dir.join(folders::asset_file_name(item));

        if path.as_std_path().exists() {
            info!(id = %item.id, path = %path, "already on disk");
            return Ok(SavedAsset {
                id: item.id.clone(),
                path,
                bytes: None,
            });
        }

        if item.asset_url.trim().is_empty() {
            return Err(WatchError::MissingAssetUrl(item.id.to_string()));
        }
        let bytes = self.assets.fetch(&item.asset_url)?;
        let kind = item.asset_kind();
        if !kind.matches(&bytes) {
            return Err(WatchError::SignatureMismatch {
                id: item.id.to_string(),
                expected: kind.to_string(),
            });
        }

        fs_util::write_atomic(&path, &bytes)?;
        info!(id = %item.id, path = %path, bytes = bytes.len(), "downloaded");
        Ok(SavedAsset {
            id: item.id.clone(),
            path,
            bytes: Some(bytes.len()),
        })
    }
}
