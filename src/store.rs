use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::clock::format_timestamp;
use crate::config::StateFile;
use crate::domain::PaperId;
use crate::error::WatchError;
use crate::fs_util;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryState {
    pub last_checked_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Created,
    Recovered { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct CycleUpdate {
    pub watermarks: BTreeMap<String, DateTime<Utc>>,
    pub succeeded: Vec<PaperId>,
    pub completed: bool,
    pub checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: Utf8PathBuf,
    search_queries: Vec<String>,
    downloaded_ids: BTreeSet<String>,
    query_last_check: BTreeMap<String, QueryState>,
    first_run: bool,
    last_check_global: Option<String>,
    organize_by_query: bool,
    max_results: u32,
    download_path: Utf8PathBuf,
    check_interval_hours: u64,
    extra: Map<String, Value>,
}

impl WatermarkStore {
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<(Self, LoadOutcome), WatchError> {
        let path = path.into();
        match fs::read_to_string(path.as_std_path()) {
            Ok(content) => match StateFile::parse(&content) {
                Ok(state) => Ok((Self::from_state(path, state), LoadOutcome::Loaded)),
                Err(err) => {
                    warn!(path = %path, error = %err, "state file is corrupt, using defaults");
                    let reason = err.to_string();
                    Ok((
                        Self::from_state(path, StateFile::default()),
                        LoadOutcome::Recovered { reason },
                    ))
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let store = Self::from_state(path, StateFile::default());
                store.save()?;
                info!(path = %store.path, "created default state file");
                Ok((store, LoadOutcome::Created))
            }
            Err(err) => {
                warn!(path = %path, error = %err, "state file is unreadable, using defaults");
                Ok((
                    Self::from_state(path, StateFile::default()),
                    LoadOutcome::Recovered {
                        reason: err.to_string(),
                    },
                ))
            }
        }
    }

    pub fn from_state(path: Utf8PathBuf, state: StateFile) -> Self {
        let mut search_queries: Vec<String> = Vec::with_capacity(state.search_queries.len());
        for query in state.search_queries {
            if !search_queries.contains(&query) {
                search_queries.push(query);
            }
        }

        let query_last_check = state
            .query_last_check
            .into_iter()
            .filter(|(query, _)| search_queries.contains(query))
            .map(|(query, raw)| {
                (
                    query,
                    QueryState {
                        last_checked_at: Some(raw),
                    },
                )
            })
            .collect();

        let defaults = StateFile::default();
        let max_results = if state.max_results == 0 {
            warn!(
                default = defaults.max_results,
                "max_results of 0 in state file, using default"
            );
            defaults.max_results
        } else {
            state.max_results
        };
        let check_interval_hours = if state.check_interval_hours == 0 {
            warn!(
                default = defaults.check_interval_hours,
                "check_interval_hours of 0 in state file, using default"
            );
            defaults.check_interval_hours
        } else {
            state.check_interval_hours
        };

        Self {
            path,
            search_queries,
            downloaded_ids: state.downloaded_papers.into_iter().collect(),
            query_last_check,
            first_run: state.first_run,
            last_check_global: state.last_check,
            organize_by_query: state.organize_by_query,
            max_results,
            download_path: Utf8PathBuf::from(state.download_path),
            check_interval_hours,
            extra: state.extra,
        }
    }

    pub fn to_state(&self) -> StateFile {
        StateFile {
            search_queries: self.search_queries.clone(),
            max_results: self.max_results,
            download_path: self.download_path.to_string(),
            check_interval_hours: self.check_interval_hours,
            last_check: self.last_check_global.clone(),
            downloaded_papers: self.downloaded_ids.iter().cloned().collect(),
            first_run: self.first_run,
            organize_by_query: self.organize_by_query,
            query_last_check: self
                .query_last_check
                .iter()
                .filter_map(|(query, state)| {
                    state
                        .last_checked_at
                        .clone()
                        .map(|raw| (query.clone(), raw))
                })
                .collect(),
            extra: self.extra.clone(),
        }
    }

    pub fn save(&self) -> Result<(), WatchError> {
        let bytes = self.to_state().to_json_bytes()?;
        fs_util::write_atomic(&self.path, &bytes)
            .map_err(|err| WatchError::StateWrite(err.to_string()))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn search_queries(&self) -> &[String] {
        &self.search_queries
    }

    pub fn max_results(&self) -> u32 {
        self.max_results
    }

    pub fn download_path(&self) -> &Utf8Path {
        &self.download_path
    }

    pub fn check_interval_hours(&self) -> u64 {
        self.check_interval_hours
    }

    pub fn first_run(&self) -> bool {
        self.first_run
    }

    pub fn organize_by_query(&self) -> bool {
        self.organize_by_query
    }

    pub fn last_check_global(&self) -> Option<&str> {
        self.last_check_global.as_deref()
    }

    pub fn is_downloaded(&self, id: &PaperId) -> bool {
        self.downloaded_ids.contains(id.as_str())
    }

    pub fn downloaded_count(&self) -> usize {
        self.downloaded_ids.len()
    }

    pub fn downloaded_ids(&self) -> impl Iterator<Item = &str> {
        self.downloaded_ids.iter().map(String::as_str)
    }

    pub fn query_state(&self, query: &str) -> Option<&QueryState> {
        self.query_last_check.get(query)
    }

    pub fn watermark(&self, query: &str) -> Option<&str> {
        self.query_last_check
            .get(query)
            .and_then(|state| state.last_checked_at.as_deref())
    }

    /// Appends a query. Returns `false` when it is already present.
    pub fn add_query(&mut self, query: &str) -> Result<bool, WatchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(WatchError::InvalidQuery(query.to_string()));
        }
        if self.search_queries.iter().any(|existing| existing == query) {
            return Ok(false);
        }
        self.search_queries.push(query.to_string());
        info!(query, "added search query");
        Ok(true)
    }

    pub fn remove_query(&mut self, query: &str) -> Result<(), WatchError> {
        let index = self
            .search_queries
            .iter()
            .position(|existing| existing == query)
            .ok_or_else(|| WatchError::QueryNotFound(query.to_string()))?;
        self.remove_query_at(index).map(|_| ())
    }

    /// Removes the query at a zero-based position together with its watermark.
    pub fn remove_query_at(&mut self, index: usize) -> Result<String, WatchError> {
        if index >= self.search_queries.len() {
            return Err(WatchError::QueryIndexOutOfRange(index));
        }
        let query = self.search_queries.remove(index);
        self.query_last_check.remove(&query);
        info!(query, "removed search query");
        Ok(query)
    }

    pub fn set_check_interval_hours(&mut self, hours: u64) -> Result<(), WatchError> {
        if hours == 0 {
            return Err(WatchError::InvalidSetting(
                "check interval must be at least one hour".to_string(),
            ));
        }
        self.check_interval_hours = hours;
        Ok(())
    }

    pub fn set_max_results(&mut self, max_results: u32) -> Result<(), WatchError> {
        if max_results == 0 {
            return Err(WatchError::InvalidSetting(
                "max results must be greater than zero".to_string(),
            ));
        }
        self.max_results = max_results;
        Ok(())
    }

    pub fn set_organize_by_query(&mut self, organize: bool) {
        self.organize_by_query = organize;
    }

    pub fn set_download_path(&mut self, path: impl Into<Utf8PathBuf>) {
        self.download_path = path.into();
    }

    pub fn reset(&mut self) {
        self.downloaded_ids.clear();
        self.query_last_check.clear();
        self.last_check_global = None;
        self.first_run = true;
        info!("download history reset");
    }

    /// Merges the outcome of a cycle. Watermarks for queries removed in the meantime are
    /// discarded; `first_run` only clears when the cycle ran to completion.
    pub fn apply_cycle(&mut self, update: CycleUpdate) {
        for (query, at) in update.watermarks {
            if self.search_queries.contains(&query) {
                self.query_last_check.insert(
                    query,
                    QueryState {
                        last_checked_at: Some(format_timestamp(at)),
                    },
                );
            }
        }
        for id in update.succeeded {
            self.downloaded_ids.insert(id.as_str().to_string());
        }
        if update.completed {
            self.first_run = false;
        }
        if let Some(checked_at) = update.checked_at {
            self.last_check_global = Some(format_timestamp(checked_at));
        }
    }
}
