use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WatchError;

pub const DEFAULT_STATE_FILE: &str = "arxiv_config.json";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StateFile {
    #[serde(default = "default_search_queries")]
    pub search_queries: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_download_path")]
    pub download_path: String,
    #[serde(default = "default_check_interval_hours")]
    pub check_interval_hours: u64,
    #[serde(default)]
    pub last_check: Option<String>,
    #[serde(default)]
    pub downloaded_papers: Vec<String>,
    #[serde(default = "default_true")]
    pub first_run: bool,
    #[serde(default = "default_true")]
    pub organize_by_query: bool,
    #[serde(default)]
    pub query_last_check: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            search_queries: default_search_queries(),
            max_results: default_max_results(),
            download_path: default_download_path(),
            check_interval_hours: default_check_interval_hours(),
            last_check: None,
            downloaded_papers: Vec::new(),
            first_run: true,
            organize_by_query: true,
            query_last_check: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

impl StateFile {
    pub fn parse(content: &str) -> Result<Self, WatchError> {
        serde_json::from_str(content).map_err(|err| WatchError::StateParse(err.to_string()))
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, WatchError> {
        let mut bytes = serde_json::to_vec_pretty(self)
            .map_err(|err| WatchError::StateWrite(err.to_string()))?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

pub fn default_search_queries() -> Vec<String> {
    vec![
        "cat:cs.AI".to_string(),
        "cat:cs.LG".to_string(),
        "cat:cs.CV".to_string(),
    ]
}

fn default_max_results() -> u32 {
    10
}

fn default_download_path() -> String {
    "./arxiv_papers".to_string()
}

fn default_check_interval_hours() -> u64 {
    6
}

fn default_true() -> bool {
    true
}

pub fn suggested_queries() -> &'static [(&'static str, &'static str)] {
    &[
        ("cat:cs.AI", "Artificial intelligence"),
        ("cat:cs.LG", "Machine learning"),
        ("cat:cs.CV", "Computer vision"),
        ("cat:cs.CL", "Computation and language / NLP"),
        ("cat:cs.RO", "Robotics"),
        ("cat:stat.ML", "Statistical machine learning"),
        ("deep learning", "Keyword search"),
        ("neural network", "Keyword search"),
        ("transformer", "Keyword search"),
        ("large language model", "Keyword search"),
        ("diffusion model", "Keyword search"),
        ("reinforcement learning", "Keyword search"),
    ]
}
