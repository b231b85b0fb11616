use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::WatchError;

static PAPER_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}\.\d{4,5}|[a-z][a-z-]*(?:\.[A-Z]{2})?/\d{7})(?:v\d+)?$")
        .expect("paper id pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PaperId(String);

impl PaperId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_stem(&self) -> String {
        self.0.replace('/', "_")
    }
}

impl fmt::Display for PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PaperId {
    type Err = WatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut rest = value.trim();
        for prefix in ["arXiv:", "arxiv:"] {
            rest = rest.strip_prefix(prefix).unwrap_or(rest);
        }
        for marker in ["/abs/", "/pdf/"] {
            if let Some((_, tail)) = rest.split_once(marker) {
                rest = tail;
            }
        }
        rest = rest.strip_suffix(".pdf").unwrap_or(rest);

        let captures = PAPER_ID
            .captures(rest)
            .ok_or_else(|| WatchError::InvalidPaperId(value.to_string()))?;
        Ok(Self(captures[1].to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Pdf,
}

impl AssetKind {
    pub fn extension(self) -> &'static str {
        match self {
            AssetKind::Pdf => "pdf",
        }
    }

    pub fn signature(self) -> &'static [u8] {
        match self {
            AssetKind::Pdf => b"%PDF",
        }
    }

    pub fn matches(self, bytes: &[u8]) -> bool {
        bytes.starts_with(self.signature())
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Pdf => write!(f, "PDF"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: PaperId,
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub published: DateTime<Utc>,
    pub categories: Vec<String>,
    pub asset_url: String,
    pub origin_query: String,
}

impl Item {
    pub fn asset_kind(&self) -> AssetKind {
        AssetKind::Pdf
    }

    pub fn author_line(&self) -> String {
        author_line(&self.authors)
    }
}

pub fn author_line(authors: &[String]) -> String {
    let shown = authors
        .iter()
        .take(3)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if authors.len() > 3 {
        format!("{shown} and {} more", authors.len() - 3)
    } else {
        shown
    }
}
