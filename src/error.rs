use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum WatchError {
    #[error("invalid arXiv identifier: {0}")]
    InvalidPaperId(String),

    #[error("invalid search query: {0:?}")]
    InvalidQuery(String),

    #[error("search query not found: {0}")]
    QueryNotFound(String),

    #[error("no search query at position {0}")]
    QueryIndexOutOfRange(usize),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("failed to read state file at {0}")]
    StateRead(Utf8PathBuf),

    #[error("failed to parse state file: {0}")]
    StateParse(String),

    #[error("failed to write state file: {0}")]
    StateWrite(String),

    #[error("arXiv request failed: {0}")]
    FeedHttp(String),

    #[error("arXiv returned status {status}: {message}")]
    FeedStatus { status: u16, message: String },

    #[error("failed to parse arXiv feed: {0}")]
    FeedParse(String),

    #[error("asset request failed: {0}")]
    AssetHttp(String),

    #[error("asset server returned status {status}: {message}")]
    AssetStatus { status: u16, message: String },

    #[error("paper {0} has no asset URL")]
    MissingAssetUrl(String),

    #[error("downloaded asset for {id} is not a valid {expected} file")]
    SignatureMismatch { id: String, expected: String },

    #[error("cannot create download directory {path}: {message}")]
    #[diagnostic(help("check that the download_path in the state file is writable"))]
    BaseDirectory { path: Utf8PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("failed to install stop signal handler: {0}")]
    SignalHandler(String),
}
