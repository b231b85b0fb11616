pub mod app;
pub mod asset;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod folders;
pub mod fs_util;
pub mod notify;
pub mod output;
pub mod scheduler;
pub mod store;
