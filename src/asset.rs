use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::WatchError;

pub trait AssetClient: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, WatchError>;
}

#[derive(Clone)]
pub struct AssetHttpClient {
    client: Client,
}

impl AssetHttpClient {
    pub fn new() -> Result<Self, WatchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("arxiv-watch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| WatchError::AssetHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| WatchError::AssetHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl AssetClient for AssetHttpClient {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, WatchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| WatchError::AssetHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "asset request failed".to_string());
            return Err(WatchError::AssetStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| WatchError::AssetHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}
