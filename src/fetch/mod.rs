//! Raw feed retrieval.
//!
//! The pipelines only ever see bytes handed over by a [`FeedSource`]. There is
//! no retry here: a failed fetch fails the pipelines that needed that feed, and
//! the whole batch is re-run by whoever invoked it.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use async_trait::async_trait;
use tracing::debug;

use crate::error::PipelineError;

/// Something that can hand over the raw bytes behind a feed URL.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PipelineError>;
}

/// GETs `url` through `client`. Non-success statuses count as network errors.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>, PipelineError> {
    let network = |reason: String| PipelineError::Network {
        url: url.to_string(),
        reason,
    };

    let parsed = reqwest::Url::parse(url).map_err(|e| network(e.to_string()))?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    let resp = client
        .execute(req)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| network(e.to_string()))?;
    let bytes = resp.bytes().await.map_err(|e| network(e.to_string()))?;
    debug!(url, bytes = bytes.len(), "Feed downloaded");
    Ok(bytes.to_vec())
}

/// Fetches `http(s)://` URLs over HTTP and reads anything else from disk.
pub struct FeedFetcher<C = BasicClient> {
    client: C,
}

impl FeedFetcher<BasicClient> {
    pub fn new() -> Self {
        Self {
            client: BasicClient::new(),
        }
    }
}

impl Default for FeedFetcher<BasicClient> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: HttpClient> FeedFetcher<C> {
    pub fn with_client(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: HttpClient> FeedSource for FeedFetcher<C> {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            fetch_bytes(&self.client, url).await
        } else {
            tokio::fs::read(url).await.map_err(|e| PipelineError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    #[tokio::test]
    async fn test_fetch_local_path() {
        let path = env::temp_dir().join("covid_pipeline_fetch_local.csv");
        fs::write(&path, b"a,b\n1,2\n").unwrap();

        let fetcher = FeedFetcher::new();
        let bytes = fetcher.fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(bytes, b"a,b\n1,2\n");

        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_fetch_missing_path_is_network_error() {
        let fetcher = FeedFetcher::new();
        let err = fetcher
            .fetch("/nonexistent/covid_pipeline/feed.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Network { .. }));
    }

    #[tokio::test]
    async fn test_fetch_bytes_rejects_bad_url() {
        let err = fetch_bytes(&BasicClient::new(), "http://")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Network { .. }));
    }
}
