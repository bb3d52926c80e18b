use async_trait::async_trait;
use reqwest::{Client, header};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source request timed out after {0:?}")]
    Timeout(Duration),

    #[error("source returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("source request failed: {0}")]
    Transport(String),

    #[error("source {0} returned an empty body")]
    Empty(String),
}

/// Bytes of a legacy file plus whatever content type the source reported.
#[derive(Debug, Clone)]
pub struct SourceObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<SourceObject, SourceError>;
}

pub struct HttpSourceFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpSourceFetcher {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    fn transport_error(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout(self.timeout)
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, url: &str) -> Result<SourceObject, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty());

        let data = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?
            .to_vec();
        if data.is_empty() {
            return Err(SourceError::Empty(url.to_string()));
        }

        Ok(SourceObject { data, content_type })
    }
}
