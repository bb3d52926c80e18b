use crate::services::signer::{Operation, PresignOptions, Presigner, SigningError};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, header};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Lifetime of the URLs the server signs for its own requests
const INTERNAL_URL_EXPIRES_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("object store rejected the signature for {key} (403): {body}")]
    SignatureRejected { key: String, body: String },

    #[error("object {0} not found")]
    NotFound(String),

    #[error("object store returned {status} for {operation} {key}: {body}")]
    Status {
        operation: Operation,
        key: String,
        status: u16,
        body: String,
    },

    #[error("object store request timed out after {0:?}")]
    Timeout(Duration),

    #[error("object store request failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait StorageService: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;
}

/// Talks to R2 exclusively through presigned URLs.
pub struct R2StorageService {
    client: Client,
    presigner: Arc<Presigner>,
    timeout: Duration,
}

impl R2StorageService {
    pub fn new(presigner: Arc<Presigner>, timeout: Duration) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            presigner,
            timeout,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> StorageError {
        if e.is_timeout() {
            StorageError::Timeout(self.timeout)
        } else {
            StorageError::Transport(e.to_string())
        }
    }

    fn sign(&self, operation: Operation, key: &str) -> Result<String, StorageError> {
        let options = PresignOptions {
            expires_in: match operation {
                Operation::Put => self.presigner.config().upload_expires_secs,
                _ => INTERNAL_URL_EXPIRES_SECS,
            },
            ..Default::default()
        };
        Ok(self.presigner.presign(operation, key, &options)?.url)
    }

    async fn check(
        &self,
        response: Response,
        operation: Operation,
        key: &str,
    ) -> Result<Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::FORBIDDEN => {
                tracing::error!("🔏 Signature rejected for {} {}", operation, key);
                Err(StorageError::SignatureRejected {
                    key: key.to_string(),
                    body,
                })
            }
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            _ => Err(StorageError::Status {
                operation,
                key: key.to_string(),
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[async_trait]
impl StorageService for R2StorageService {
    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let url = self.sign(Operation::Put, key)?;
        let size = data.len();

        let response = self
            .client
            .put(url)
            .header(header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.check(response, Operation::Put, key).await?;

        tracing::debug!("☁️  Uploaded {} ({} bytes)", key, size);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let url = self.sign(Operation::Get, key)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = self.check(response, Operation::Get, key).await?;

        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        Ok(bytes.to_vec())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let url = self.sign(Operation::Delete, key)?;

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match self.check(response, Operation::Delete, key).await {
            // Deleting a missing object is not an error for S3-compatible stores
            Ok(_) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
