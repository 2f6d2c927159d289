use async_trait::async_trait;
use thiserror::Error;

use crate::models::RawImage;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("download failed with status {status}")]
    Status { status: reqwest::StatusCode },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Downloads one image. No retries; the caller decides whether a failed
/// item aborts the batch or is skipped.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RawImage, FetchError>;
}

pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<RawImage, FetchError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status(),
            });
        }
        let bytes = response.bytes().await?;
        log::debug!("📥 Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}
