//! Adapter traits for the outbound side of the relay pipeline.

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    #[error("upstream returned status {status}")]
    Status { status: u16 },
    #[error("upstream response is malformed: {0}")]
    Malformed(String),
}

impl UpstreamError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }

    /// Transport, timeout and non-success status all count as unavailability.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Status { .. })
    }
}

/// Issues one chat-completion call and returns the first answer's text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        token: &str,
        model: &str,
        message: &str,
    ) -> Result<String, UpstreamError>;
}

#[derive(Debug, Error)]
pub enum RasterizeError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("failed to load document: {0}")]
    Navigate(String),
    #[error("failed to capture screenshot: {0}")]
    Screenshot(String),
    #[error("render deadline exceeded")]
    DeadlineExceeded,
}

/// Viewport in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Turns a complete HTML document into PNG bytes.
///
/// Work still pending at `deadline` is abandoned: the implementation releases
/// whatever it acquired and returns [`RasterizeError::DeadlineExceeded`].
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(
        &self,
        html: &str,
        viewport: Viewport,
        deadline: Instant,
    ) -> Result<Vec<u8>, RasterizeError>;
}
