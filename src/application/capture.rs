//! Bounded headless-browser captures published as image artifacts.

use std::{sync::Arc, time::Duration};

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::{
    sync::Semaphore,
    time::{Instant, timeout},
};
use tracing::{info, warn};

use crate::application::ports::{PageRasterizer, RasterizeError, Viewport};
use crate::config::CaptureSettings;
use crate::domain::{artifact::ImageArtifact, fingerprint::Fingerprint};
use crate::infra::artifacts::{ArtifactStorage, ArtifactStorageError};
use crate::infra::telemetry::{CAPTURE_MS, CAPTURE_REJECTED_TOTAL};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no render slot became free within {waited:?}")]
    Busy { waited: Duration },
    #[error("render slots are closed")]
    Closed,
    #[error(transparent)]
    Engine(#[from] RasterizeError),
    #[error("render exceeded {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Persistence(#[from] ArtifactStorageError),
}

pub struct ImageCapturer {
    rasterizer: Arc<dyn PageRasterizer>,
    storage: ArtifactStorage,
    slots: Arc<Semaphore>,
    viewport: Viewport,
    queue_timeout: Duration,
    render_timeout: Duration,
}

impl ImageCapturer {
    pub fn new(
        rasterizer: Arc<dyn PageRasterizer>,
        storage: ArtifactStorage,
        settings: &CaptureSettings,
    ) -> Self {
        Self {
            rasterizer,
            storage,
            slots: Arc::new(Semaphore::new(settings.max_concurrent.get() as usize)),
            viewport: Viewport {
                width: settings.viewport_width.get(),
                height: settings.viewport_height.get(),
            },
            queue_timeout: settings.queue_timeout,
            render_timeout: settings.render_timeout,
        }
    }

    pub fn storage(&self) -> &ArtifactStorage {
        &self.storage
    }

    /// Rasterize `html` and publish it as `<fingerprint>.png`.
    pub async fn capture(
        &self,
        html: &str,
        fingerprint: &Fingerprint,
    ) -> Result<ImageArtifact, CaptureError> {
        let started_at = Instant::now();

        let permit = match timeout(self.queue_timeout, self.slots.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(CaptureError::Closed),
            Err(_) => {
                counter!(CAPTURE_REJECTED_TOTAL).increment(1);
                warn!(
                    target: "promptshot::capture",
                    op = "capture::acquire",
                    result = "busy",
                    fingerprint = %fingerprint,
                    waited_ms = started_at.elapsed().as_millis() as u64,
                    "No render slot became free in time"
                );
                return Err(CaptureError::Busy {
                    waited: self.queue_timeout,
                });
            }
        };

        let deadline = Instant::now() + self.render_timeout;
        let rasterized = self
            .rasterizer
            .rasterize(html, self.viewport, deadline)
            .await;
        drop(permit);

        let png = match rasterized {
            Ok(png) => png,
            Err(RasterizeError::DeadlineExceeded) => {
                warn!(
                    target: "promptshot::capture",
                    op = "capture::rasterize",
                    result = "timeout",
                    fingerprint = %fingerprint,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Browser capture timed out"
                );
                return Err(CaptureError::Timeout(self.render_timeout));
            }
            Err(err) => {
                warn!(
                    target: "promptshot::capture",
                    op = "capture::rasterize",
                    result = "error",
                    fingerprint = %fingerprint,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "Browser capture failed"
                );
                return Err(CaptureError::Engine(err));
            }
        };

        let png_bytes = png.len();
        let artifact = self.storage.publish(fingerprint, png).await?;

        let elapsed = started_at.elapsed();
        histogram!(CAPTURE_MS).record(elapsed.as_secs_f64() * 1000.0);
        info!(
            target: "promptshot::capture",
            op = "capture::publish",
            result = "ok",
            fingerprint = %fingerprint,
            elapsed_ms = elapsed.as_millis() as u64,
            png_bytes,
            path = %artifact.file_path.display(),
            "Artifact published"
        );

        Ok(artifact)
    }
}
