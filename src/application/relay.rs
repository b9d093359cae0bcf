//! Per-request orchestration: validate, mint, call upstream, render, capture.

use std::{sync::Arc, time::Duration, time::Instant};

use metrics::{counter, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::application::capture::{CaptureError, ImageCapturer};
use crate::application::credential::{self, CredentialError};
use crate::application::document::{DocumentError, DocumentRenderer};
use crate::application::ports::{CompletionClient, UpstreamError};
use crate::domain::{
    artifact::ImageArtifact,
    fingerprint::Fingerprint,
    request::{InboundRequest, InputError},
};
use crate::infra::artifacts::ArtifactStorageError;
use crate::infra::telemetry::{RELAY_REQUESTS_TOTAL, UPSTREAM_MS};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    BadInput(#[from] InputError),
    #[error("invalid credential input")]
    InvalidCredentialInput(#[source] CredentialError),
    #[error("upstream call failed")]
    UpstreamUnavailable(#[source] UpstreamError),
    #[error("upstream answer could not be read")]
    UpstreamMalformedResponse(#[source] UpstreamError),
    #[error("document rendering failed")]
    Document(#[source] DocumentError),
    #[error("render engine unavailable")]
    RenderEngineUnavailable(#[source] CaptureError),
    #[error("all render slots are busy")]
    RenderBusy { retry_after: Duration },
    #[error("artifact could not be written")]
    PersistenceFailure(#[source] ArtifactStorageError),
}

impl RelayError {
    /// Stable label for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            RelayError::BadInput(_) => "bad_input",
            RelayError::InvalidCredentialInput(_) => "invalid_credential_input",
            RelayError::UpstreamUnavailable(_) => "upstream_unavailable",
            RelayError::UpstreamMalformedResponse(_) => "upstream_malformed_response",
            RelayError::Document(_) => "document_error",
            RelayError::RenderEngineUnavailable(_) => "render_engine_unavailable",
            RelayError::RenderBusy { .. } => "render_busy",
            RelayError::PersistenceFailure(_) => "persistence_failure",
        }
    }
}

impl From<CredentialError> for RelayError {
    fn from(err: CredentialError) -> Self {
        RelayError::InvalidCredentialInput(err)
    }
}

impl From<UpstreamError> for RelayError {
    fn from(err: UpstreamError) -> Self {
        if err.is_unavailable() {
            RelayError::UpstreamUnavailable(err)
        } else {
            RelayError::UpstreamMalformedResponse(err)
        }
    }
}

impl From<DocumentError> for RelayError {
    fn from(err: DocumentError) -> Self {
        RelayError::Document(err)
    }
}

impl From<CaptureError> for RelayError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Busy { waited } => RelayError::RenderBusy {
                retry_after: waited,
            },
            CaptureError::Persistence(inner) => RelayError::PersistenceFailure(inner),
            other => RelayError::RenderEngineUnavailable(other),
        }
    }
}

/// Pipeline stage reached by a request, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStage {
    Received,
    Validated,
    Authenticated,
    UpstreamCalled,
    Rendered,
    Captured,
    Responded,
}

impl RelayStage {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayStage::Received => "received",
            RelayStage::Validated => "validated",
            RelayStage::Authenticated => "authenticated",
            RelayStage::UpstreamCalled => "upstream_called",
            RelayStage::Rendered => "rendered",
            RelayStage::Captured => "captured",
            RelayStage::Responded => "responded",
        }
    }
}

pub struct RelayService {
    upstream: Arc<dyn CompletionClient>,
    renderer: DocumentRenderer,
    capturer: ImageCapturer,
}

impl RelayService {
    pub fn new(upstream: Arc<dyn CompletionClient>, capturer: ImageCapturer) -> Self {
        Self {
            upstream,
            renderer: DocumentRenderer::new(),
            capturer,
        }
    }

    pub fn capturer(&self) -> &ImageCapturer {
        &self.capturer
    }

    /// Run the full pipeline for one raw request body.
    pub async fn relay(&self, body: &[u8]) -> Result<ImageArtifact, RelayError> {
        let started_at = Instant::now();
        let result = self.run(body).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.outcome(),
        };
        counter!(RELAY_REQUESTS_TOTAL, "outcome" => outcome).increment(1);

        match &result {
            Ok(artifact) => {
                trace_stage(RelayStage::Responded);
                info!(
                    target: "promptshot::relay",
                    op = "relay",
                    result = outcome,
                    fingerprint = %artifact.fingerprint,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Relay completed"
                );
            }
            Err(err) => {
                warn!(
                    target: "promptshot::relay",
                    op = "relay",
                    result = outcome,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "Relay failed"
                );
            }
        }

        result
    }

    async fn run(&self, body: &[u8]) -> Result<ImageArtifact, RelayError> {
        trace_stage(RelayStage::Received);

        let request = InboundRequest::from_body(body)?;
        trace_stage(RelayStage::Validated);

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let credential = credential::mint_from_key(&request.api_key, &request.expiry_seconds, now)?;
        trace_stage(RelayStage::Authenticated);

        let upstream_started = Instant::now();
        let answer = self
            .upstream
            .complete(credential.token(), &request.model, &request.message)
            .await;
        histogram!(UPSTREAM_MS).record(upstream_started.elapsed().as_secs_f64() * 1000.0);
        let answer = answer?;
        trace_stage(RelayStage::UpstreamCalled);

        let fingerprint = Fingerprint::of(&request.message);
        self.render_and_capture(&answer, &fingerprint).await
    }

    /// Render markdown to a document and publish its capture under `fingerprint`.
    pub async fn render_and_capture(
        &self,
        markdown: &str,
        fingerprint: &Fingerprint,
    ) -> Result<ImageArtifact, RelayError> {
        let html = self.renderer.render(markdown)?;
        trace_stage(RelayStage::Rendered);

        let artifact = self.capturer.capture(&html, fingerprint).await?;
        trace_stage(RelayStage::Captured);
        Ok(artifact)
    }
}

fn trace_stage(stage: RelayStage) {
    debug!(target: "promptshot::relay", stage = stage.as_str(), "Relay stage reached");
}
