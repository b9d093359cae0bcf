//! Chat-completion client speaking to the configured upstream endpoint.

use std::time::Instant;

use async_trait::async_trait;
use axum::http::{HeaderValue, header::AUTHORIZATION};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::application::ports::{CompletionClient, UpstreamError};
use crate::config::UpstreamSettings;

use super::error::InfraError;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Clone, Debug)]
pub struct ReqwestCompletionClient {
    client: Client,
    endpoint: Url,
}

impl ReqwestCompletionClient {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("promptshot/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
        })
    }
}

#[async_trait]
impl CompletionClient for ReqwestCompletionClient {
    async fn complete(
        &self,
        token: &str,
        model: &str,
        message: &str,
    ) -> Result<String, UpstreamError> {
        let started_at = Instant::now();
        // The upstream takes the bare token, without a `Bearer` scheme.
        let authorization = HeaderValue::from_str(token)
            .map_err(|err| UpstreamError::unavailable(format!("invalid token header: {err}")))?;
        let body = CompletionRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: message,
            }],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, authorization)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                warn!(
                    target: "promptshot::upstream",
                    op = "upstream::complete",
                    result = "transport_error",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    timeout = err.is_timeout(),
                    error = %err,
                    "Upstream request failed"
                );
                UpstreamError::unavailable(err)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                target: "promptshot::upstream",
                op = "upstream::complete",
                result = "status",
                status = status.as_u16(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "Upstream returned a non-success status"
            );
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let payload = response.bytes().await.map_err(UpstreamError::unavailable)?;
        let answer = extract_answer(&payload)?;

        debug!(
            target: "promptshot::upstream",
            op = "upstream::complete",
            result = "ok",
            model,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            answer_bytes = answer.len(),
            "Upstream answer received"
        );
        Ok(answer)
    }
}

/// Pull `choices[0].message.content` out of a completion response body.
pub fn extract_answer(payload: &[u8]) -> Result<String, UpstreamError> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|err| UpstreamError::malformed(format!("body is not JSON: {err}")))?;

    let choices = value
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| UpstreamError::malformed("`choices` is missing or not an array"))?;
    let first = choices
        .first()
        .ok_or_else(|| UpstreamError::malformed("`choices` is empty"))?;
    let message = first
        .as_object()
        .and_then(|choice| choice.get("message"))
        .and_then(Value::as_object)
        .ok_or_else(|| UpstreamError::malformed("`choices[0].message` is not an object"))?;
    message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| UpstreamError::malformed("`choices[0].message.content` is not a string"))
}
