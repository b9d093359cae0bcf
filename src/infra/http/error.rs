use axum::Json;
use axum::http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::relay::RelayError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const METHOD_NOT_ALLOWED: &str = "method_not_allowed";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const INVALID_CREDENTIAL: &str = "invalid_credential_input";
    pub const UPSTREAM_UNAVAILABLE: &str = "upstream_unavailable";
    pub const UPSTREAM_MALFORMED: &str = "upstream_malformed_response";
    pub const RENDER: &str = "render_error";
    pub const RENDER_UNAVAILABLE: &str = "render_engine_unavailable";
    pub const RENDER_BUSY: &str = "render_busy";
    pub const PERSISTENCE: &str = "persistence_failure";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    retry_after: Option<u64>,
    report: Option<ErrorReport>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            retry_after: None,
            report: None,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            codes::METHOD_NOT_ALLOWED,
            "Only POST is accepted",
            None,
        )
    }

    pub fn internal(message: &'static str, hint: Option<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL,
            message,
            hint,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds.max(1));
        self
    }

    pub(crate) fn with_report(mut self, report: ErrorReport) -> Self {
        self.report = Some(report);
        self
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        const SOURCE: &str = "infra::http::relay";

        let api = match &err {
            RelayError::BadInput(input) => {
                ApiError::bad_request("Request body is invalid", Some(input.to_string()))
            }
            RelayError::InvalidCredentialInput(cause) => ApiError::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_CREDENTIAL,
                "Credential could not be minted from request",
                Some(cause.to_string()),
            ),
            RelayError::UpstreamUnavailable(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::UPSTREAM_UNAVAILABLE,
                "Upstream completion service is unavailable",
                None,
            ),
            RelayError::UpstreamMalformedResponse(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::UPSTREAM_MALFORMED,
                "Upstream returned an unreadable answer",
                None,
            ),
            RelayError::Document(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::RENDER,
                "Answer could not be rendered",
                None,
            ),
            RelayError::RenderEngineUnavailable(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::RENDER_UNAVAILABLE,
                "Render engine is unavailable",
                None,
            ),
            RelayError::RenderBusy { retry_after } => {
                let seconds = retry_after.as_secs();
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    codes::RENDER_BUSY,
                    "All render slots are busy",
                    Some(format!("Retry after {} seconds", seconds.max(1))),
                )
                .with_retry_after(seconds)
            }
            RelayError::PersistenceFailure(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::PERSISTENCE,
                "Image could not be stored",
                None,
            ),
        };

        let report = ErrorReport::from_error(SOURCE, api.status, &err);
        api.with_report(report)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = self.report.unwrap_or_else(|| {
            ErrorReport::from_message(
                "infra::http",
                self.status,
                format!(
                    "{}: {}",
                    self.code,
                    self.hint.as_deref().unwrap_or(self.message)
                ),
            )
        });
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(seconds) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        // Attach a structured report so shared logging middleware can emit rich diagnostics.
        report.attach(&mut response);
        response
    }
}
