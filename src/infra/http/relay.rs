use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::config::WrongMethodStatus;

use super::{ApiError, RelayState, codes};

#[derive(Debug, Serialize)]
pub(super) struct ImageResponse {
    pub image: String,
}

/// `POST /api`: run the relay pipeline and answer with the artifact URL.
pub(super) async fn submit(
    State(state): State<RelayState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };

    // Detached from the connection so a client hang-up does not cancel work
    // already handed to the upstream or the browser.
    let relay = state.relay.clone();
    let task = tokio::spawn(async move { relay.relay(&body).await });

    match task.await {
        Ok(Ok(artifact)) => (
            StatusCode::OK,
            Json(ImageResponse {
                image: artifact.public_url,
            }),
        )
            .into_response(),
        Ok(Err(err)) => ApiError::from(err).into_response(),
        Err(join_error) => ApiError::internal("Relay task failed", None)
            .with_report(ErrorReport::from_error(
                "infra::http::relay::submit",
                StatusCode::INTERNAL_SERVER_ERROR,
                &join_error,
            ))
            .into_response(),
    }
}

pub(super) async fn wrong_method(State(state): State<RelayState>) -> Response {
    match state.wrong_method_status {
        WrongMethodStatus::NotFound => ApiError::not_found("Route not found").into_response(),
        WrongMethodStatus::MethodNotAllowed => ApiError::method_not_allowed().into_response(),
    }
}

fn rejection_response(rejection: BytesRejection) -> Response {
    let status = rejection.status();
    let api = if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(
            status,
            codes::PAYLOAD_TOO_LARGE,
            "Request body is too large",
            None,
        )
    } else {
        ApiError::bad_request("Request body could not be read", Some(rejection.body_text()))
    };
    api.with_report(ErrorReport::from_error(
        "infra::http::relay::submit",
        status,
        &rejection,
    ))
    .into_response()
}
