use axum::{
    body::Body,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::error;

use crate::application::error::ErrorReport;
use crate::domain::fingerprint::Fingerprint;

use super::{ApiError, RelayState};

/// `GET /image/{file}`: serve a published artifact by its file name.
pub(super) async fn serve(State(state): State<RelayState>, Path(file): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::images::serve";

    let Ok(fingerprint) = Fingerprint::from_file_name(&file) else {
        return ApiError::not_found("Image not found").into_response();
    };

    match state.relay.capturer().storage().read(&fingerprint).await {
        Ok(Some(bytes)) => png_response(bytes),
        Ok(None) => ApiError::not_found("Image not found").into_response(),
        Err(err) => {
            error!(
                target: "promptshot::http::images",
                file = %file,
                error = %err,
                "failed to read stored image"
            );
            ApiError::internal("Image could not be read", None)
                .with_report(ErrorReport::from_error(
                    SOURCE,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &err,
                ))
                .into_response()
        }
    }
}

fn png_response(bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    // Artifacts are replaced in place when the same message is relayed again.
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    response
}
