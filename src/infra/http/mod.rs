mod error;
mod images;
mod middleware;
mod relay;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, codes};
pub use middleware::RequestContext;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::application::relay::RelayService;
use crate::config::{Settings, WrongMethodStatus};

use self::middleware::{log_requests, log_responses, set_request_context};

pub const RELAY_ROUTE: &str = "/api";
pub const IMAGE_ROUTE: &str = "/image/{file}";

#[derive(Clone)]
pub struct RelayState {
    pub relay: Arc<RelayService>,
    pub wrong_method_status: WrongMethodStatus,
    pub max_body_bytes: usize,
    pub serve_images: bool,
}

impl RelayState {
    pub fn new(relay: Arc<RelayService>, settings: &Settings) -> Self {
        Self {
            relay,
            wrong_method_status: settings.server.wrong_method_status,
            max_body_bytes: settings.server.max_body_bytes,
            serve_images: settings.publish.serve_images,
        }
    }
}

/// Build the service router: `POST /api`, optionally `GET /image/{file}`.
pub fn build_router(state: RelayState) -> Router {
    let mut router = Router::new().route(
        RELAY_ROUTE,
        post(relay::submit).fallback(relay::wrong_method),
    );
    if state.serve_images {
        router = router.route(IMAGE_ROUTE, get(images::serve));
    }

    router
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(log_requests))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn not_found() -> Response {
    ApiError::not_found("Route not found").into_response()
}
