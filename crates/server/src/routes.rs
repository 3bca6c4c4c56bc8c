//! HTTP routes.
//!
//! `GET /catalogue-v1.xml` (and `HEAD`) serves the local catalogue copy with
//! conditional GET support. Other methods on that path answer 405 and every
//! other path answers 404.

use std::sync::Arc;

use axum::Router;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use tower_http::trace::TraceLayer;

use catalogue_core::{CatalogueCache, RequestValidators, ServingDecision, ServingPolicy};

use crate::error::ServeError;

pub const CATALOGUE_PATH: &str = "/catalogue-v1.xml";

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    cache: Arc<CatalogueCache>,
    policy: ServingPolicy,
}

impl AppState {
    pub fn new(cache: Arc<CatalogueCache>, policy: ServingPolicy) -> Self {
        Self { cache, policy }
    }
}

/// Creates the catalogue router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CATALOGUE_PATH, get(get_catalogue).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_catalogue(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request = RequestValidators::from_header_values(
        header_str(&headers, &header::IF_NONE_MATCH),
        header_str(&headers, &header::IF_MODIFIED_SINCE),
    );

    match state.policy.evaluate(state.cache.current(), &request, Utc::now()) {
        ServingDecision::Unavailable => {
            tracing::warn!("catalogue requested before a local copy is available");
            ServeError::Unavailable.into_response()
        }
        ServingDecision::NotModified(validators) => (
            StatusCode::NOT_MODIFIED,
            [(header::ETAG, validators.etag), (header::LAST_MODIFIED, validators.last_modified)],
        )
            .into_response(),
        ServingDecision::Content { snapshot, validators, cache_control, expires } => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/xml".to_string()),
                (header::ETAG, validators.etag),
                (header::LAST_MODIFIED, validators.last_modified),
                (header::CACHE_CONTROL, cache_control),
                (header::EXPIRES, expires),
            ],
            snapshot.content().to_owned(),
        )
            .into_response(),
    }
}

async fn not_found(uri: OriginalUri) -> ServeError {
    ServeError::NotFound(uri.0.path().to_string())
}

async fn method_not_allowed(method: Method) -> ServeError {
    ServeError::MethodNotAllowed(method.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
