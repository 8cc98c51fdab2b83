//! Static file serving.
//!
//! Every GET path is resolved against the root directory. Bytes are passed
//! through unchanged with no content type; failures become plain-text
//! 404/500 responses.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use crate::state::AppState;

/// Create router for static file serving.
pub(crate) fn static_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(serve_file))
        .route("/{*path}", get(serve_file))
}

/// Serve the file a request path resolves to.
async fn serve_file(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    match state.resolver.read(uri.path()).await {
        Ok(bytes) => Response::new(Body::from(bytes)),
        Err(err) => {
            tracing::debug!(
                path = %uri.path(),
                resolved = %err.path().display(),
                error = %err,
                "Static request failed"
            );
            err.into_response()
        }
    }
}
