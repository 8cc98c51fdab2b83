//! Router construction.
//!
//! Builds one router per listener: static files on the HTTP port and the
//! broadcast endpoint on the WebSocket port.

use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::live_reload;
use crate::state::AppState;
use crate::static_files;

/// Create the static file router.
///
/// # Arguments
///
/// * `state` - Shared application state
pub(crate) fn create_static_router(state: Arc<AppState>) -> Router {
    static_files::static_router()
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Create the WebSocket router.
///
/// Clients may upgrade on any path.
pub(crate) fn create_ws_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(live_reload::ws_handler)
        .with_state(state)
}
