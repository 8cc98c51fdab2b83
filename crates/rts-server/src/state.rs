//! Application state.
//!
//! Shared state for the static and WebSocket handlers.

use std::sync::Arc;

use crate::live_reload::BroadcastHub;
use crate::resolver::StaticFileResolver;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Read-only path resolution for static requests.
    pub(crate) resolver: StaticFileResolver,
    /// Connected WebSocket clients.
    pub(crate) hub: Arc<BroadcastHub>,
}
