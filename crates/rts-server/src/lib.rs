//! Static file server and live broadcast hub for RTS.
//!
//! This crate provides two axum listeners driven by one [`LiveServer`]:
//! - Static files from a root directory (HTTP, default port 8080)
//! - A WebSocket endpoint that fans editor changes out to every connected
//!   browser (default port 8081)
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use rts_server::{DocumentKind, LiveServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         root_dir: PathBuf::from("site"),
//!         ..ServerConfig::default()
//!     };
//!
//!     let mut server = LiveServer::new(config);
//!     let ready = server.start().await.unwrap();
//!     println!("serving on {}", ready.http_addr);
//!
//!     server.submit_change(&DocumentKind::Html, "<h1>hi</h1>".to_owned());
//!     server.stop().await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Editor ──submit_change──► ChangeCoalescer ──emit──► BroadcastHub ──WS──► Browsers
//!                                                         ▲
//!                                   Browser WS frames ────┘ (relayed to all)
//!
//! Browser ──HTTP GET──► static_files ──► StaticFileResolver ──► filesystem
//! ```

mod app;
mod error;
mod lifecycle;
mod live_reload;
mod resolver;
mod state;
mod static_files;

use std::path::PathBuf;
use std::time::Duration;

pub use error::{ResolveError, ServerError};
pub use lifecycle::{LiveServer, Ready, ServerState};
pub use live_reload::{
    BroadcastHub, CLIENT_QUEUE_CAPACITY, ChangeCoalescer, ChangeSink, ClientConnection, ClientId,
    DEFAULT_WINDOW, DocumentKind,
};
pub use resolver::{INDEX_FILE, StaticFileResolver, TraversalPolicy};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address both listeners bind to.
    pub host: String,
    /// Static file port.
    pub http_port: u16,
    /// WebSocket port.
    pub ws_port: u16,
    /// Directory served as `/`.
    pub root_dir: PathBuf,
    /// Treatment of `..` in request paths.
    pub traversal: TraversalPolicy,
    /// Coalescing window for editor changes.
    pub debounce: Duration,
    /// Relay client messages back to their sender too.
    pub echo_to_sender: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            http_port: 8080,
            ws_port: 8081,
            root_dir: PathBuf::from("."),
            traversal: TraversalPolicy::Permissive,
            debounce: DEFAULT_WINDOW,
            echo_to_sender: true,
        }
    }
}

/// Create server configuration from RTS config.
#[must_use]
pub fn server_config_from_rts_config(config: &rts_config::Config) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        http_port: config.server.http_port,
        ws_port: config.server.ws_port,
        root_dir: config.root_dir.clone(),
        traversal: if config.server.confine_to_root {
            TraversalPolicy::Confined
        } else {
            TraversalPolicy::Permissive
        },
        debounce: config.live_reload.debounce(),
        echo_to_sender: config.live_reload.echo_to_sender,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_ports() {
        let config = ServerConfig::default();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.ws_port, 8081);
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert!(config.echo_to_sender);
    }

    #[test]
    fn test_from_rts_config() {
        let mut rts = rts_config::Config::default();
        rts.server.http_port = 3000;
        rts.server.ws_port = 3001;
        rts.server.confine_to_root = true;
        rts.live_reload.debounce_ms = 250;
        rts.live_reload.echo_to_sender = false;
        rts.root_dir = PathBuf::from("/site");

        let config = server_config_from_rts_config(&rts);

        assert_eq!(config.http_port, 3000);
        assert_eq!(config.ws_port, 3001);
        assert_eq!(config.traversal, TraversalPolicy::Confined);
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert!(!config.echo_to_sender);
        assert_eq!(config.root_dir, PathBuf::from("/site"));
    }
}
