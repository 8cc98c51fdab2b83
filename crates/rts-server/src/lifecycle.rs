//! Server lifecycle.
//!
//! [`LiveServer`] owns both listeners, the broadcast hub and the change
//! coalescer, and moves through an explicit state machine:
//!
//! ```text
//! Stopped ──start──► Starting ──bound──► Running ──stop──► Stopping ──► Stopped
//!                        │
//!                        └──bind failed──► Stopped
//! ```
//!
//! `start` returns only after both ports are bound, which is the readiness
//! signal callers wait on before connecting.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ServerConfig;
use crate::app;
use crate::error::ServerError;
use crate::live_reload::{BroadcastHub, ChangeCoalescer, ChangeSink, DocumentKind};
use crate::resolver::StaticFileResolver;
use crate::state::AppState;

/// Lifecycle state of a [`LiveServer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    /// Nothing bound.
    Stopped,
    /// Binding listeners.
    Starting,
    /// Both listeners accepting.
    Running,
    /// Shutting listeners and connections down.
    Stopping,
}

/// Addresses of both listeners once they are bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ready {
    /// Static file server address.
    pub http_addr: SocketAddr,
    /// WebSocket endpoint address.
    pub ws_addr: SocketAddr,
}

/// Resources that exist only while running.
struct Running {
    ready: Ready,
    hub: Arc<BroadcastHub>,
    coalescer: ChangeCoalescer,
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<io::Result<()>>)>,
}

/// Static file server plus live broadcast endpoint.
pub struct LiveServer {
    config: ServerConfig,
    state: watch::Sender<ServerState>,
    running: Option<Running>,
}

impl LiveServer {
    /// Create a stopped server.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let (state, _) = watch::channel(ServerState::Stopped);
        Self {
            config,
            state,
            running: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Watch lifecycle state changes.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Listener addresses while running.
    pub fn ready(&self) -> Option<Ready> {
        self.running.as_ref().map(|r| r.ready)
    }

    /// Number of connected WebSocket clients (0 when stopped).
    pub fn client_count(&self) -> usize {
        self.running.as_ref().map_or(0, |r| r.hub.client_count())
    }

    /// Bind both listeners and start serving.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidState`] unless stopped, and
    /// [`ServerError::Bind`] if either port cannot be bound; the server is
    /// back in `Stopped` in that case.
    pub async fn start(&mut self) -> Result<Ready, ServerError> {
        self.require_state(ServerState::Stopped, "start")?;
        self.state.send_replace(ServerState::Starting);

        match self.launch().await {
            Ok(running) => {
                let ready = running.ready;
                self.running = Some(running);
                self.state.send_replace(ServerState::Running);
                tracing::info!(
                    http = %ready.http_addr,
                    ws = %ready.ws_addr,
                    root = %self.config.root_dir.display(),
                    "Server ready"
                );
                Ok(ready)
            }
            Err(e) => {
                self.state.send_replace(ServerState::Stopped);
                Err(e)
            }
        }
    }

    /// Stop serving: listeners shut down, pending changes are dropped and
    /// every client connection is closed.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidState`] unless running.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        self.require_state(ServerState::Running, "stop")?;
        let Some(running) = self.running.take() else {
            self.state.send_replace(ServerState::Stopped);
            return Ok(());
        };
        self.state.send_replace(ServerState::Stopping);
        tracing::info!("Stopping server");

        let _ = running.shutdown.send(true);
        running.coalescer.shutdown().await;

        // Upgraded sockets outlive their listener, so clients are closed only
        // once no further upgrade can register with the hub.
        for (name, task) in running.tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(listener = name, error = %e, "Listener failed"),
                Err(e) => tracing::warn!(listener = name, error = %e, "Listener task failed"),
            }
        }
        running.hub.close_all();

        self.state.send_replace(ServerState::Stopped);
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Submit an editor change.
    ///
    /// Changes to documents that are not HTML or JavaScript are ignored, as
    /// are changes while the server is not running. Returns whether the
    /// change was handed to the coalescer.
    pub fn submit_change(&self, kind: &DocumentKind, text: String) -> bool {
        if !kind.is_live() {
            tracing::trace!(%kind, "Ignoring change to non-live document");
            return false;
        }
        let Some(running) = &self.running else {
            tracing::debug!("Server is not running, change dropped");
            return false;
        };
        running.coalescer.submit(text);
        true
    }

    fn require_state(&self, expected: ServerState, operation: &'static str) -> Result<(), ServerError> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(ServerError::InvalidState { operation, state })
        }
    }

    async fn launch(&self) -> Result<Running, ServerError> {
        let config = &self.config;

        let http_listener = bind("http", &config.host, config.http_port).await?;
        let ws_listener = bind("websocket", &config.host, config.ws_port).await?;
        let ready = Ready {
            http_addr: http_listener.local_addr()?,
            ws_addr: ws_listener.local_addr()?,
        };

        let hub = Arc::new(BroadcastHub::new(config.echo_to_sender));
        let state = Arc::new(AppState {
            resolver: StaticFileResolver::new(config.root_dir.clone())
                .with_policy(config.traversal),
            hub: Arc::clone(&hub),
        });
        let coalescer =
            ChangeCoalescer::spawn(config.debounce, Arc::clone(&hub) as Arc<dyn ChangeSink>);

        let (shutdown, _) = watch::channel(false);
        let tasks = vec![
            (
                "http",
                spawn_listener(
                    http_listener,
                    app::create_static_router(Arc::clone(&state)),
                    shutdown.subscribe(),
                ),
            ),
            (
                "websocket",
                spawn_listener(
                    ws_listener,
                    app::create_ws_router(state),
                    shutdown.subscribe(),
                ),
            ),
        ];

        Ok(Running {
            ready,
            hub,
            coalescer,
            shutdown,
            tasks,
        })
    }
}

async fn bind(what: &'static str, host: &str, port: u16) -> Result<TcpListener, ServerError> {
    TcpListener::bind((host, port))
        .await
        .map_err(|source| ServerError::Bind {
            what,
            host: host.to_owned(),
            port,
            source,
        })
}

fn spawn_listener(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<io::Result<()>> {
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                // Sender dropped counts as shutdown too
                let _ = shutdown.changed().await;
            })
            .await
    })
}
