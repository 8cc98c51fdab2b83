//! `rts serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use rts_config::{CliSettings, Config};
use rts_server::{LiveServer, Ready, server_config_from_rts_config};
use tokio::task::JoinHandle;

use crate::bridge;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Directory to serve (overrides config; default: current directory).
    root_dir: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover rts.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Static file port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// WebSocket port (overrides config).
    #[arg(long)]
    ws_port: Option<u16>,

    /// Quiet period in milliseconds before an editor change is pushed.
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Answer 404 for request paths containing `..`.
    #[arg(long)]
    confine_to_root: bool,

    /// Do not send a client's message back to that client.
    #[arg(long)]
    no_echo: bool,

    /// Do not open a browser once the server is ready.
    #[arg(long)]
    no_open: bool,

    /// Read editor change events (JSON lines) from stdin; EOF stops the server.
    #[arg(long)]
    stdin: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            host: self.host,
            http_port: self.port,
            ws_port: self.ws_port,
            root_dir: self.root_dir,
            confine_to_root: self.confine_to_root.then_some(true),
            debounce_ms: self.debounce_ms,
            echo_to_sender: self.no_echo.then_some(false),
            open_browser: self.no_open.then_some(false),
        };

        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        output.info(&format!("Root directory: {}", config.root_dir.display()));
        if !config.root_dir.is_dir() {
            output.warning("Root directory does not exist; every request will be 404");
        }

        let mut server = LiveServer::new(server_config_from_rts_config(&config));
        let ready = server.start().await?;

        output.highlight(&format!(
            "Serving on http://localhost:{}",
            ready.http_addr.port()
        ));
        output.info(&format!("Live updates on ws://localhost:{}", ready.ws_addr.port()));
        output.ready(&ready);

        if config.live_reload.open_browser {
            open_browser(&ready);
        }

        tokio::select! {
            () = shutdown_signal() => {}
            result = bridge::forward(tokio::io::BufReader::new(tokio::io::stdin()), &server), if self.stdin => {
                match result {
                    Ok(count) => tracing::info!(changes = count, "Editor closed stdin"),
                    Err(e) => tracing::warn!(error = %e, "Failed reading stdin"),
                }
            }
        }

        server.stop().await?;
        output.info("Server stopped.");
        Ok(())
    }
}

/// Open the default browser on the static server.
///
/// Launching may block on the platform opener, so it runs on the blocking
/// pool and is not awaited.
fn open_browser(ready: &Ready) {
    launch_browser(browser_url(ready), webbrowser::open);
}

fn launch_browser<F>(url: String, opener: F) -> JoinHandle<()>
where
    F: FnOnce(&str) -> std::io::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(move || match opener(&url) {
        Ok(()) => tracing::info!(%url, "Opened browser"),
        Err(e) => tracing::warn!(%url, error = %e, "Failed to open browser"),
    })
}

fn browser_url(ready: &Ready) -> String {
    format!("http://localhost:{}", ready.http_addr.port())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_browser_url_uses_http_port() {
        let ready = Ready {
            http_addr: "127.0.0.1:4000".parse().unwrap(),
            ws_addr: "127.0.0.1:4001".parse().unwrap(),
        };
        assert_eq!(browser_url(&ready), "http://localhost:4000");
    }

    #[tokio::test]
    async fn test_launch_browser_does_not_block_runtime() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (opened_tx, opened_rx) = mpsc::channel();

        // The opener blocks until released; on the runtime thread this
        // single-threaded test would never reach the release below
        let handle = launch_browser("http://localhost:1".to_owned(), move |url| {
            let _ = release_rx.recv();
            let _ = opened_tx.send(url.to_owned());
            Ok(())
        });

        tokio::task::yield_now().await;
        release_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(opened_rx.recv().unwrap(), "http://localhost:1");
    }
}
