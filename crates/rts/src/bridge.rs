//! Editor bridge over stdin.
//!
//! An editor integration spawns `rts serve --stdin` and writes one JSON
//! object per line:
//!
//! ```text
//! {"kind": "html", "text": "<h1>full document</h1>"}
//! ```
//!
//! `kind` is the editor's language id. Each line becomes one
//! `submit_change` call; malformed lines are logged and skipped.

use rts_server::{DocumentKind, LiveServer};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// One change event from the editor.
#[derive(Debug, Deserialize)]
pub(crate) struct ChangeEvent {
    /// Language id of the edited document.
    pub(crate) kind: DocumentKind,
    /// Full document text.
    pub(crate) text: String,
}

/// Forward change events from `reader` until EOF.
///
/// Returns the number of changes handed to the server.
pub(crate) async fn forward<R>(mut reader: R, server: &LiveServer) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut forwarded = 0;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        let bytes = line.trim_ascii();
        if bytes.is_empty() {
            continue;
        }

        // Invalid UTF-8 surfaces here as a parse error, not an I/O error
        match serde_json::from_slice::<ChangeEvent>(bytes) {
            Ok(event) => {
                tracing::debug!(kind = %event.kind, bytes = event.text.len(), "Change from editor");
                if server.submit_change(&event.kind, event.text) {
                    forwarded += 1;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring malformed change event"),
        }
    }

    Ok(forwarded)
}
