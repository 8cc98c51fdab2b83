//! Colored terminal output utilities.

use console::{Style, Term};
use rts_server::Ready;

/// Terminal output formatter.
///
/// Status messages go to stderr; stdout carries only the readiness line
/// that a parent process waits for.
pub(crate) struct Output {
    term: Term,
    stdout: Term,
    yellow: Style,
    red: Style,
    cyan_bold: Style,
}

impl Output {
    /// Create a new output formatter.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
            stdout: Term::stdout(),
            yellow: Style::new().yellow(),
            red: Style::new().red(),
            cyan_bold: Style::new().cyan().bold(),
        }
    }

    /// Print an info message.
    pub(crate) fn info(&self, msg: &str) {
        let _ = self.term.write_line(msg);
    }

    /// Print a warning message (yellow).
    pub(crate) fn warning(&self, msg: &str) {
        let _ = self.term.write_line(&self.yellow.apply_to(msg).to_string());
    }

    /// Print an error message (red).
    pub(crate) fn error(&self, msg: &str) {
        let _ = self.term.write_line(&self.red.apply_to(msg).to_string());
    }

    /// Print a highlighted message (cyan bold).
    pub(crate) fn highlight(&self, msg: &str) {
        let _ = self
            .term
            .write_line(&self.cyan_bold.apply_to(msg).to_string());
    }

    /// Print the readiness line on stdout.
    pub(crate) fn ready(&self, ready: &Ready) {
        let _ = self.stdout.write_line(&ready_line(ready));
    }
}

/// Machine-readable line announcing both listeners are bound.
pub(crate) fn ready_line(ready: &Ready) -> String {
    format!("ready http={} ws={}", ready.http_addr, ready.ws_addr)
}
