//! Editor document kinds.

use std::fmt;

use serde::Deserialize;

/// Kind of the edited document, as reported by the editor's language id.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum DocumentKind {
    /// HTML markup.
    Html,
    /// JavaScript source.
    JavaScript,
    /// Any other language id; never broadcast.
    Other(String),
}

impl DocumentKind {
    /// Whether changes to this kind of document are pushed to clients.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Html | Self::JavaScript)
    }
}

impl From<&str> for DocumentKind {
    fn from(language_id: &str) -> Self {
        match language_id.to_ascii_lowercase().as_str() {
            "html" => Self::Html,
            "javascript" => Self::JavaScript,
            _ => Self::Other(language_id.to_owned()),
        }
    }
}

impl From<String> for DocumentKind {
    fn from(language_id: String) -> Self {
        Self::from(language_id.as_str())
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Html => f.write_str("html"),
            Self::JavaScript => f.write_str("javascript"),
            Self::Other(id) => f.write_str(id),
        }
    }
}
