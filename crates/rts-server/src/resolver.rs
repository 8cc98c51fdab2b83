//! Request path to filesystem path resolution.

use std::path::{Component, Path, PathBuf};

use crate::error::ResolveError;

/// Document served for directory requests.
pub const INDEX_FILE: &str = "index.html";

/// How request paths containing `..` are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TraversalPolicy {
    /// Join verbatim; `..` segments may leave the root.
    #[default]
    Permissive,
    /// Requests with a `..` component are reported as not found.
    Confined,
}

/// Maps request paths onto files beneath a root directory.
#[derive(Clone, Debug)]
pub struct StaticFileResolver {
    root: PathBuf,
    policy: TraversalPolicy,
}

impl StaticFileResolver {
    /// Create a resolver for `root` with the permissive policy.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            policy: TraversalPolicy::default(),
        }
    }

    /// Set the traversal policy.
    #[must_use]
    pub fn with_policy(mut self, policy: TraversalPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Join the root and request path without touching the filesystem.
    ///
    /// Leading slashes are stripped first: joining an absolute path would
    /// replace the root instead of extending it.
    pub fn join(&self, request_path: &str) -> PathBuf {
        self.root.join(request_path.trim_start_matches('/'))
    }

    /// Resolve a request path to a candidate file.
    ///
    /// Directories resolve to their `index.html`, which is not checked for
    /// existence here.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotFound`] carrying the joined path if it
    /// cannot be statted, or if the policy rejects it.
    pub async fn resolve(&self, request_path: &str) -> Result<PathBuf, ResolveError> {
        let joined = self.join(request_path);

        if self.policy == TraversalPolicy::Confined && escapes_root(request_path) {
            tracing::debug!(path = %request_path, "Rejected parent directory traversal");
            return Err(ResolveError::NotFound(joined));
        }

        let Ok(metadata) = tokio::fs::metadata(&joined).await else {
            return Err(ResolveError::NotFound(joined));
        };

        if metadata.is_dir() {
            Ok(joined.join(INDEX_FILE))
        } else {
            Ok(joined)
        }
    }

    /// Resolve a request path and read the file bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotFound`] when resolution fails and
    /// [`ResolveError::ReadFailure`] when the resolved file cannot be read.
    pub async fn read(&self, request_path: &str) -> Result<Vec<u8>, ResolveError> {
        let path = self.resolve(request_path).await?;

        tokio::fs::read(&path)
            .await
            .map_err(|source| ResolveError::ReadFailure { path, source })
    }
}

/// Whether the request path contains a `..` component.
fn escapes_root(request_path: &str) -> bool {
    Path::new(request_path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        std::fs::create_dir(dir.path().join("guide")).unwrap();
        std::fs::write(dir.path().join("guide/index.html"), "guide").unwrap();
        std::fs::write(dir.path().join("app.js"), "let x = 1;").unwrap();
        dir
    }

    #[test]
    fn test_join_strips_leading_slash() {
        let resolver = StaticFileResolver::new("/site");
        assert_eq!(resolver.join("/app.js"), PathBuf::from("/site/app.js"));
        assert_eq!(resolver.join("//a/b.css"), PathBuf::from("/site/a/b.css"));
    }

    #[test]
    fn test_join_keeps_parent_segments() {
        let resolver = StaticFileResolver::new("/site");
        assert_eq!(
            resolver.join("/../etc/hosts"),
            PathBuf::from("/site/../etc/hosts")
        );
    }

    #[tokio::test]
    async fn test_resolve_regular_file() {
        let dir = site();
        let resolver = StaticFileResolver::new(dir.path());

        let path = resolver.resolve("/app.js").await.unwrap();
        assert_eq!(path, dir.path().join("app.js"));
    }

    #[tokio::test]
    async fn test_resolve_root_to_index() {
        let dir = site();
        let resolver = StaticFileResolver::new(dir.path());

        let path = resolver.resolve("/").await.unwrap();
        assert_eq!(path.file_name().unwrap(), INDEX_FILE);
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<h1>hi</h1>");
    }

    #[tokio::test]
    async fn test_resolve_directory_equivalent_to_index() {
        let dir = site();
        let resolver = StaticFileResolver::new(dir.path());

        let via_dir = resolver.read("/guide").await.unwrap();
        let via_index = resolver.read("/guide/index.html").await.unwrap();
        assert_eq!(via_dir, via_index);
    }

    #[tokio::test]
    async fn test_resolve_missing_reports_joined_path() {
        let dir = site();
        let resolver = StaticFileResolver::new(dir.path());

        let err = resolver.resolve("/missing.js").await.unwrap_err();
        match err {
            ResolveError::NotFound(path) => assert_eq!(path, dir.path().join("missing.js")),
            ResolveError::ReadFailure { .. } => panic!("expected NotFound"),
        }
    }

    #[tokio::test]
    async fn test_read_directory_without_index_fails() {
        let dir = site();
        std::fs::create_dir(dir.path().join("empty")).unwrap();
        let resolver = StaticFileResolver::new(dir.path());

        let err = resolver.read("/empty").await.unwrap_err();
        assert!(matches!(err, ResolveError::ReadFailure { .. }));
    }

    #[tokio::test]
    async fn test_permissive_policy_follows_parent_segments() {
        let dir = site();
        let resolver = StaticFileResolver::new(dir.path().join("guide"));

        let bytes = resolver.read("/../app.js").await.unwrap();
        assert_eq!(bytes, b"let x = 1;");
    }

    #[tokio::test]
    async fn test_confined_policy_rejects_parent_segments() {
        let dir = site();
        let resolver =
            StaticFileResolver::new(dir.path().join("guide")).with_policy(TraversalPolicy::Confined);

        let err = resolver.read("/../app.js").await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));

        // Ordinary paths still resolve
        assert_eq!(resolver.read("/index.html").await.unwrap(), b"guide");
    }
}
