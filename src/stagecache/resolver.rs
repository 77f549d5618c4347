use failure::Fail;
use itertools::Itertools;
use std::path::{Path, PathBuf};

/// A logical path which cannot be mapped into the storage root. Rejected before
/// any filesystem or network access happens.
#[derive(Debug, Fail)]
#[fail(display = "invalid logical path {:?}: {}", path, reason)]
pub struct InvalidPathError {
    pub path: String,
    pub reason: &'static str,
}

/// The two locations a logical path maps to: where the file would live in local
/// storage and where to load it from on the remote origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub local_path: PathBuf,
    pub remote_url: String,
}

/// Maps logical file identifiers onto local storage paths and remote origin URLs.
pub struct PathResolver {
    root: PathBuf,
    remote_instance: String,
    base_url: String,
}

impl PathResolver {
    pub fn new(root: PathBuf, remote_instance: &str, base_url: &str) -> Self {
        PathResolver {
            root,
            remote_instance: remote_instance.trim_end_matches('/').to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Computes the local storage path and the remote origin URL for a logical path.
    ///
    /// The remote URL is the origin joined with the percent-encoded *local* path, so
    /// that the remote instance receives the same path the file would occupy here.
    pub fn resolve(&self, logical: &str) -> Result<Resolved, InvalidPathError> {
        let relative = self.sanitize(logical)?;
        let local_path = self.root.join(&relative);

        let local_str = local_path.to_string_lossy();
        let remote_url = format!(
            "{}/{}",
            self.remote_instance,
            encode_path(local_str.trim_start_matches('/'))
        );

        Ok(Resolved {
            local_path,
            remote_url,
        })
    }

    /// The URL under which a logical path is served from local storage. Built
    /// from the sanitized segments, so it always names the same file as the
    /// storage path computed by `resolve`.
    pub fn local_url(&self, logical: &str) -> Result<String, InvalidPathError> {
        let segments = self.segments(logical)?;
        Ok(format!(
            "{}/{}",
            self.base_url,
            segments
                .iter()
                .map(|segment| urlencoding::encode(segment))
                .join("/")
        ))
    }

    /// Whether the file is present in local storage. The path is canonicalized
    /// first; anything that resolves outside of the storage root (e.g. through a
    /// symlink) is treated as absent.
    pub fn exists(&self, local_path: &Path) -> bool {
        let canonical = match local_path.canonicalize() {
            Ok(path) => path,
            Err(_) => return false,
        };
        let root = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        if !canonical.starts_with(&root) {
            warn!(
                "{:?} resolves to {:?}, outside of the storage root {:?}",
                local_path, canonical, root
            );
            return false;
        }
        canonical.is_file()
    }

    /// Turns a logical path into a relative path strictly inside the storage root.
    fn sanitize(&self, logical: &str) -> Result<PathBuf, InvalidPathError> {
        Ok(self.segments(logical)?.iter().copied().collect())
    }

    /// Splits a logical path into its sanitized segments. Empty and `.` segments
    /// are dropped; anything that could escape the root is rejected.
    fn segments<'a>(&self, logical: &'a str) -> Result<Vec<&'a str>, InvalidPathError> {
        let reject = |reason| {
            Err(InvalidPathError {
                path: logical.to_string(),
                reason,
            })
        };

        if logical.starts_with('/') {
            return reject("absolute paths are not allowed");
        }
        if logical.contains('\\') {
            return reject("backslashes are not allowed");
        }
        if logical.split('/').any(|segment| segment == "..") {
            return reject("traversal segments are not allowed");
        }

        let segments: Vec<&str> = logical
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect();
        if segments.is_empty() {
            return reject("path is empty");
        }

        Ok(segments)
    }
}

/// Percent-encodes every path segment while keeping the `/` separators intact.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment))
        .join("/")
}
