use std::ffi::{OsStr, OsString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::http::response::StatusCode;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Canonicalization failed; the path does not exist.
    #[error("no such resource: {0}")]
    NotFound(String),
    /// The canonical path lies outside the document root.
    #[error("path escapes the document root: {0}")]
    Forbidden(String),
}

impl ResolveError {
    pub fn status(&self) -> StatusCode {
        match self {
            ResolveError::NotFound(_) => StatusCode::NotFound,
            ResolveError::Forbidden(_) => StatusCode::Forbidden,
        }
    }
}

/// The canonical directory every served path must stay under.
#[derive(Debug, Clone)]
pub struct DocumentRoot {
    canonical: PathBuf,
}

impl DocumentRoot {
    /// Canonicalizes `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let canonical = root.as_ref().canonicalize()?;
        if !canonical.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("document root {} is not a directory", canonical.display()),
            ));
        }
        Ok(Self { canonical })
    }

    pub fn path(&self) -> &Path {
        &self.canonical
    }

    /// Maps a request path onto the filesystem.
    ///
    /// The request path is percent-decoded to raw bytes and appended to the
    /// root, the result is canonicalized, and only then checked against the
    /// root. `..` segments (encoded or not) and symlinks are neutralized by
    /// the canonicalization, so the checks must run in exactly this order.
    pub fn resolve(&self, request_path: &str) -> Result<PathBuf, ResolveError> {
        let decoded = urlencoding::decode_binary(request_path.as_bytes());
        let mut joined = OsString::from(self.canonical.as_os_str());
        joined.push(OsStr::from_bytes(&decoded));

        let resolved = Path::new(&joined)
            .canonicalize()
            .map_err(|_| ResolveError::NotFound(request_path.to_string()))?;

        // Component-wise, so a sibling like `/srv/www2` never matches `/srv/www`.
        if !resolved.starts_with(&self.canonical) {
            return Err(ResolveError::Forbidden(request_path.to_string()));
        }

        Ok(resolved)
    }

    pub fn is_root(&self, resolved: &Path) -> bool {
        resolved == self.canonical
    }
}
