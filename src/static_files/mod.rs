//! Everything that touches the document root.
//!
//! - **`resolver`**: confines request paths to the root
//! - **`listing`**: renders HTML directory listings
//! - **`reader`**: loads files under an advisory lock
//!
//! Nothing here ever writes below the root.

pub mod listing;
pub mod reader;
pub mod resolver;

use bytes::Bytes;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{LockMode, StaticFilesConfig};

pub use reader::ReadError;
pub use resolver::{DocumentRoot, ResolveError};

/// What a request path names once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    File(PathBuf),
    Directory(PathBuf),
    /// Exists but is neither a regular file nor a directory.
    Other(PathBuf),
}

#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: DocumentRoot,
    index: Option<String>,
    lock: LockMode,
}

impl StaticFiles {
    pub fn new(root: DocumentRoot, index: Option<String>, lock: LockMode) -> Self {
        Self { root, index, lock }
    }

    pub fn from_config(cfg: &StaticFilesConfig) -> io::Result<Self> {
        Ok(Self::new(
            DocumentRoot::new(&cfg.root)?,
            cfg.index.clone(),
            cfg.lock,
        ))
    }

    pub fn root(&self) -> &DocumentRoot {
        &self.root
    }

    /// Resolves `request_path` and classifies the result. A request for the
    /// root itself is answered with the index file when one exists.
    pub fn locate(&self, request_path: &str) -> Result<Resource, ResolveError> {
        let resolved = self.root.resolve(request_path)?;

        if self.root.is_root(&resolved) {
            if let Some(index) = self.index_file() {
                return Ok(Resource::File(index));
            }
        }

        Ok(classify(resolved))
    }

    fn index_file(&self) -> Option<PathBuf> {
        let index = self.index.as_deref()?;
        let path = self
            .root
            .resolve(&format!("/{}", urlencoding::encode(index)))
            .ok()?;
        fs::metadata(&path)
            .map(|meta| meta.is_file())
            .unwrap_or(false)
            .then_some(path)
    }

    pub fn read(&self, path: &Path) -> Result<Bytes, ReadError> {
        reader::read_file(path, self.lock)
    }

    /// Renders the listing for `dir`; `url_path` is the client-visible
    /// path and must end with `/`.
    pub fn list(&self, dir: &Path, url_path: &str) -> io::Result<String> {
        let with_parent = !self.root.is_root(dir);
        let entries = listing::read_entries(dir, with_parent)?;
        Ok(listing::render(url_path, &entries))
    }
}

fn classify(path: PathBuf) -> Resource {
    match fs::metadata(&path) {
        Ok(meta) if meta.is_dir() => Resource::Directory(path),
        Ok(meta) if meta.is_file() => Resource::File(path),
        _ => Resource::Other(path),
    }
}
