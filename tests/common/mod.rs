#![allow(dead_code)]

use staticd::config::LockMode;
use staticd::static_files::{DocumentRoot, StaticFiles};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// A scratch directory removed on drop. `base` holds `www/`, the document
/// root, so tests can place files beside the root as well as inside it.
pub struct TempRoot {
    base: PathBuf,
}

impl TempRoot {
    pub fn new() -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
        let base = std::env::temp_dir().join(format!(
            "staticd-test-{}-{}",
            std::process::id(),
            id
        ));
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(base.join("www")).unwrap();
        Self { base }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn www(&self) -> PathBuf {
        self.base.join("www")
    }

    /// Writes `contents` to `rel` under the document root, creating parents.
    pub fn file(&self, rel: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.www().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn dir(&self, rel: &str) -> PathBuf {
        let path = self.www().join(rel);
        fs::create_dir_all(&path).unwrap();
        path
    }

    /// Writes a file next to the document root, outside it.
    pub fn outside(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.base.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn static_files(&self, index: Option<&str>) -> StaticFiles {
        StaticFiles::new(
            DocumentRoot::new(self.www()).unwrap(),
            index.map(str::to_string),
            LockMode::Shared,
        )
    }
}

impl Drop for TempRoot {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.base);
    }
}
