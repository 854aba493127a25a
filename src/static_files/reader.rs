use bytes::Bytes;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

use crate::config::LockMode;
use crate::http::response::StatusCode;
use crate::sys::{FlockGuard, FlockKind};

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("file not found")]
    NotFound,
    #[error("not a regular file")]
    NotRegular,
    #[error("permission denied")]
    Denied,
    #[error("cannot lock file: {0}")]
    Lock(#[source] io::Error),
    #[error("read failed: {0}")]
    Io(#[source] io::Error),
}

impl ReadError {
    pub fn status(&self) -> StatusCode {
        match self {
            ReadError::NotFound | ReadError::NotRegular => StatusCode::NotFound,
            ReadError::Denied => StatusCode::Forbidden,
            ReadError::Lock(_) | ReadError::Io(_) => StatusCode::InternalServerError,
        }
    }
}

impl From<io::Error> for ReadError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => ReadError::NotFound,
            io::ErrorKind::PermissionDenied => ReadError::Denied,
            _ => ReadError::Io(e),
        }
    }
}

/// Reads a whole regular file into memory while holding an advisory lock.
///
/// The lock is taken after opening and released when the guard drops,
/// before the bytes are handed back.
pub fn read_file(path: &Path, lock: LockMode) -> Result<Bytes, ReadError> {
    let file = File::open(path)?;
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(ReadError::NotRegular);
    }

    let _guard = match lock {
        LockMode::Shared => Some(FlockGuard::acquire(&file, FlockKind::Shared)),
        LockMode::Exclusive => Some(FlockGuard::acquire(&file, FlockKind::Exclusive)),
        LockMode::None => None,
    }
    .transpose()
    .map_err(ReadError::Lock)?;

    let mut contents = Vec::with_capacity(meta.len() as usize);
    (&file).read_to_end(&mut contents).map_err(ReadError::Io)?;

    Ok(Bytes::from(contents))
}
