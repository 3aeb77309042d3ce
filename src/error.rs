//! Error kinds raised by directory listing and file transfer operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from [`DirLister`](crate::DirLister) and [`FileHandle`](crate::FileHandle) operations.
///
/// Validation failures are returned to the immediate caller and never retried
/// internally.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("'{path}' does not exist")]
    NotExists { path: PathBuf },

    #[error("'{path}' is not a regular file")]
    NotRegular { path: PathBuf },

    #[error("'{path}' is not a directory")]
    NotDirectory { path: PathBuf },

    #[error("file '{path}' already exists")]
    AlreadyExists { path: PathBuf },

    #[error("file '{path}' is blocked by another process")]
    Blocked { path: PathBuf },

    #[error("can not copy '{from}' to '{to}': {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("i/o error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FsError::Io {
            path: path.into(),
            source,
        }
    }

    /// The path the error refers to. For copy failures this is the source file.
    pub fn path(&self) -> &std::path::Path {
        match self {
            FsError::NotExists { path }
            | FsError::NotRegular { path }
            | FsError::NotDirectory { path }
            | FsError::AlreadyExists { path }
            | FsError::Blocked { path }
            | FsError::Io { path, .. } => path,
            FsError::CopyFailed { from, .. } => from,
        }
    }
}
