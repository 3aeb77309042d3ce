use std::fmt;
use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::FsError;

/// Size of the buffer used to stream bytes during a copy. Allocated per call.
pub const COPY_BUFFER_SIZE: usize = 100 << 20;

/// A path to a file on disk.
///
/// Not tied to an open descriptor. The file may have been deleted or locked by
/// the time an operation runs, so every operation re-validates that the path
/// exists and is a regular file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    path: PathBuf,
}

impl FileHandle {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Base name of the file.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn absolute_path(&self) -> &Path {
        &self.path
    }

    pub fn mod_time(&self) -> Result<SystemTime, FsError> {
        let metadata = self.validate()?;
        metadata.modified().map_err(|e| FsError::io(&self.path, e))
    }

    pub fn access_time(&self) -> Result<SystemTime, FsError> {
        let metadata = self.validate()?;
        metadata.accessed().map_err(|e| FsError::io(&self.path, e))
    }

    pub fn delete(&self) -> Result<(), FsError> {
        self.validate()?;
        fs::remove_file(&self.path).map_err(|e| FsError::io(&self.path, e))
    }

    /// Copies the file into `dir` under the same name and returns a handle to the copy.
    ///
    /// Never overwrites: fails with [`FsError::AlreadyExists`] if the target is
    /// taken. A failed stream removes the partially written target. The copy
    /// gets the source's access and modification times.
    pub fn copy_to<P: AsRef<Path>>(&self, dir: P) -> Result<FileHandle, FsError> {
        self.copy_to_with_buffer(dir.as_ref(), COPY_BUFFER_SIZE)
    }

    pub(crate) fn copy_to_with_buffer(
        &self,
        dir: &Path,
        buffer_size: usize,
    ) -> Result<FileHandle, FsError> {
        let metadata = self.validate()?;
        let name = self.path.file_name().ok_or_else(|| FsError::NotRegular {
            path: self.path.clone(),
        })?;
        let target = FileHandle::new(dir.join(name));

        if fs::symlink_metadata(&target.path).is_ok() {
            return Err(FsError::AlreadyExists { path: target.path });
        }
        if self.is_locked() {
            return Err(FsError::Blocked {
                path: self.path.clone(),
            });
        }

        let mut source = File::open(&self.path).map_err(|_| FsError::Blocked {
            path: self.path.clone(),
        })?;

        // create_new closes the gap between the existence check and the create
        let destination = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target.path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => FsError::AlreadyExists {
                    path: target.path.clone(),
                },
                _ => FsError::io(&target.path, e),
            })?;

        let _times = TimestampSync::capture(&metadata, &target.path);

        tracing::debug!(from = %self.path.display(), to = %target.path.display(), "copying file");
        fill_or_discard(&mut source, destination, &self.path, &target.path, buffer_size)?;

        Ok(target)
    }

    /// Copies the file into `dir`, then deletes the original and points this
    /// handle at the copy.
    ///
    /// If the copy fails the original is untouched. If deleting the original
    /// fails, the handle already points at the destination while the stale
    /// source is still on disk; the delete error is returned.
    pub fn move_to<P: AsRef<Path>>(&mut self, dir: P) -> Result<(), FsError> {
        let target = self.copy_to(dir)?;
        let original = std::mem::replace(self, target);
        original.delete()
    }

    /// Best-effort check for another process holding the file.
    ///
    /// The file counts as locked if it cannot be opened for reading or cannot
    /// be renamed onto its own path. Not authoritative: advisory locks that do
    /// not block a rename go unnoticed.
    pub fn is_locked(&self) -> bool {
        if File::open(&self.path).is_err() {
            return true;
        }
        fs::rename(&self.path, &self.path).is_err()
    }

    fn validate(&self) -> Result<fs::Metadata, FsError> {
        let metadata = match fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FsError::NotExists {
                    path: self.path.clone(),
                })
            }
            Err(e) => return Err(FsError::io(&self.path, e)),
        };

        if !metadata.is_file() {
            return Err(FsError::NotRegular {
                path: self.path.clone(),
            });
        }
        Ok(metadata)
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Copies the source times onto the target when dropped.
///
/// Armed once the target file exists, so it also fires on the error paths.
struct TimestampSync {
    times: Option<FileTimes>,
    target: PathBuf,
}

impl TimestampSync {
    fn capture(source: &fs::Metadata, target: &Path) -> Self {
        let times = match (source.accessed(), source.modified()) {
            (Ok(atime), Ok(mtime)) => Some(FileTimes::new().set_accessed(atime).set_modified(mtime)),
            _ => None,
        };
        Self {
            times,
            target: target.to_path_buf(),
        }
    }
}

impl Drop for TimestampSync {
    fn drop(&mut self) {
        let Some(times) = self.times else {
            return;
        };
        let result = OpenOptions::new()
            .write(true)
            .open(&self.target)
            .and_then(|file| file.set_times(times));
        if let Err(e) = result {
            tracing::debug!(path = %self.target.display(), "timestamps not copied: {e}");
        }
    }
}

/// Streams `reader` into `destination`. On failure the destination file at
/// `to` is removed so no truncated copy is left behind.
fn fill_or_discard(
    reader: &mut dyn Read,
    mut destination: File,
    from: &Path,
    to: &Path,
    buffer_size: usize,
) -> Result<u64, FsError> {
    match copy_stream(reader, &mut destination, buffer_size) {
        Ok(written) => Ok(written),
        Err(source) => {
            drop(destination);
            if let Err(e) = fs::remove_file(to) {
                tracing::warn!(path = %to.display(), "failed to remove partial copy: {e}");
            }
            Err(FsError::CopyFailed {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            })
        }
    }
}

fn copy_stream(reader: &mut dyn Read, writer: &mut File, buffer_size: usize) -> io::Result<u64> {
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut written = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        written += n as u64;
    }
    writer.sync_all()?;
    Ok(written)
}
