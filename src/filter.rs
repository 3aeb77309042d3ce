use std::ffi::OsStr;
use std::fmt;
use std::fs::Metadata;
use std::path::Path;
use std::sync::Arc;

/// What a filter gets to see about a directory entry.
///
/// Metadata is read without following symlinks, so a symlink to a regular
/// file is not itself regular.
#[derive(Debug, Clone, Copy)]
pub struct EntryInfo<'a> {
    pub name: &'a OsStr,
    pub metadata: &'a Metadata,
}

impl<'a> EntryInfo<'a> {
    pub fn new(name: &'a OsStr, metadata: &'a Metadata) -> Self {
        Self { name, metadata }
    }

    pub fn is_regular(&self) -> bool {
        self.metadata.file_type().is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.metadata.file_type().is_dir()
    }

    pub fn extension(&self) -> Option<&'a str> {
        Path::new(self.name).extension().and_then(|s| s.to_str())
    }

    pub fn stem(&self) -> Option<&'a str> {
        Path::new(self.name).file_stem().and_then(|s| s.to_str())
    }
}

/// Predicate deciding whether an entry is part of a listing.
///
/// Stateless and cheap to clone; supplied once when a [`DirLister`](crate::DirLister)
/// is built.
#[derive(Clone)]
pub struct EntryFilter {
    predicate: Arc<dyn Fn(&EntryInfo<'_>) -> bool + Send + Sync>,
}

impl EntryFilter {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&EntryInfo<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Accepts every entry, directories included.
    pub fn accept_all() -> Self {
        Self::new(|_| true)
    }

    pub fn regular_files() -> Self {
        Self::new(|entry| entry.is_regular())
    }

    /// Regular files whose extension matches one of `extensions`, ignoring case.
    /// An empty list accepts every regular file.
    pub fn regular_files_with_extensions(extensions: Vec<String>) -> Self {
        if extensions.is_empty() {
            return Self::regular_files();
        }
        Self::new(move |entry| {
            entry.is_regular()
                && entry
                    .extension()
                    .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
                    .unwrap_or(false)
        })
    }

    pub fn matches(&self, entry: &EntryInfo<'_>) -> bool {
        (self.predicate)(entry)
    }
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self::accept_all()
    }
}

impl fmt::Debug for EntryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryFilter").finish_non_exhaustive()
    }
}
