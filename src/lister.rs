use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{EntryFilter, EntryInfo, FileHandle, FsError};

/// Lists the immediate children of one directory that pass a filter.
///
/// Holds no state between calls: every [`read`](DirLister::read) goes back to
/// the filesystem. Order is whatever the directory enumeration yields.
#[derive(Debug, Clone)]
pub struct DirLister {
    path: PathBuf,
    filter: EntryFilter,
}

impl DirLister {
    /// Lister accepting every entry.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_filter(path, EntryFilter::accept_all())
    }

    pub fn with_filter<P: AsRef<Path>>(path: P, filter: EntryFilter) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            filter,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Vec<FileHandle>, FsError> {
        self.validate()?;

        let entries = fs::read_dir(&self.path).map_err(|e| FsError::io(&self.path, e))?;
        let mut files = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| FsError::io(&self.path, e))?;
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                // Removed between enumeration and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(FsError::io(entry.path(), e)),
            };

            let name = entry.file_name();
            if self.filter.matches(&EntryInfo::new(&name, &metadata)) {
                files.push(FileHandle::new(self.path.join(&name)));
            }
        }

        Ok(files)
    }

    fn validate(&self) -> Result<(), FsError> {
        match fs::metadata(&self.path) {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(FsError::NotDirectory {
                path: self.path.clone(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(FsError::NotExists {
                path: self.path.clone(),
            }),
            Err(e) => Err(FsError::io(&self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn names(files: &[FileHandle]) -> HashSet<String> {
        files.iter().map(|f| f.name()).collect()
    }

    #[test]
    fn test_lists_only_filtered_entries() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["a.mkv", "b.mp4", "c.txt"] {
            fs::write(temp_dir.path().join(name), name).unwrap();
        }
        fs::create_dir(temp_dir.path().join("nested")).unwrap();
        fs::write(temp_dir.path().join("nested").join("deep.mkv"), "x").unwrap();

        let lister = DirLister::with_filter(temp_dir.path(), EntryFilter::regular_files());
        let files = lister.read().unwrap();

        assert_eq!(files.len(), 3);
        let expected: HashSet<String> = ["a.mkv", "b.mp4", "c.txt"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names(&files), expected);
    }

    #[test]
    fn test_accept_all_includes_directories() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a"), "").unwrap();
        fs::create_dir(temp_dir.path().join("dir")).unwrap();

        let files = DirLister::new(temp_dir.path()).read().unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_paths_are_joined_with_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("movie.mkv"), "").unwrap();

        let files = DirLister::new(temp_dir.path()).read().unwrap();
        assert_eq!(files[0].absolute_path(), temp_dir.path().join("movie.mkv"));
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let files = DirLister::new(temp_dir.path()).read().unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_rescans_on_every_call() {
        let temp_dir = TempDir::new().unwrap();
        let lister = DirLister::new(temp_dir.path());
        assert!(lister.read().unwrap().is_empty());

        fs::write(temp_dir.path().join("late.bin"), "").unwrap();
        assert_eq!(lister.read().unwrap().len(), 1);

        fs::remove_file(temp_dir.path().join("late.bin")).unwrap();
        assert!(lister.read().unwrap().is_empty());
    }

    #[test]
    fn test_missing_path_is_not_exists() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");

        let err = DirLister::new(&missing).read().unwrap_err();
        assert!(matches!(err, FsError::NotExists { .. }));
    }

    #[test]
    fn test_regular_file_path_is_not_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file");
        fs::write(&file, "").unwrap();

        let err = DirLister::new(&file).read().unwrap_err();
        assert!(matches!(err, FsError::NotDirectory { .. }));
    }
}
