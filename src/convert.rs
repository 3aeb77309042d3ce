//! Wrapper around the external `ffmpeg` converter.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::{DirLister, EntryFilter, FileHandle, FsError};

const FFMPEG: &str = "ffmpeg";

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("ffmpeg converter was not found")]
    NotFound,

    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("conversion of '{input}' failed ({status}): {stderr}")]
    Failed {
        input: PathBuf,
        status: ExitStatus,
        stderr: String,
    },

    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Converts files into a destination directory by running ffmpeg.
#[derive(Debug, Clone)]
pub struct Converter {
    program: PathBuf,
    destination: PathBuf,
    input_options: Vec<String>,
    output_options: Vec<String>,
    output_extension: Option<String>,
}

impl Converter {
    pub fn new<P: Into<PathBuf>, D: Into<PathBuf>>(program: P, destination: D) -> Self {
        Self {
            program: program.into(),
            destination: destination.into(),
            input_options: Vec::new(),
            output_options: Vec::new(),
            output_extension: None,
        }
    }

    /// Options placed before `-i`, separated by spaces.
    pub fn with_input_options(mut self, options: &str) -> Self {
        self.input_options = split_options(options);
        self
    }

    /// Options placed between the input and the output file, separated by spaces.
    pub fn with_output_options(mut self, options: &str) -> Self {
        self.output_options = split_options(options);
        self
    }

    /// Extension of the converted file. `None` keeps the source extension.
    pub fn with_output_extension(mut self, extension: Option<String>) -> Self {
        self.output_extension = extension
            .map(|ext| ext.trim_start_matches('.').to_string())
            .filter(|ext| !ext.is_empty());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Finds the ffmpeg executable.
    ///
    /// An explicit path wins. Otherwise the `PATH` is searched, then the
    /// directory of the running executable, where exactly one regular file
    /// named `ffmpeg` (any extension) must exist.
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf, ConvertError> {
        if let Some(path) = explicit {
            return if path.is_file() {
                Ok(path.to_path_buf())
            } else {
                Err(ConvertError::NotFound)
            };
        }

        if let Some(path) = search_path() {
            return Ok(path);
        }

        let exe = std::env::current_exe().map_err(|_| ConvertError::NotFound)?;
        let exe_dir = exe.parent().ok_or(ConvertError::NotFound)?;
        let lister = DirLister::with_filter(
            exe_dir,
            EntryFilter::new(|entry| entry.is_regular() && entry.stem() == Some(FFMPEG)),
        );
        match lister.read() {
            Ok(files) if files.len() == 1 => Ok(files[0].absolute_path().to_path_buf()),
            _ => Err(ConvertError::NotFound),
        }
    }

    /// Where the converted version of `file` is written.
    pub fn output_path(&self, file: &FileHandle) -> PathBuf {
        let source = file.absolute_path();
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = self
            .output_extension
            .clone()
            .or_else(|| source.extension().map(|e| e.to_string_lossy().into_owned()));

        match extension {
            Some(ext) => self.destination.join(format!("{stem}.{ext}")),
            None => self.destination.join(stem),
        }
    }

    pub fn args(&self, file: &FileHandle, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.input_options.iter().map(OsString::from).collect();
        args.push("-i".into());
        args.push(file.absolute_path().into());
        args.extend(self.output_options.iter().map(OsString::from));
        args.push(output.into());
        args
    }

    /// Runs the conversion and returns the path of the produced file.
    ///
    /// The source is left in place; deleting it is up to the caller. On
    /// failure the partial output is removed, unless ffmpeg refused because the
    /// output already existed.
    pub fn convert(&self, file: &FileHandle) -> Result<PathBuf, ConvertError> {
        // Validates existence and regularity before spawning
        file.mod_time()?;

        let output = self.output_path(file);
        let result = Command::new(&self.program)
            .args(self.args(file, &output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| ConvertError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if result.status.success() {
            return Ok(output);
        }

        let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
        if !reports_existing_output(&stderr) && output.exists() {
            if let Err(e) = fs::remove_file(&output) {
                tracing::warn!(path = %output.display(), "failed to remove partial output: {e}");
            }
        }

        Err(ConvertError::Failed {
            input: file.absolute_path().to_path_buf(),
            status: result.status,
            stderr,
        })
    }
}

fn split_options(options: &str) -> Vec<String> {
    options.split_whitespace().map(str::to_string).collect()
}

static EXISTING_OUTPUT_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"File '.*?' already exists").ok());

fn reports_existing_output(stderr: &str) -> bool {
    EXISTING_OUTPUT_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(stderr))
}

fn search_path() -> Option<PathBuf> {
    let finder = if cfg!(windows) { "where" } else { "which" };
    let output = Command::new(finder).arg(FFMPEG).stderr(Stdio::null()).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
}
