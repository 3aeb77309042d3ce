//! Configuration for watchmove
//!
//! One explicit [`Config`] value is built at startup and handed to the poller
//! and the consumer. Values come from an optional TOML file, then environment
//! variables, then command line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{DirLister, EntryFilter};

/// Default seconds between polls of the watched directory
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory where new files are tracked
    pub watch_dir: PathBuf,
    /// Directory where moved or converted files are placed
    pub destination_dir: PathBuf,
    /// Seconds between polls
    pub poll_interval_secs: u64,
    /// Only pick up files with these extensions; empty means all regular files
    pub extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::new(),
            destination_dir: PathBuf::new(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            extensions: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Override with environment variables if present
    pub fn with_env(mut self) -> Self {
        if let Ok(val) = std::env::var("WATCHMOVE_WATCH_DIR") {
            self.watch_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("WATCHMOVE_DESTINATION_DIR") {
            self.destination_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("WATCHMOVE_POLL_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => self.poll_interval_secs = secs,
                Err(_) => tracing::warn!("ignoring invalid WATCHMOVE_POLL_INTERVAL_SECS={val}"),
            }
        }

        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Regular files only, restricted to the configured extensions
    pub fn entry_filter(&self) -> EntryFilter {
        EntryFilter::regular_files_with_extensions(self.extensions.clone())
    }

    pub fn lister(&self) -> DirLister {
        DirLister::with_filter(&self.watch_dir, self.entry_filter())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        check_dir("watch", &self.watch_dir)?;
        check_dir("destination", &self.destination_dir)?;

        let watch = self.watch_dir.canonicalize()?;
        let destination = self.destination_dir.canonicalize()?;
        if watch == destination {
            bail!("source and destination folders are the same");
        }

        if self.poll_interval_secs == 0 {
            bail!("poll interval must be greater than 0");
        }

        Ok(())
    }
}

fn check_dir(role: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("{role} directory is not set");
    }
    let metadata = fs::metadata(path)
        .with_context(|| format!("{role} directory {} does not exist", path.display()))?;
    if !metadata.is_dir() {
        bail!("{role} directory {} is not a directory", path.display());
    }
    Ok(())
}
