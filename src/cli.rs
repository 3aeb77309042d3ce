use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::consumer::Action;
use crate::convert::Converter;

#[derive(Parser, Debug)]
#[command(name = "watchmove")]
#[command(version)]
#[command(about = "Polls a directory for new files and moves or converts them")]
#[command(long_about = "watchmove polls a source directory, picks up every regular file that appears in it and either moves it into a destination directory or converts it there with ffmpeg.")]
pub struct Cli {
    /// TOML configuration file; flags take precedence over it
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Log line format
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Move new files into the destination directory
    Move(WatchArgs),
    /// Convert new files into the destination directory with ffmpeg
    Convert(ConvertArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct WatchArgs {
    /// Directory where new files are tracked
    #[arg(short, long, value_name = "DIR")]
    pub src_dir: Option<PathBuf>,

    /// Directory where files end up
    #[arg(short, long, value_name = "DIR")]
    pub dst_dir: Option<PathBuf>,

    /// Seconds between polls of the source directory
    #[arg(short = 't', long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Only pick up these extensions (e.g., mkv,mp4)
    #[arg(long, value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub watch: WatchArgs,

    /// Input file options for ffmpeg
    #[arg(short, long = "ifile-opts", default_value = "", allow_hyphen_values = true)]
    pub ifile_opts: String,

    /// Output file options for ffmpeg
    #[arg(short, long = "ofile-opts", default_value = "", allow_hyphen_values = true)]
    pub ofile_opts: String,

    /// Output file extension
    #[arg(short = 'e', long = "ofile-ext")]
    pub ofile_ext: Option<String>,

    /// Path to the ffmpeg executable
    #[arg(long, value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// RFC 3339 timestamps with millisecond precision
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

impl Cli {
    fn watch_args(&self) -> &WatchArgs {
        match &self.command {
            Command::Move(args) => args,
            Command::Convert(args) => &args.watch,
        }
    }

    /// Builds the configuration: file, then environment, then flags.
    pub fn to_config(&self) -> Result<Config> {
        let base = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        let mut config = base.with_env();

        let args = self.watch_args();
        if let Some(src) = &args.src_dir {
            config.watch_dir = src.clone();
        }
        if let Some(dst) = &args.dst_dir {
            config.destination_dir = dst.clone();
        }
        if let Some(secs) = args.interval {
            config.poll_interval_secs = secs;
        }
        if let Some(extensions) = &args.extensions {
            config.extensions = extensions.clone();
        }

        Ok(config)
    }

    /// The action for the chosen subcommand. Locates ffmpeg for `convert`.
    pub fn action(&self, config: &Config) -> Result<Action> {
        match &self.command {
            Command::Move(_) => Ok(Action::Move {
                destination: config.destination_dir.clone(),
            }),
            Command::Convert(args) => {
                let program = Converter::locate(args.ffmpeg.as_deref())?;
                tracing::debug!(program = %program.display(), "using converter");
                let converter = Converter::new(program, &config.destination_dir)
                    .with_input_options(&args.ifile_opts)
                    .with_output_options(&args.ofile_opts)
                    .with_output_extension(args.ofile_ext.clone());
                Ok(Action::Convert(converter))
            }
        }
    }

    pub fn setup_logging(&self) -> Result<()> {
        let level = if self.verbose { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(LocalTime)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false);

        match (&self.log_file, self.log_format) {
            (Some(path), format) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open log file {}", path.display()))?;
                let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
                match format {
                    LogFormat::Json => builder.json().init(),
                    LogFormat::Text => builder.init(),
                }
            }
            (None, LogFormat::Json) => builder.json().init(),
            (None, LogFormat::Text) => builder.init(),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_flags() {
        let cli = Cli::parse_from(["watchmove", "move", "-s", "/in", "-d", "/out", "-t", "5"]);
        let config = cli.to_config().unwrap();

        assert_eq!(config.watch_dir, PathBuf::from("/in"));
        assert_eq!(config.destination_dir, PathBuf::from("/out"));
        assert_eq!(config.poll_interval_secs, 5);
        assert!(matches!(cli.command, Command::Move(_)));
    }

    #[test]
    fn test_convert_flags() {
        let cli = Cli::parse_from([
            "watchmove",
            "-v",
            "convert",
            "--src-dir",
            "/in",
            "--dst-dir",
            "/out",
            "-i",
            "-hwaccel auto",
            "-o",
            "-c:v libx265",
            "-e",
            ".mp4",
            "--extensions",
            "mkv,avi",
        ]);

        assert!(cli.verbose);
        let config = cli.to_config().unwrap();
        assert_eq!(config.extensions, vec!["mkv".to_string(), "avi".to_string()]);
        match &cli.command {
            Command::Convert(args) => {
                assert_eq!(args.ifile_opts, "-hwaccel auto");
                assert_eq!(args.ofile_opts, "-c:v libx265");
                assert_eq!(args.ofile_ext.as_deref(), Some(".mp4"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_move_action_targets_destination() {
        let cli = Cli::parse_from(["watchmove", "move", "-s", "/in", "-d", "/out"]);
        let config = cli.to_config().unwrap();
        match cli.action(&config).unwrap() {
            Action::Move { destination } => assert_eq!(destination, PathBuf::from("/out")),
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
