use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::convert::{ConvertError, Converter};
use crate::poller::{Batch, PollerOutputs};
use crate::{FileHandle, FsError};

/// What the consumer does with every discovered file.
#[derive(Debug, Clone)]
pub enum Action {
    /// Move the file into `destination`.
    Move { destination: PathBuf },
    /// Convert the file and delete the source once the conversion succeeded.
    Convert(Converter),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Move { .. } => "move",
            Action::Convert(_) => "convert",
        }
    }

    /// Applies the action. On success `file` points at where the file ended up.
    pub fn apply(&self, file: &mut FileHandle) -> Result<()> {
        match self {
            Action::Move { destination } => {
                file.move_to(destination)?;
            }
            Action::Convert(converter) => {
                let output = converter.convert(file)?;
                file.delete()?;
                *file = FileHandle::new(output);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerReport {
    pub processed: u64,
    pub failed: u64,
    /// Files that were gone by the time their turn came
    pub skipped: u64,
}

enum Flow {
    Continue,
    Stop,
}

/// Drains the poller outputs and applies `action` to every file, one at a time.
///
/// Ends when `shutdown` turns true or the outputs close. A poller error ends
/// the consumer with that error. Failures on individual files are logged and
/// counted; processing continues with the next file.
pub async fn run_consumer(
    mut outputs: PollerOutputs,
    action: Arc<Action>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<ConsumerReport> {
    let mut report = ConsumerReport::default();

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            error = outputs.errors.recv() => {
                match error {
                    Some(err) => return Err(err).context("directory poller stopped"),
                    None => break,
                }
            }
            batch = outputs.events.recv() => {
                let Some(batch) = batch else {
                    break;
                };
                if let Flow::Stop = handle_batch(batch, &action, &shutdown, &mut report).await? {
                    break;
                }
            }
        }
    }

    tracing::debug!(?report, "consumer finished");
    Ok(report)
}

async fn handle_batch(
    batch: Batch,
    action: &Arc<Action>,
    shutdown: &watch::Receiver<bool>,
    report: &mut ConsumerReport,
) -> Result<Flow> {
    for file in batch {
        // A dropped sender counts as a shutdown request too
        if *shutdown.borrow() || shutdown.has_changed().is_err() {
            return Ok(Flow::Stop);
        }

        let source = file.to_string();
        tracing::info!("trying to {} file '{}'", action.name(), source);

        let worker_action = Arc::clone(action);
        let (file, result) = tokio::task::spawn_blocking(move || {
            let mut file = file;
            let result = worker_action.apply(&mut file);
            (file, result)
        })
        .await
        .context("file worker panicked")?;

        match result {
            Ok(()) => {
                report.processed += 1;
                tracing::info!("file '{}' is done: '{}'", source, file);
            }
            Err(err) if is_vanished(&err) => {
                report.skipped += 1;
                tracing::debug!("file '{}' is already gone: {err:#}", source);
            }
            Err(err) => {
                report.failed += 1;
                tracing::error!("file '{}': {err:#}", source);
            }
        }
    }
    Ok(Flow::Continue)
}

/// The file was handled or removed after it was listed.
fn is_vanished(err: &anyhow::Error) -> bool {
    let fs_err = err.downcast_ref::<FsError>().or_else(|| match err.downcast_ref::<ConvertError>() {
        Some(ConvertError::Fs(inner)) => Some(inner),
        _ => None,
    });
    matches!(fs_err, Some(FsError::NotExists { .. }))
}
