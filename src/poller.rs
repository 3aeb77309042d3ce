//! Poll-based directory watching.
//!
//! A [`Poller`] re-lists a directory on a timer and hands every non-empty
//! listing to a single consumer. A batch is only handed over while the consumer
//! is waiting in [`BatchReceiver::recv`]. Publishing never blocks: while the
//! consumer is busy with the previous batch, the new one is dropped and counted
//! in [`PollerStats`]. Files in a dropped batch are still on disk and show up
//! again on the next tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::{DirLister, FileHandle, FsError};

/// Interval used until the first successful listing.
pub const FAST_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Files discovered in one poll, in directory enumeration order.
pub type Batch = Vec<FileHandle>;

/// Counters shared between a poller and whoever holds its outputs.
#[derive(Debug, Default)]
pub struct PollerStats {
    polls: AtomicU64,
    batches_delivered: AtomicU64,
    batches_dropped: AtomicU64,
    files_dropped: AtomicU64,
}

impl PollerStats {
    /// Completed listings, successful or not.
    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    pub fn batches_delivered(&self) -> u64 {
        self.batches_delivered.load(Ordering::Relaxed)
    }

    /// Batches discarded because the consumer was not waiting for one.
    pub fn batches_dropped(&self) -> u64 {
        self.batches_dropped.load(Ordering::Relaxed)
    }

    pub fn files_dropped(&self) -> u64 {
        self.files_dropped.load(Ordering::Relaxed)
    }
}

/// Event output of a [`Poller`].
///
/// Waiting in [`recv`](BatchReceiver::recv) is what tells the poller the
/// consumer is ready for the next batch.
#[derive(Debug)]
pub struct BatchReceiver {
    batches: mpsc::Receiver<Batch>,
    ready: mpsc::Sender<()>,
}

impl BatchReceiver {
    /// Asks for the next batch and waits for it. `None` once the poller stopped.
    pub async fn recv(&mut self) -> Option<Batch> {
        // Full means a request is already pending
        let _ = self.ready.try_send(());
        self.batches.recv().await
    }

    /// Takes a batch that was already handed over, without asking for one.
    pub fn try_recv(&mut self) -> Result<Batch, TryRecvError> {
        self.batches.try_recv()
    }
}

/// Receiving side of a [`Poller`].
///
/// `errors` yields at most one error. Both channels close once the poller stops.
#[derive(Debug)]
pub struct PollerOutputs {
    pub events: BatchReceiver,
    pub errors: mpsc::Receiver<FsError>,
    stats: Arc<PollerStats>,
}

impl PollerOutputs {
    pub fn stats(&self) -> Arc<PollerStats> {
        Arc::clone(&self.stats)
    }
}

#[derive(Debug)]
pub struct Poller {
    lister: DirLister,
    poll_interval: Duration,
    initial_interval: Duration,
    events: mpsc::Sender<Batch>,
    ready: mpsc::Receiver<()>,
    errors: mpsc::Sender<FsError>,
    stats: Arc<PollerStats>,
}

impl Poller {
    pub fn new(lister: DirLister, poll_interval: Duration) -> (Self, PollerOutputs) {
        let (events_tx, events_rx) = mpsc::channel(1);
        let (ready_tx, ready_rx) = mpsc::channel(1);
        let (errors_tx, errors_rx) = mpsc::channel(1);
        let stats = Arc::new(PollerStats::default());

        let poller = Self {
            lister,
            poll_interval,
            initial_interval: FAST_POLL_INTERVAL,
            events: events_tx,
            ready: ready_rx,
            errors: errors_tx,
            stats: Arc::clone(&stats),
        };
        let outputs = PollerOutputs {
            events: BatchReceiver {
                batches: events_rx,
                ready: ready_tx,
            },
            errors: errors_rx,
            stats,
        };
        (poller, outputs)
    }

    /// Overrides the interval used before the first successful listing.
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Runs the tick loop until `shutdown` turns true, its sender is dropped,
    /// or a listing fails.
    ///
    /// A listing failure is published on the error output before stopping.
    /// Consumes the poller; both outputs close when this returns.
    pub async fn watch(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            path = %self.lister.path().display(),
            interval = ?self.poll_interval,
            "watching directory"
        );

        let mut ticker = new_ticker(self.initial_interval);
        let mut interval_switched = false;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let listing = self.lister.read();
            self.stats.polls.fetch_add(1, Ordering::Relaxed);

            match listing {
                Ok(batch) => {
                    if !batch.is_empty() {
                        self.publish(batch);
                    }
                    if !interval_switched {
                        ticker = new_ticker(self.poll_interval);
                        interval_switched = true;
                    }
                }
                Err(err) => {
                    tracing::error!(path = %self.lister.path().display(), "listing failed: {err}");
                    // Capacity one and only ever one error: never waits
                    let _ = self.errors.send(err).await;
                    break;
                }
            }
        }

        tracing::info!(path = %self.lister.path().display(), "stopped watching directory");
    }

    fn publish(&mut self, batch: Batch) {
        let len = batch.len() as u64;
        match self.ready.try_recv() {
            Ok(()) => {}
            Err(TryRecvError::Empty) => {
                self.count_dropped(len);
                return;
            }
            Err(TryRecvError::Disconnected) => {
                tracing::debug!(files = len, "consumer gone, batch discarded");
                return;
            }
        }

        match self.events.try_send(batch) {
            Ok(()) => {
                self.stats.batches_delivered.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(files = len, "batch delivered");
            }
            Err(TrySendError::Full(_)) => self.count_dropped(len),
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(files = len, "consumer gone, batch discarded");
            }
        }
    }

    fn count_dropped(&self, files: u64) {
        self.stats.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.stats.files_dropped.fetch_add(files, Ordering::Relaxed);
        tracing::debug!(files, "consumer busy, batch dropped");
    }
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::{sleep, timeout};

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        timeout(Duration::from_secs(5), async {
            while !condition() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_interval_switches_once_even_without_entries() {
        let temp_dir = TempDir::new().unwrap();
        let (poller, outputs) = Poller::new(DirLister::new(temp_dir.path()), Duration::from_secs(30));
        let poller = poller.with_initial_interval(Duration::from_millis(20));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(poller.watch(shutdown_rx));

        let stats = outputs.stats();
        wait_until(|| stats.polls() >= 1).await;
        sleep(Duration::from_millis(200)).await;
        assert_eq!(stats.polls(), 1);
        assert_eq!(stats.batches_delivered(), 0);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_batches_are_counted() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a"), "").unwrap();
        fs::write(temp_dir.path().join("b"), "").unwrap();

        let (poller, outputs) = Poller::new(DirLister::new(temp_dir.path()), Duration::from_millis(10));
        let poller = poller.with_initial_interval(Duration::from_millis(10));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(poller.watch(shutdown_rx));

        let stats = outputs.stats();
        wait_until(|| stats.batches_dropped() >= 2).await;
        assert_eq!(stats.batches_delivered(), 0);
        assert!(stats.files_dropped() >= 4);
        drop(outputs);
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_poller() {
        let temp_dir = TempDir::new().unwrap();
        let (poller, mut outputs) = Poller::new(DirLister::new(temp_dir.path()), Duration::from_secs(30));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(poller.watch(shutdown_rx));

        drop(shutdown_tx);
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert!(outputs.events.recv().await.is_none());
        assert!(outputs.errors.recv().await.is_none());
    }
}
