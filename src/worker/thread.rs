//! Background thread running a `Worker`.

use std::sync::mpsc::{channel, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::error;

use super::{Outcome, Worker};

/// Statistics from the worker thread.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorkerStats {
    pub messages_handled: usize,
    pub messages_retried: usize,
    pub messages_failed: usize,
    pub messages_dropped: usize,
    pub polls: usize,
}

/// A worker running on a background thread.
///
/// The stop signal is checked between polls, so a message being handled is
/// always finished first.
///
/// ## Example
///
/// ```ignore
/// let handle = messenger.worker(&["async"], None)?.spawn(Duration::from_millis(10));
///
/// // ... dispatch messages routed to "async" ...
///
/// let stats = handle.stop();
/// println!("Handled {} messages", stats.messages_handled);
/// ```
pub struct WorkerHandle {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<WorkerStats>>,
}

impl WorkerHandle {
    pub(crate) fn spawn(worker: Worker, poll_interval: Duration) -> Self {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || {
            let mut stats = WorkerStats::default();

            loop {
                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }

                stats.polls += 1;

                match worker.run_once() {
                    Ok(processed) => {
                        for message in &processed {
                            match message.outcome {
                                Outcome::Handled => stats.messages_handled += 1,
                                Outcome::Retried { .. } => stats.messages_retried += 1,
                                Outcome::RoutedToFailure => stats.messages_failed += 1,
                                Outcome::Dropped => stats.messages_dropped += 1,
                            }
                        }
                        if processed.is_empty() {
                            thread::sleep(poll_interval);
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "worker poll failed");
                        thread::sleep(poll_interval);
                    }
                }
            }

            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the worker to stop and wait for it to finish.
    /// Returns the worker statistics.
    pub fn stop(mut self) -> WorkerStats {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap_or_default()
        } else {
            WorkerStats::default()
        }
    }

    /// Signal the worker to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}
