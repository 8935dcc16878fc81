//! Background commit policy of the catalog.
//!
//! Every maintenance interval the catalog sums the buffered bytes of all its
//! indexes. When the sum reaches the aggregate ceiling every index is
//! committed to release memory. Otherwise only the indexes whose last commit
//! is older than `maxIndexInMemoryMillis` are committed, which bounds how
//! long an acknowledged write can stay invisible.
//!
//! Failures are logged and retried on the next tick; they never stop the
//! loop or affect other indexes.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};
use serde::Serialize;

use crate::config::Parameters;
use crate::error::{LucernaError, Result};
use crate::storage::index_access::IndexAccess;

/// Name of the maintenance thread.
pub const THREAD_NAME: &str = "index-catalog";

/// Outcome of one maintenance tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    /// Indexes committed by this tick.
    pub committed: Vec<String>,
    /// Indexes whose commit failed, with the error message.
    pub failed: Vec<(String, String)>,
    /// Buffered bytes across all indexes when the tick started.
    pub total_ram_bytes: u64,
    /// Whether the aggregate ceiling forced a commit of every index.
    pub forced: bool,
}

/// Apply the commit policy to `indexes` at wall-clock time `now`.
pub fn tick(indexes: &[Arc<IndexAccess>], params: &Parameters, now: u64) -> MaintenanceReport {
    let total_ram_bytes: u64 = indexes.iter().map(|index| index.ram_bytes_used()).sum();
    let forced = total_ram_bytes >= params.max_buffered_bytes_all_indexes();
    if forced {
        tracing::info!(
            total_ram_bytes,
            limit = params.max_buffered_bytes_all_indexes(),
            "buffered memory over limit, committing all indexes"
        );
    }

    let max_in_memory = params.max_index_in_memory_millis();
    let mut report = MaintenanceReport {
        total_ram_bytes,
        forced,
        ..Default::default()
    };
    for index in indexes {
        let due = forced || index.last_commit_millis().saturating_add(max_in_memory) < now;
        if !due {
            continue;
        }
        match index.commit_and_refresh_reader() {
            Ok(()) => {
                tracing::debug!(index = %index.name(), "periodic commit");
                report.committed.push(index.name().to_string());
            }
            // Dropped concurrently; nothing left to commit.
            Err(LucernaError::IndexDropped(_)) => {}
            Err(e) => {
                tracing::error!(index = %index.name(), error = %e, "failed to commit index");
                report.failed.push((index.name().to_string(), e.to_string()));
            }
        }
    }
    report
}

/// Handle of the running maintenance thread.
#[derive(Debug)]
pub struct MaintenanceThread {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl MaintenanceThread {
    /// Run `task` every `interval` until stopped.
    pub fn spawn<F>(interval: Duration, mut task: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown, receiver) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                tracing::debug!(interval_ms = interval.as_millis() as u64, "maintenance started");
                loop {
                    match receiver.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => task(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("maintenance stopped");
            })?;
        Ok(MaintenanceThread { shutdown, handle })
    }

    /// Signal the thread and wait for it to finish its current tick.
    pub fn stop(self) {
        let _ = self.shutdown.try_send(());
        if self.handle.join().is_err() {
            tracing::error!("maintenance thread panicked");
        }
    }
}
