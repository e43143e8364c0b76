// src/journal/writer.rs - Background journal writes for the drive loop
use super::{JournalError, JournalStore};
use crate::status::Status;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

/// Identifier of a submitted write, increasing in submission order.
pub type WriteId = u64;

type Completion = Result<(), JournalError>;

struct WriteJob {
    id: WriteId,
    status: Status,
    done: Sender<Completion>,
}

struct PendingWrite {
    label: String,
    done: Receiver<Completion>,
}

/// Outcome of [`JournalWriter::drain_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub failed: usize,
}

/// Single-worker journal writer.
///
/// Jobs go through one FIFO queue to one thread, so writes land in the
/// journal strictly in submission order and an older `remaining` can never
/// overwrite a newer one.
pub struct JournalWriter {
    queue: Option<Sender<WriteJob>>,
    worker: Option<JoinHandle<()>>,
    pending: Mutex<BTreeMap<WriteId, PendingWrite>>,
    next_id: AtomicU64,
}

impl JournalWriter {
    pub fn spawn(store: JournalStore) -> Result<Self, JournalError> {
        let (queue, jobs) = crossbeam_channel::unbounded::<WriteJob>();
        let worker = std::thread::Builder::new()
            .name("journal-writer".to_string())
            .spawn(move || {
                for job in jobs {
                    let result = store.write(&job.status);
                    if let Err(e) = &result {
                        tracing::error!("Background journal write #{} failed: {}", job.id, e);
                    }
                    // Receiver may already be gone if the handle was dropped.
                    let _ = job.done.send(result);
                }
                tracing::debug!("Journal writer queue closed");
            })
            .map_err(JournalError::Spawn)?;

        Ok(Self {
            queue: Some(queue),
            worker: Some(worker),
            pending: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Queue a write of `status` and remember its handle.
    pub fn submit(&self, status: Status) -> Result<WriteId, JournalError> {
        let queue = self.queue.as_ref().ok_or(JournalError::WriterClosed)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let label = format!("{}-{}", status, chrono::Utc::now().to_rfc3339());
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        queue
            .send(WriteJob {
                id,
                status,
                done: done_tx,
            })
            .map_err(|_| JournalError::WriterClosed)?;
        tracing::debug!("Journal write #{} submitted: {}", id, label);

        self.lock_pending().insert(
            id,
            PendingWrite {
                label,
                done: done_rx,
            },
        );
        Ok(id)
    }

    /// Drop handles whose write has finished, without blocking.
    /// Returns how many were removed.
    pub fn reap_completed(&self) -> usize {
        let mut pending = self.lock_pending();
        let before = pending.len();
        pending.retain(|id, write| match write.done.try_recv() {
            Ok(result) => {
                log_completion(*id, &write.label, &result);
                false
            }
            Err(TryRecvError::Empty) => true,
            Err(TryRecvError::Disconnected) => {
                tracing::error!("Journal write #{} ({}) lost: writer stopped", id, write.label);
                false
            }
        });
        before - pending.len()
    }

    /// Block until every outstanding write has finished, then clear the set.
    pub fn drain_all(&self) -> DrainReport {
        let pending = std::mem::take(&mut *self.lock_pending());
        let mut report = DrainReport::default();
        for (id, write) in pending {
            match write.done.recv() {
                Ok(result) => {
                    log_completion(id, &write.label, &result);
                    if result.is_ok() {
                        report.completed += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(_) => {
                    tracing::error!("Journal write #{} ({}) lost: writer stopped", id, write.label);
                    report.failed += 1;
                }
            }
        }
        if report.failed > 0 {
            tracing::warn!(
                "Drained journal writes with {} failure(s) out of {}",
                report.failed,
                report.completed + report.failed
            );
        }
        report
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Labels of outstanding writes in submission order.
    pub fn pending_labels(&self) -> Vec<String> {
        self.lock_pending()
            .values()
            .map(|w| w.label.clone())
            .collect()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, BTreeMap<WriteId, PendingWrite>> {
        // The map stays consistent even if a holder panicked.
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for JournalWriter {
    fn drop(&mut self) {
        // Closing the queue lets the worker finish what is queued and exit.
        self.queue.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Journal writer thread panicked");
            }
        }
    }
}

fn log_completion(id: WriteId, label: &str, result: &Completion) {
    match result {
        Ok(()) => tracing::debug!("Cleaned up journal write #{} ({})", id, label),
        Err(e) => tracing::error!("Journal write #{} ({}) failed: {}", id, label, e),
    }
}
