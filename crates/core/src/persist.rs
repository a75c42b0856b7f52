//! Background persistence channel.
//!
//! Cache mutations hand their new slot value to [`PersistChannel`], which
//! forwards it to a worker task over an unbounded mpsc channel. The worker
//! owns nothing but the receiving end and the store writer; it applies jobs
//! in send order.
//!
//! When no worker is running (before `start`, after `terminate`, or after the
//! worker died) each write is applied by its own task instead: a spawned task
//! inside a runtime, or a short-lived thread with its own runtime outside one.
//! Every job carries a ticket taken when it was scheduled, and the writer
//! skips a job once a newer ticket for the same slot has been applied, so the
//! last write for a slot wins on both paths.
//!
//! Fallback mirror writes rewrite a file and run on the blocking pool.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::cache::Slot;
use crate::store::StoreAdapter;

enum PersistJob {
    Put { slot: Slot, ticket: u64, value: Value },
    Flush(oneshot::Sender<()>),
}

struct Worker {
    tx: mpsc::UnboundedSender<PersistJob>,
    handle: JoinHandle<()>,
}

/// Applies slot writes to the store adapter, newest ticket per slot wins.
struct SlotWriter {
    store: Arc<StoreAdapter>,
    next_ticket: AtomicU64,
    applied: tokio::sync::Mutex<HashMap<Slot, u64>>,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl SlotWriter {
    fn ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst)
    }

    async fn apply(&self, slot: Slot, ticket: u64, value: Value) {
        let mut applied = self.applied.lock().await;
        if applied.get(&slot).is_some_and(|&newest| newest > ticket) {
            tracing::debug!(slot = slot.key(), ticket, "skipping superseded write");
            return;
        }

        if let Err(e) = self.store.put(slot.table(), slot.key(), &value).await {
            log_persist_failure(slot, &e);
        }
        if slot.mirrors_to_fallback() {
            let store = Arc::clone(&self.store);
            match tokio::task::spawn_blocking(move || store.mirror_slot(slot, &value)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log_persist_failure(slot, &e),
                Err(e) => tracing::error!(slot = slot.key(), error = %e, "fallback mirror task failed"),
            }
        }
        applied.insert(slot, ticket);
    }

    fn finish_direct(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Wait until no direct write is outstanding.
    async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.idle.notified());
            notified.as_mut().enable();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Counts one direct write as outstanding until dropped, whether or not its
/// task ever ran.
struct DirectWrite(Arc<SlotWriter>);

impl DirectWrite {
    fn begin(writer: &Arc<SlotWriter>) -> Self {
        writer.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(writer))
    }
}

impl Drop for DirectWrite {
    fn drop(&mut self) {
        self.0.finish_direct();
    }
}

/// Fire-and-forget writer from the cache to the store adapter.
pub struct PersistChannel {
    writer: Arc<SlotWriter>,
    worker: Mutex<Option<Worker>>,
}

impl PersistChannel {
    /// Create a channel with no worker running; writes go direct until [`start`](Self::start).
    pub fn new(store: Arc<StoreAdapter>) -> Self {
        let writer = SlotWriter {
            store,
            next_ticket: AtomicU64::new(0),
            applied: tokio::sync::Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        };
        Self { writer: Arc::new(writer), worker: Mutex::new(None) }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the worker task. Must be called from within a tokio runtime.
    /// Replaces any running worker.
    pub fn start(&self) {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistJob>();
        let writer = Arc::clone(&self.writer);
        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    PersistJob::Put { slot, ticket, value } => writer.apply(slot, ticket, value).await,
                    PersistJob::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            tracing::debug!("persistence worker stopped");
        });

        if let Some(previous) = self.lock().replace(Worker { tx, handle }) {
            previous.handle.abort();
        }
        tracing::debug!("persistence worker started");
    }

    /// Whether a live worker is accepting jobs.
    pub fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(|w| !w.tx.is_closed())
    }

    /// Stop the worker immediately. Jobs still queued are discarded.
    pub fn terminate(&self) {
        if let Some(worker) = self.lock().take() {
            worker.handle.abort();
            tracing::debug!("persistence worker terminated");
        }
    }

    /// Queue `value` to be written for `slot`. Never waits on storage I/O.
    pub fn schedule_persist(&self, slot: Slot, value: Value) {
        let ticket = self.writer.ticket();
        let value = {
            let guard = self.lock();
            match guard.as_ref() {
                Some(worker) => match worker.tx.send(PersistJob::Put { slot, ticket, value }) {
                    Ok(()) => return,
                    Err(mpsc::error::SendError(job)) => match job {
                        PersistJob::Put { value, .. } => value,
                        PersistJob::Flush(_) => return,
                    },
                },
                None => value,
            }
        };
        tracing::debug!(slot = slot.key(), "no persistence worker, writing directly");
        self.persist_direct(slot, ticket, value);
    }

    fn persist_direct(&self, slot: Slot, ticket: u64, value: Value) {
        let pending = DirectWrite::begin(&self.writer);
        let job = async move {
            pending.0.apply(slot, ticket, value).await;
            drop(pending);
        };

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(job);
            return;
        }

        let spawned = std::thread::Builder::new().name("posa-persist".into()).spawn(move || {
            match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime.block_on(job),
                Err(e) => tracing::error!(slot = slot.key(), error = %e, "failed to build runtime for durable write"),
            }
        });
        if let Err(e) = spawned {
            tracing::error!(slot = slot.key(), error = %e, "failed to spawn persistence thread");
        }
    }

    /// Wait until every job scheduled before this call has been applied.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        let sent = {
            let guard = self.lock();
            guard.as_ref().is_some_and(|w| w.tx.send(PersistJob::Flush(ack_tx)).is_ok())
        };
        if sent {
            let _ = ack_rx.await;
        }
        self.writer.wait_idle().await;
    }
}

impl Drop for PersistChannel {
    fn drop(&mut self) {
        // Dropping the sender lets the worker finish the jobs already queued.
        self.lock().take();
    }
}

fn log_persist_failure(slot: Slot, err: &crate::Error) {
    if err.is_quota_exceeded() {
        tracing::error!(
            slot = slot.key(),
            error = %err,
            "storage quota exceeded, value kept in memory only for this session"
        );
    } else {
        tracing::error!(slot = slot.key(), error = %err, "failed to persist slot");
    }
}
