//! Worker Pool - bounded execution slots for blocking task callables.
//!
//! Work is queued on an unbounded channel and dispatched in submission order.
//! A tokio `Semaphore` sized to the pool bounds how many callables execute at
//! once; each one runs on the blocking thread pool via `spawn_blocking` so it
//! never stalls the async scheduler.
//!
//! The pool cannot preempt a running callable. A caller that stops waiting
//! (for example after a timeout) only abandons the result: the callable keeps
//! its slot until it returns on its own.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::state_machine::{TaskFailure, TaskOutcome};

type Work = Box<dyn FnOnce() -> anyhow::Result<Value> + Send + 'static>;

struct Queued {
    work: Work,
    reply: oneshot::Sender<TaskOutcome>,
}

/// Point-in-time view of pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: usize,
    pub busy: usize,
    pub queued: usize,
    pub completed: u64,
    pub skipped: u64,
}

#[derive(Default)]
struct Counters {
    busy: AtomicUsize,
    queued: AtomicUsize,
    completed: AtomicU64,
    skipped: AtomicU64,
}

/// Awaitable result of one submitted callable.
pub struct PoolHandle(oneshot::Receiver<TaskOutcome>);

impl PoolHandle {
    /// Wait for the callable to finish. A pool that dropped the work without
    /// running it reports [`TaskFailure::PoolClosed`].
    pub async fn outcome(self) -> TaskOutcome {
        self.0
            .await
            .unwrap_or(TaskOutcome::Failure(TaskFailure::PoolClosed))
    }
}

pub struct WorkerPool {
    size: usize,
    sender: Mutex<Option<mpsc::UnboundedSender<Queued>>>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Start a pool with `size` slots. Must be called inside a tokio runtime.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        tokio::spawn(dispatch(rx, Arc::new(Semaphore::new(size)), Arc::clone(&counters)));
        info!(size, "worker pool started");
        Self {
            size,
            sender: Mutex::new(Some(tx)),
            counters,
        }
    }

    /// Queue `work` for execution. Never blocks and never rejects while the
    /// pool is open; after [`shutdown`](Self::shutdown) the handle resolves
    /// to `PoolClosed` immediately.
    pub fn submit<F>(&self, work: F) -> PoolHandle
    where
        F: FnOnce() -> anyhow::Result<Value> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let guard = self.sender.lock();
        match guard.as_ref() {
            Some(tx) => {
                self.counters.queued.fetch_add(1, Ordering::SeqCst);
                if tx.send(Queued { work: Box::new(work), reply }).is_err() {
                    self.counters.queued.fetch_sub(1, Ordering::SeqCst);
                    warn!("worker pool dispatcher is gone; work dropped");
                }
            }
            None => debug!("submit after shutdown refused"),
        }
        PoolHandle(rx)
    }

    /// Refuse new work. Queued and running work is left to finish.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            let stats = self.stats();
            info!(
                size = stats.size,
                busy = stats.busy,
                queued = stats.queued,
                completed = stats.completed,
                skipped = stats.skipped,
                "worker pool shutting down"
            );
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.lock().is_none()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.size,
            busy: self.counters.busy.load(Ordering::SeqCst),
            queued: self.counters.queued.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            skipped: self.counters.skipped.load(Ordering::SeqCst),
        }
    }
}

async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<Queued>,
    slots: Arc<Semaphore>,
    counters: Arc<Counters>,
) {
    while let Some(Queued { work, reply }) = rx.recv().await {
        let permit = match Arc::clone(&slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        counters.queued.fetch_sub(1, Ordering::SeqCst);

        // Nobody is waiting for this result anymore.
        if reply.is_closed() {
            counters.skipped.fetch_add(1, Ordering::SeqCst);
            debug!("skipping abandoned work before start");
            continue;
        }

        counters.busy.fetch_add(1, Ordering::SeqCst);
        let counters = Arc::clone(&counters);
        tokio::spawn(async move {
            let joined = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                work()
            })
            .await;

            let outcome = outcome_of(joined);

            counters.busy.fetch_sub(1, Ordering::SeqCst);
            counters.completed.fetch_add(1, Ordering::SeqCst);
            if reply.send(outcome).is_err() {
                debug!("work finished after its caller stopped waiting");
            }
        });
    }
    debug!("worker pool dispatcher drained");
}

fn outcome_of(joined: Result<anyhow::Result<Value>, JoinError>) -> TaskOutcome {
    match joined {
        Ok(Ok(value)) => TaskOutcome::Success(value),
        Ok(Err(err)) => TaskOutcome::Failure(TaskFailure::from_error(&err)),
        Err(err) if err.is_panic() => {
            TaskOutcome::Failure(TaskFailure::Panicked(panic_message(err.into_panic())))
        }
        // Blocking work is only cancelled before it starts, when the runtime
        // shuts down.
        Err(_) => TaskOutcome::Failure(TaskFailure::PoolClosed),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
