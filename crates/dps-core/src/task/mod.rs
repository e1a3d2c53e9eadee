//! Worker pool for long-running work off the owning thread
//!
//! Tasks report through three channels: progress, success and failure. The
//! owner applies results itself, after checking that the task's ticket is
//! still current for its slot.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{mpsc, oneshot};

use crate::error::{DpsError, Result};

/// Cooperative cancellation flag, checked at I/O boundaries and between chunks
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DpsError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Progress notification from a worker
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub percent: u8,
    pub message: String,
}

/// Handed to work closures so they can report progress and observe cancellation
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<Progress>>,
    cancel: CancellationToken,
}

impl ProgressReporter {
    /// A reporter nobody listens to, for synchronous callers
    pub fn detached() -> Self {
        Self {
            tx: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A reporter bound to an existing cancellation token
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self { tx: None, cancel }
    }

    pub fn report(&self, percent: u8, message: impl Into<String>) {
        if let Some(tx) = &self.tx {
            // A closed receiver only means the owner stopped listening
            let _ = tx.send(Progress {
                percent: percent.min(100),
                message: message.into(),
            });
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn check_cancelled(&self) -> Result<()> {
        self.cancel.check()
    }
}

/// Identifies one spawned task within its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub slot: &'static str,
    pub generation: u64,
}

/// One event observed on a task handle
#[derive(Debug)]
pub enum TaskEvent<T> {
    Progress(Progress),
    Success(T),
    Failure(DpsError),
}

/// Receiving side of a spawned task
pub struct TaskHandle<T> {
    ticket: Ticket,
    progress: mpsc::UnboundedReceiver<Progress>,
    result: oneshot::Receiver<Result<T>>,
    cancel: CancellationToken,
    runtime: Handle,
    finished: bool,
}

impl<T> TaskHandle<T> {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Request cancellation; the task ends with `Cancelled`
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Non-blocking poll for UI loops
    pub fn try_next(&mut self) -> Option<TaskEvent<T>> {
        if let Ok(progress) = self.progress.try_recv() {
            return Some(TaskEvent::Progress(progress));
        }
        if self.finished {
            return None;
        }
        match self.result.try_recv() {
            Ok(outcome) => {
                self.finished = true;
                Some(Self::into_event(outcome))
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.finished = true;
                Some(TaskEvent::Failure(abandoned()))
            }
        }
    }

    /// Block the calling thread until the task ends, forwarding progress
    ///
    /// Must not be called from inside the pool's runtime.
    pub fn wait(mut self, mut on_progress: impl FnMut(&Progress)) -> Result<T> {
        let runtime = self.runtime.clone();
        runtime.block_on(async move {
            loop {
                tokio::select! {
                    Some(progress) = self.progress.recv() => on_progress(&progress),
                    outcome = &mut self.result => {
                        while let Ok(progress) = self.progress.try_recv() {
                            on_progress(&progress);
                        }
                        return outcome.unwrap_or_else(|_| Err(abandoned()));
                    }
                }
            }
        })
    }

    fn into_event(outcome: Result<T>) -> TaskEvent<T> {
        match outcome {
            Ok(value) => TaskEvent::Success(value),
            Err(err) => TaskEvent::Failure(err),
        }
    }
}

fn abandoned() -> DpsError {
    DpsError::InvalidOperation("Worker task ended without a result".to_string())
}

/// Multi-threaded worker pool with per-slot staleness tracking
pub struct TaskPool {
    runtime: Runtime,
    generations: Mutex<AHashMap<&'static str, u64>>,
}

impl TaskPool {
    /// Create a pool with `worker_threads` runtime workers
    pub fn new(worker_threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("dps-worker")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            generations: Mutex::new(AHashMap::new()),
        })
    }

    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Run a future to completion on the pool from the owning thread
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn next_ticket(&self, slot: &'static str) -> Ticket {
        let mut generations = self.generations.lock();
        let generation = generations.entry(slot).or_insert(0);
        *generation += 1;
        Ticket {
            slot,
            generation: *generation,
        }
    }

    /// Whether `ticket` is the latest task spawned in its slot
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.generations.lock().get(ticket.slot).copied() == Some(ticket.generation)
    }

    /// Mark every outstanding task in `slot` as stale
    pub fn supersede(&self, slot: &'static str) {
        *self.generations.lock().entry(slot).or_insert(0) += 1;
    }

    /// Run CPU-bound or blocking work on the blocking pool
    pub fn spawn_blocking<T, F>(&self, slot: &'static str, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&ProgressReporter) -> Result<T> + Send + 'static,
    {
        let (reporter, handle, result_tx) = self.prepare(slot);
        self.runtime.spawn_blocking(move || {
            let outcome = work(&reporter).and_then(|value| {
                reporter.check_cancelled()?;
                Ok(value)
            });
            let _ = result_tx.send(outcome);
        });
        handle
    }

    /// Run async work (I/O) on the runtime
    pub fn spawn<T, F, Fut>(&self, slot: &'static str, make: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(ProgressReporter) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (reporter, handle, result_tx) = self.prepare(slot);
        let token = reporter.token().clone();
        let future = make(reporter);
        self.runtime.spawn(async move {
            let outcome = future.await.and_then(|value| {
                token.check()?;
                Ok(value)
            });
            let _ = result_tx.send(outcome);
        });
        handle
    }

    fn prepare<T>(&self, slot: &'static str) -> (ProgressReporter, TaskHandle<T>, oneshot::Sender<Result<T>>) {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let reporter = ProgressReporter {
            tx: Some(progress_tx),
            cancel: cancel.clone(),
        };
        let handle = TaskHandle {
            ticket: self.next_ticket(slot),
            progress: progress_rx,
            result: result_rx,
            cancel,
            runtime: self.handle(),
            finished: false,
        };
        (reporter, handle, result_tx)
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("slots", &self.generations.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;

    #[test]
    fn test_success_with_progress() {
        let pool = TaskPool::new(2).unwrap();
        let handle = pool.spawn_blocking("import", |reporter| {
            reporter.report(50, "half way");
            reporter.report(100, "done");
            Ok(42)
        });
        let mut seen = Vec::new();
        let value = handle.wait(|p| seen.push(p.percent)).unwrap();
        assert_eq!(value, 42);
        assert_eq!(seen, vec![50, 100]);
    }

    #[test]
    fn test_cancelled_task_fails_with_cancelled() {
        let pool = TaskPool::new(1).unwrap();
        let (go_tx, go_rx) = std_mpsc::channel::<()>();
        let handle = pool.spawn_blocking("import", move |reporter| {
            let _ = go_rx.recv();
            reporter.check_cancelled()?;
            Ok(1)
        });
        handle.cancel();
        go_tx.send(()).unwrap();
        let err = handle.wait(|_| {}).unwrap_err();
        assert!(matches!(err, DpsError::Cancelled));
    }

    #[test]
    fn test_newer_ticket_supersedes_older() {
        let pool = TaskPool::new(1).unwrap();
        let first = pool.spawn_blocking("import", |_| Ok(()));
        let second = pool.spawn_blocking("import", |_| Ok(()));
        let other = pool.spawn_blocking("aggregate", |_| Ok(()));
        assert!(!pool.is_current(&first.ticket()));
        assert!(pool.is_current(&second.ticket()));
        assert!(pool.is_current(&other.ticket()));
        pool.supersede("import");
        assert!(!pool.is_current(&second.ticket()));
    }

    #[test]
    fn test_async_spawn() {
        let pool = TaskPool::new(1).unwrap();
        let handle = pool.spawn("query", |reporter| async move {
            reporter.report(10, "connecting");
            Ok("rows".to_string())
        });
        assert_eq!(handle.wait(|_| {}).unwrap(), "rows");
    }
}
