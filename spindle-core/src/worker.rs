//! Worker threads that run deferred work and transport completions.
//!
//! Each [`Worker`] consumes a flume channel of tasks on a dedicated named
//! thread. Contexts bound to a worker hand it asynchronous completions so that
//! no completion is ever delivered from inside the context that scheduled it.

use crate::context::{Context, FsmHandle};
use crate::error::{Result, SpindleError};
use crate::event::EventType;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// Configuration for [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads (default: number of CPUs)
    pub threads: usize,
    /// Thread name prefix; workers are named `{prefix}-{n}`
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get().max(1),
            thread_name: "spindle-worker".to_string(),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

enum Task {
    Run(Box<dyn FnOnce() + Send>),
    Stop,
}

/// Handle to one worker thread. Cheap to clone.
#[derive(Clone)]
pub struct Worker {
    id: usize,
    tx: flume::Sender<Task>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker").field("id", &self.id).finish()
    }
}

impl Worker {
    #[inline]
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Schedules `f` on the worker thread.
    ///
    /// Fails with [`SpindleError::Terminated`] once the pool has shut down.
    pub fn execute(&self, f: impl FnOnce() + Send + 'static) -> Result<()> {
        self.tx
            .send(Task::Run(Box::new(f)))
            .map_err(|_| SpindleError::Terminated)
    }

    /// Delivers `kind` to the machine behind `handle` from the worker thread.
    pub fn post(&self, handle: FsmHandle, kind: EventType) -> Result<()> {
        self.execute(move || handle.post(kind))
    }
}

/// Fixed set of worker threads with round-robin assignment.
pub struct WorkerPool {
    workers: Vec<Worker>,
    threads: Vec<JoinHandle<()>>,
    next: AtomicUsize,
}

impl WorkerPool {
    /// Spawns `config.threads` named worker threads.
    pub fn new(config: PoolConfig) -> io::Result<Self> {
        let count = config.threads.max(1);
        let mut workers = Vec::with_capacity(count);
        let mut threads = Vec::with_capacity(count);

        for id in 0..count {
            let (tx, rx) = flume::unbounded::<Task>();
            let handle = thread::Builder::new()
                .name(format!("{}-{id}", config.thread_name))
                .spawn(move || run(id, &rx))?;
            workers.push(Worker { id, tx });
            threads.push(handle);
        }

        debug!(threads = count, "[POOL] Started worker pool");
        Ok(Self {
            workers,
            threads,
            next: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Picks the next worker in round-robin order.
    #[must_use]
    pub fn choose(&self) -> Worker {
        let n = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[n].clone()
    }

    /// Creates a context bound to the next worker.
    #[must_use]
    pub fn context(&self) -> Arc<Context> {
        Context::with_worker(self.choose())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.tx.send(Task::Stop);
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        debug!("[POOL] Worker pool stopped");
    }
}

fn run(id: usize, rx: &flume::Receiver<Task>) {
    trace!(worker = id, "[POOL] Worker started");
    while let Ok(task) = rx.recv() {
        match task {
            Task::Run(f) => f(),
            Task::Stop => break,
        }
    }
    trace!(worker = id, "[POOL] Worker exiting");
}
