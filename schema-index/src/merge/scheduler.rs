//! Where merge producers run.
//!
//! Each merger in a merge tree gets its own job, so a scheduler must be able
//! to run all of them at the same time: a parent blocks on its children's
//! output.

use std::thread;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::storage::StorageError;

/// A unit of population work.
pub type Job = Box<dyn FnOnce() -> Result<(), StorageError> + Send + 'static>;

/// Runs population jobs concurrently.
pub trait PopulationWorkScheduler: Send + Sync {
    /// Start `job` and return a handle to wait for its result.
    fn schedule(&self, name: &str, job: Job) -> JobHandle;
}

/// Result of a scheduled job.
#[derive(Debug)]
pub struct JobHandle {
    name: String,
    inner: HandleInner,
}

#[derive(Debug)]
enum HandleInner {
    Thread(thread::JoinHandle<Result<(), StorageError>>),
    Channel(oneshot::Receiver<Result<(), StorageError>>),
    Failed(String),
}

impl JobHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until the job ends. A panicking job is reported as
    /// [`StorageError::TaskFailed`].
    ///
    /// Must not be called from inside an async context.
    pub fn wait(self) -> Result<(), StorageError> {
        match self.inner {
            HandleInner::Thread(handle) => handle.join().unwrap_or_else(|_| {
                Err(StorageError::TaskFailed(format!("{} panicked", self.name)))
            }),
            HandleInner::Channel(receiver) => receiver.blocking_recv().unwrap_or_else(|_| {
                Err(StorageError::TaskFailed(format!("{} panicked", self.name)))
            }),
            HandleInner::Failed(message) => Err(StorageError::TaskFailed(message)),
        }
    }
}

/// Runs every job on its own named OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadScheduler;

impl PopulationWorkScheduler for ThreadScheduler {
    fn schedule(&self, name: &str, job: Job) -> JobHandle {
        debug!(job = name, "scheduling on thread");
        let inner = match thread::Builder::new().name(name.to_owned()).spawn(job) {
            Ok(handle) => HandleInner::Thread(handle),
            Err(e) => {
                warn!(job = name, error = %e, "failed to spawn thread");
                HandleInner::Failed(format!("failed to spawn {name}: {e}"))
            }
        };
        JobHandle {
            name: name.to_owned(),
            inner,
        }
    }
}

/// Runs jobs on a tokio runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler for the runtime the caller is running in, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl PopulationWorkScheduler for TokioScheduler {
    fn schedule(&self, name: &str, job: Job) -> JobHandle {
        debug!(job = name, "scheduling on blocking pool");
        let (sender, receiver) = oneshot::channel();
        // The task handle is dropped; completion is reported over the channel.
        drop(self.handle.spawn_blocking(move || {
            let _ = sender.send(job());
        }));
        JobHandle {
            name: name.to_owned(),
            inner: HandleInner::Channel(receiver),
        }
    }
}
