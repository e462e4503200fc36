//! Fixed-size worker pool with a shared FIFO queue and a completion barrier.
//!
//! Every kernel fans its work out as one task per range, then calls
//! [`TaskPool::barrier`] before touching the result. The queue and the
//! in-flight count are the only shared mutable state and sit behind a
//! single mutex; task bodies always run outside that lock.
//!
//! Tasks are tagged with the [`Kernel`] they belong to. Pipeline code can
//! only submit through the typed [`TaskPool::submit`], so an unknown tag
//! cannot occur there. Hosts that still speak string names go through
//! [`TaskPool::submit_named`]; an unrecognized name is logged by the
//! worker and force-completed without running, so a later `barrier()`
//! never waits on it.

use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};

/// A unit of work executed by a worker thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The closed set of image kernels the pool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kernel {
    /// Darkest-wins combination of several buffers.
    CombineImages,
    /// Sobel gradient + binarization.
    SobelBinaryEdge,
    /// Stylized hatching.
    Hatching,
    /// Horizontal Gaussian pass.
    HorizontalBlur,
    /// Vertical Gaussian pass.
    VerticalBlur,
}

impl Kernel {
    /// Every kernel.
    pub const ALL: [Self; 5] = [
        Self::CombineImages,
        Self::SobelBinaryEdge,
        Self::Hatching,
        Self::HorizontalBlur,
        Self::VerticalBlur,
    ];

    /// Identifier used by string-keyed hosts.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CombineImages => "COMBINE_IMAGES",
            Self::SobelBinaryEdge => "SOBEL_BINARY_EDGE",
            Self::Hatching => "HATCHING",
            Self::HorizontalBlur => "HORIZONTAL_BLUR",
            Self::VerticalBlur => "VERTICAL_BLUR",
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A task name outside the recognized kernel identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("task '{0}' is not recognized")]
pub struct UnknownKernel(pub String);

impl FromStr for Kernel {
    type Err = UnknownKernel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| UnknownKernel(s.to_owned()))
    }
}

/// What a queued task claims to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskTag {
    /// One of the recognized kernels.
    Kernel(Kernel),
    /// Submitted without a name.
    Untagged,
    /// Submitted under a name outside the recognized set; never runs.
    Unrecognized(String),
}

impl TaskTag {
    /// Classify a string task name. The empty name is untagged.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name.is_empty() {
            return Self::Untagged;
        }
        name.parse::<Kernel>()
            .map_or_else(|UnknownKernel(n)| Self::Unrecognized(n), Self::Kernel)
    }
}

impl fmt::Display for TaskTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kernel(k) => k.fmt(f),
            Self::Untagged => f.write_str("<untagged>"),
            Self::Unrecognized(name) => write!(f, "{name}?"),
        }
    }
}

/// Lifecycle of a task. There is no failed state: rejected and panicked
/// tasks are still completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Queued, not yet picked up.
    Pending,
    /// Picked up by a worker.
    Running,
    /// Finished (or force-completed).
    Completed,
}

struct Task {
    work: Job,
    tag: TaskTag,
    state: TaskState,
}

/// Counters accumulated over the pool's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Tasks enqueued.
    pub submitted: u64,
    /// Tasks that reached [`TaskState::Completed`], including rejected ones.
    pub completed: u64,
    /// Tasks force-completed because their name was not recognized.
    pub rejected: u64,
    /// Tasks whose body panicked.
    pub panicked: u64,
}

/// Failure to start the pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct Queue {
    tasks: VecDeque<Task>,
    in_flight: usize,
    stopping: bool,
    stats: PoolStats,
}

struct Shared {
    queue: Mutex<Queue>,
    work_available: Condvar,
    all_done: Condvar,
}

impl Shared {
    /// Task bodies run outside the lock and panics are caught, so a
    /// poisoned lock still guards consistent state.
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A fixed set of worker threads sharing one task queue.
pub struct TaskPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    size: NonZeroUsize,
}

impl TaskPool {
    /// Start a pool with `workers` threads.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a thread cannot be spawned. Any
    /// workers already started are shut down and joined.
    pub fn new(workers: NonZeroUsize) -> Result<Self, PoolError> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                tasks: VecDeque::new(),
                in_flight: 0,
                stopping: false,
                stats: PoolStats::default(),
            }),
            work_available: Condvar::new(),
            all_done: Condvar::new(),
        });
        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(workers.get()),
            size: workers,
        };
        for index in 0..workers.get() {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("hatchwork-worker-{index}"))
                .spawn(move || worker_loop(&shared))?;
            pool.workers.push(handle);
        }
        log::debug!("task pool started with {workers} workers");
        Ok(pool)
    }

    /// Start a pool sized to the machine's hardware concurrency.
    ///
    /// # Errors
    ///
    /// See [`TaskPool::new`].
    pub fn with_default_workers() -> Result<Self, PoolError> {
        Self::new(default_workers())
    }

    /// Number of worker threads.
    #[must_use]
    pub const fn workers(&self) -> NonZeroUsize {
        self.size
    }

    /// Snapshot of the lifetime counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.lock().stats
    }

    /// Enqueue work for `kernel`. Returns without waiting for it to run.
    pub fn submit<F>(&self, kernel: Kernel, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(TaskTag::Kernel(kernel), Box::new(work));
    }

    /// Enqueue work with no name.
    pub fn submit_untagged<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(TaskTag::Untagged, Box::new(work));
    }

    /// Enqueue work under a string name.
    ///
    /// The name is checked when a worker picks the task up: an
    /// unrecognized non-empty name is logged and the task completes
    /// without running.
    pub fn submit_named<F>(&self, name: &str, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(TaskTag::from_name(name), Box::new(work));
    }

    fn enqueue(&self, tag: TaskTag, work: Job) {
        {
            let mut queue = self.shared.lock();
            queue.tasks.push_back(Task {
                work,
                tag,
                state: TaskState::Pending,
            });
            queue.stats.submitted += 1;
        }
        self.shared.work_available.notify_one();
    }

    /// Block until the queue is empty and no task is in flight.
    ///
    /// Covers every task submitted before the call and any submitted
    /// while waiting.
    pub fn barrier(&self) {
        let queue = self.shared.lock();
        let _drained = self
            .shared
            .all_done
            .wait_while(queue, |q| !q.tasks.is_empty() || q.in_flight > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

impl fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPool")
            .field("workers", &self.size)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shared.lock().stopping = true;
        self.shared.work_available.notify_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("worker thread exited by panic");
            }
        }
        log::debug!("task pool stopped");
    }
}

/// Hardware concurrency, never less than one.
#[must_use]
pub fn default_workers() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

enum Outcome {
    Ran,
    Rejected,
    Panicked,
}

fn worker_loop(shared: &Shared) {
    loop {
        let Task {
            work,
            tag,
            mut state,
        } = {
            let queue = shared.lock();
            let mut queue = shared
                .work_available
                .wait_while(queue, |q| !q.stopping && q.tasks.is_empty())
                .unwrap_or_else(PoisonError::into_inner);
            // Only reachable empty when stopping.
            let Some(mut task) = queue.tasks.pop_front() else {
                return;
            };
            task.state = TaskState::Running;
            queue.in_flight += 1;
            task
        };
        log::trace!("{tag} {state:?}");

        let outcome = if let TaskTag::Unrecognized(ref name) = tag {
            log::error!("task '{name}' is not recognized; completing it without running");
            Outcome::Rejected
        } else if panic::catch_unwind(AssertUnwindSafe(work)).is_err() {
            log::error!("{tag} task panicked");
            Outcome::Panicked
        } else {
            Outcome::Ran
        };

        {
            let mut queue = shared.lock();
            queue.in_flight -= 1;
            queue.stats.completed += 1;
            match outcome {
                Outcome::Ran => {}
                Outcome::Rejected => queue.stats.rejected += 1,
                Outcome::Panicked => queue.stats.panicked += 1,
            }
            state = TaskState::Completed;
        }
        shared.all_done.notify_all();
        log::trace!("{tag} {state:?}");
    }
}
