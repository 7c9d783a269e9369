use crate::{
    atomic::{AtomicRef, AtomicWord64},
    PoolError,
};
use std::{
    fmt,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

/// Default number of table registry slots allocated by [`WorkerPool::start`].
pub const DEFAULT_MAX_TABLES: usize = 4096;

/// Default number of worker threads launched by [`WorkerPool::start`].
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Default stack size for worker threads, in bytes.
pub const DEFAULT_STACK_SIZE: usize = 262_144;

/// Sleep between registry scans while a worker has nothing to do. Shutdown
/// latency is on the order of one such period.
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// Sleep between polls while the starting caller waits for every worker to
/// report itself running.
const STARTUP_POLL: Duration = Duration::from_micros(100);

/// Opaque table object managed by a future associative-table engine.
///
/// The pool only ever moves pointers to these through its registry slots; it
/// never constructs, reads, or frees one.
pub struct Table {
    _priv: (),
}

/// Per-shard work strategy plugged into the pool's worker loop.
///
/// Workers call [`process_table`](Self::process_table) once for each registry
/// slot assigned to them on every scan pass. The registry slot may well be
/// null: installing tables is the business of whatever engine implements this
/// trait, and the pool passes the slot through untouched.
///
/// Registry contents carry no locking at this layer. An implementation that
/// mutates slots from several threads brings its own discipline.
pub trait TableProcessor: Send + Sync + 'static {
    /// Process one assigned registry slot.
    ///
    /// Errors are swallowed by the worker loop; an implementation that wants
    /// its failures seen must record them itself.
    fn process_table(&self, index: usize, slot: &AtomicRef<Table>) -> Result<(), PoolError>;
}

/// The default processor: does nothing. Reserved for a future
/// associative-table engine.
struct IdleProcessor;

impl TableProcessor for IdleProcessor {
    fn process_table(&self, _index: usize, _slot: &AtomicRef<Table>) -> Result<(), PoolError> {
        Ok(())
    }
}

/// OS-level launch parameters for worker threads.
#[derive(Debug, Clone)]
pub struct ThreadConfig {
    /// Stack size per worker thread, in bytes.
    pub stack_size: usize,
    /// Prefix for worker thread names; the worker ordinal is appended.
    pub name_prefix: String,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            name_prefix: String::from("ringfort-worker"),
        }
    }
}

/// Identity and liveness record for one worker thread.
pub struct ThreadStatus {
    id: AtomicWord64,
    running: AtomicWord64,
}

impl ThreadStatus {
    fn new(id: u64) -> Self {
        Self {
            id: AtomicWord64::new(id),
            running: AtomicWord64::new(0),
        }
    }

    /// The worker's ordinal, fixed at launch.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id.get()
    }

    /// Whether the worker has signaled itself running and not yet exited.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.get() == 1
    }
}

impl fmt::Debug for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadStatus")
            .field("id", &self.id())
            .field("running", &self.is_running())
            .finish()
    }
}

/// State shared between the controlling thread and every worker.
struct PoolShared {
    tables: Box<[AtomicRef<Table>]>,
    statuses: Box<[ThreadStatus]>,
    running: AtomicWord64,
    processor: Arc<dyn TableProcessor>,
}

/// A fixed set of worker threads scanning a table registry.
///
/// The pool is an explicit context object: all worker state lives here and is
/// torn down by [`stop`](Self::stop) (or by drop). Registry slots are handed
/// to the configured [`TableProcessor`] in round-robin shards — worker `w`
/// owns every index with `index % thread_count == w`.
///
/// # Examples
///
/// ```
/// use ringfort::pool::WorkerPool;
///
/// # fn main() -> Result<(), ringfort::PoolError> {
/// let pool = WorkerPool::start_advanced(128, 2)?;
/// assert_eq!(pool.thread_count(), 2);
/// assert!(pool.statuses().iter().all(|s| s.is_running()));
/// pool.stop();
/// # Ok(())
/// # }
/// ```
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start a pool with the default sizing: [`DEFAULT_MAX_TABLES`] registry
    /// slots and [`DEFAULT_WORKER_THREADS`] workers.
    pub fn start() -> Result<Self, PoolError> {
        Self::start_advanced(DEFAULT_MAX_TABLES, DEFAULT_WORKER_THREADS)
    }

    /// Start a pool with explicit registry and worker counts.
    pub fn start_advanced(max_tables: usize, threads: usize) -> Result<Self, PoolError> {
        Self::start_expert(max_tables, threads, ThreadConfig::default())
    }

    /// Start a pool with explicit sizing and OS thread launch parameters.
    pub fn start_expert(
        max_tables: usize,
        threads: usize,
        config: ThreadConfig,
    ) -> Result<Self, PoolError> {
        pool()
            .max_tables(max_tables)
            .threads(threads)
            .thread_config(config)
            .start()
    }

    /// Number of worker threads in the pool.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.shared.statuses.len()
    }

    /// Number of registry slots in the pool.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.shared.tables.len()
    }

    /// Per-worker status records, indexed by worker ordinal.
    #[must_use]
    pub fn statuses(&self) -> &[ThreadStatus] {
        &self.shared.statuses
    }

    /// Signal every worker to exit and block until each has been joined.
    ///
    /// Shutdown is cooperative: a worker observes the flag at the top of its
    /// next scan, so stop latency is roughly one idle backoff period. The
    /// registry and status arrays are released when the last reference to the
    /// shared state drops.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.running.set(0);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.thread_count())
            .field("tables", &self.table_count())
            .finish_non_exhaustive()
    }
}

/// Builder for worker pools.
///
/// # Examples
///
/// ```
/// use ringfort::pool::pool;
///
/// # fn main() -> Result<(), ringfort::PoolError> {
/// let worker_pool = pool().max_tables(64).threads(1).start()?;
/// worker_pool.stop();
/// # Ok(())
/// # }
/// ```
pub struct PoolBuilder {
    max_tables: usize,
    threads: usize,
    thread: ThreadConfig,
    processor: Arc<dyn TableProcessor>,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolBuilder {
    /// Create a builder with the default sizing and an idle processor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_tables: DEFAULT_MAX_TABLES,
            threads: DEFAULT_WORKER_THREADS,
            thread: ThreadConfig::default(),
            processor: Arc::new(IdleProcessor),
        }
    }

    /// Set the number of table registry slots.
    #[must_use]
    pub fn max_tables(mut self, max_tables: usize) -> Self {
        self.max_tables = max_tables;
        self
    }

    /// Set the number of worker threads. Must be at least one.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Override the OS thread launch parameters.
    #[must_use]
    pub fn thread_config(mut self, config: ThreadConfig) -> Self {
        self.thread = config;
        self
    }

    /// Install the per-shard work strategy.
    #[must_use]
    pub fn processor(mut self, processor: Arc<dyn TableProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Allocate the registry and status arrays, launch the workers, and
    /// block until every worker has signaled itself running.
    ///
    /// On a mid-launch spawn failure, already-running workers are signaled
    /// and joined before the error is returned, so no partially-started pool
    /// ever escapes.
    pub fn start(self) -> Result<WorkerPool, PoolError> {
        if self.threads == 0 {
            return Err(PoolError::NoWorkers);
        }

        let tables = (0..self.max_tables).map(|_| AtomicRef::null()).collect();
        let statuses = (0..self.threads)
            .map(|id| ThreadStatus::new(id as u64))
            .collect();
        let shared = Arc::new(PoolShared {
            tables,
            statuses,
            running: AtomicWord64::new(1),
            processor: self.processor,
        });

        let mut workers = Vec::with_capacity(self.threads);
        for id in 0..self.threads {
            let spawned = thread::Builder::new()
                .name(format!("{}-{id}", self.thread.name_prefix))
                .stack_size(self.thread.stack_size)
                .spawn({
                    let shared = Arc::clone(&shared);
                    move || worker_loop(&shared, id)
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    shared.running.set(0);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(PoolError::Spawn(err));
                }
            }
        }

        for status in shared.statuses.iter() {
            while status.running.get() != 1 {
                thread::sleep(STARTUP_POLL);
            }
        }

        Ok(WorkerPool { shared, workers })
    }
}

/// Convenience entry point for creating worker pools.
#[must_use]
pub fn pool() -> PoolBuilder {
    PoolBuilder::new()
}

fn worker_loop(shared: &PoolShared, thread_id: usize) {
    let status = &shared.statuses[thread_id];
    status.running.set(1);

    let thread_count = shared.statuses.len();
    while shared.running.get() == 1 {
        for (index, slot) in shared.tables.iter().enumerate() {
            if index % thread_count != thread_id {
                continue;
            }
            let _ = shared.processor.process_table(index, slot);
        }
        thread::sleep(IDLE_BACKOFF);
    }

    status.running.set(0);
}
