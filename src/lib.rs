//! # Ringfort: Portable Atomics, a Bounded Lock-Free MPMC Ring, and a Worker Pool
//!
//! Ringfort provides low-level concurrency infrastructure in three layers:
//!
//! 1. **Atomic primitives** ([`atomic`]): 32-bit, 64-bit, and pointer-sized
//!    words with sequentially consistent load/store/arithmetic/bitwise and
//!    compare-and-swap operations, built on `portable-atomic` so one
//!    implementation serves every target.
//! 2. **Bounded lock-free queue** ([`queue`]): a fixed-capacity MPMC circular
//!    queue of nullable slots manipulated only through the atomic layer, with
//!    full/empty disambiguation under concurrent wraparound and timed backoff
//!    under contention.
//! 3. **Worker pool** ([`pool`]): process-lifecycle scaffolding that launches
//!    a fixed set of OS threads, shards a table registry across them, and
//!    hands each shard to a pluggable [`pool::TableProcessor`].
//!
//! ## Queue quick start
//!
//! ```rust
//! use ringfort::{
//!     queue::ring,
//!     traits::{QueueConsumer, QueueProducer},
//! };
//! use std::sync::Arc;
//!
//! let (producer, consumer) = ring::<u64>().capacity(1024).channels();
//!
//! producer.enqueue(Arc::new(42));
//! assert_eq!(consumer.dequeue().as_deref(), Some(&42));
//! assert_eq!(consumer.dequeue(), None);
//! ```
//!
//! Enqueue never fails: when the ring is near full it retries with a timed
//! backoff until a slot frees up. Dequeue never blocks: an empty queue reads
//! as `None` immediately. The occupancy counter is approximate by design and
//! exact only at quiescence.
//!
//! ## Multi-threaded usage
//!
//! Handles are cloneable and the queue is safe for arbitrarily many
//! concurrent producers and consumers:
//!
//! ```rust
//! use ringfort::{
//!     queue::ring,
//!     traits::{QueueConsumer, QueueProducer},
//! };
//! use std::{sync::Arc, thread};
//!
//! let (producer, consumer) = ring::<u64>().capacity(256).channels();
//!
//! let worker = {
//!     let producer = producer.clone();
//!     thread::spawn(move || {
//!         for i in 0..100 {
//!             producer.enqueue(Arc::new(i));
//!         }
//!     })
//! };
//! worker.join().unwrap();
//!
//! let mut received = 0;
//! while consumer.dequeue().is_some() {
//!     received += 1;
//! }
//! assert_eq!(received, 100);
//! ```
//!
//! ## Worker pool
//!
//! ```rust
//! use ringfort::pool::WorkerPool;
//!
//! # fn main() -> Result<(), ringfort::PoolError> {
//! let pool = WorkerPool::start_advanced(256, 2)?;
//! assert!(pool.statuses().iter().all(|s| s.is_running()));
//! pool.stop(); // joins every worker before returning
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress guarantees
//!
//! The queue is lock-free, not wait-free: no mutual-exclusion locks exist
//! anywhere, and the system as a whole always makes progress, but an
//! individual thread can in principle lose the cursor compare-and-swap race
//! indefinitely. Backoff makes that vanishingly unlikely in practice. The
//! only blocking points in the crate are timed sleeps: the enqueue backoff,
//! the worker idle interval, and the pool startup barrier.
//!
//! Ordering across racing producers is decided by who wins the cursor
//! compare-and-swap, not by who called enqueue first. Single-producer,
//! single-consumer use is strict FIFO.

#![deny(
    missing_docs,
    unused_imports,
    unused_variables,
    dead_code,
    unreachable_code,
    unused_must_use
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::inline_always
)]

/// Sequentially consistent atomic words and pointer slots.
///
/// This module is the portability seam: everything above it manipulates
/// shared memory exclusively through these types, and
/// [`portable-atomic`](https://crates.io/crates/portable-atomic) supplies a
/// native or polyfilled implementation per target.
pub mod atomic;

/// Worker-pool lifecycle: registry allocation, thread launch and join, and
/// the pluggable per-shard processing strategy.
pub mod pool;

/// The bounded lock-free MPMC ring queue, its builder, and its
/// producer/consumer handles.
pub mod queue;

/// Trait seams shared by queue producers, consumers, and factories.
pub mod traits;

use std::io;
use thiserror::Error;

/// Errors surfaced by pool startup and by table processors.
///
/// Queue operations have no error surface at all: enqueue retries until it
/// succeeds and dequeue-on-empty returns `None`. Transient contention is
/// never reported as an error anywhere in the crate.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The operating system refused to launch a worker thread.
    ///
    /// This is the only fallible step of pool startup; any workers launched
    /// before the failure are signaled and joined before this is returned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),

    /// A pool was configured with zero worker threads.
    #[error("pool requires at least one worker thread")]
    NoWorkers,

    /// A table processor failed on one registry slot.
    ///
    /// Never produced by this crate's own processors; reserved as the error
    /// channel for table engines plugged in through
    /// [`pool::TableProcessor`].
    #[error("table {index} processing failed: {reason}")]
    Table {
        /// Registry index of the slot being processed.
        index: usize,
        /// Engine-specific description of the failure.
        reason: String,
    },
}
