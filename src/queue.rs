use crate::{
    atomic::{AtomicRef, AtomicWord64},
    traits::{QueueConsumer, QueueFactory, QueueProducer},
};
use crossbeam_utils::CachePadded;
use std::{fmt, marker::PhantomData, ptr, sync::Arc, thread, time::Duration};

/// Smallest ring the queue will allocate. Capacity requests below this are
/// silently raised to it.
pub const MIN_CAPACITY: u64 = 64;

/// Sleep applied before retrying an enqueue that found its slot still
/// occupied or found the producer cursor closing on the consumer cursor.
const ENQUEUE_BACKOFF: Duration = Duration::from_micros(10);

/// Fixed-capacity lock-free MPMC ring queue of externally-owned values.
///
/// The ring is a boxed slice of nullable atomic pointer slots plus two 64-bit
/// cursors. A slot is `FREE` (null) or `OCCUPIED` (non-null) and nothing
/// else; only a producer moves a slot `FREE → OCCUPIED` and only a consumer
/// moves it back. Exclusive slot ownership is granted by winning a single
/// compare-and-swap on the shared cursor, so no slot is ever written by two
/// producers or cleared by two consumers at once. Both cursors walk the ring
/// by decrement, wrapping from `0` to `capacity - 1`.
///
/// Items are `Arc<T>` stored as raw pointers. An `Arc` can never be null,
/// which is what lets null serve as the free-slot sentinel without a reserved
/// value leaking into the element type.
///
/// Ordering: occupied slots are consumed in the cyclic order producers
/// claimed them. With a single producer and single consumer this is strict
/// FIFO; across racing producers the winner of the cursor compare-and-swap
/// decides the order, not who called [`enqueue`](Self::enqueue) first.
///
/// # Examples
///
/// ```
/// use ringfort::queue::RingQueue;
/// use std::sync::Arc;
///
/// let queue = RingQueue::with_capacity(128);
/// queue.enqueue(Arc::new("job"));
/// assert_eq!(queue.dequeue().as_deref(), Some(&"job"));
/// assert_eq!(queue.dequeue(), None);
/// ```
#[repr(align(16))]
pub struct RingQueue<T: Send + Sync> {
    nodes: Box<[CachePadded<AtomicRef<T>>]>,
    prod_pos: CachePadded<AtomicWord64>,
    cons_pos: CachePadded<AtomicWord64>,
    items: CachePadded<AtomicWord64>,
    capacity: u64,
}

impl<T: Send + Sync> RingQueue<T> {
    /// Create a queue with room for `capacity` items.
    ///
    /// Requests below [`MIN_CAPACITY`] are raised to it; the resulting
    /// capacity is immutable for the life of the queue.
    #[must_use]
    pub fn with_capacity(capacity: u64) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        let nodes = (0..capacity)
            .map(|_| CachePadded::new(AtomicRef::null()))
            .collect();
        Self {
            nodes,
            prod_pos: CachePadded::new(AtomicWord64::new(0)),
            cons_pos: CachePadded::new(AtomicWord64::new(0)),
            items: CachePadded::new(AtomicWord64::new(0)),
            capacity,
        }
    }

    /// The fixed creation-time capacity.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Approximate number of items currently held.
    ///
    /// Racy by design: exact only when no enqueue or dequeue is in flight.
    #[must_use]
    pub fn approx_items(&self) -> u64 {
        self.items.get()
    }

    /// Position one step behind `pos` in ring walk order.
    const fn step(&self, pos: u64) -> u64 {
        if pos == 0 {
            self.capacity - 1
        } else {
            pos - 1
        }
    }

    /// Enqueue `value`, retrying with a timed backoff until a slot is
    /// claimed. Cannot fail: given the queue is not permanently saturated,
    /// every call eventually lands its item.
    ///
    /// Returns the approximate occupancy right after the insert, as a fill
    /// heuristic for the caller. The count may already be stale when read.
    ///
    /// Two distinct conditions trigger the backoff sleep: the slot at the
    /// producer cursor still holds an unconsumed item (ring effectively
    /// full), or the producer cursor has closed within the guard gap of the
    /// consumer cursor. The guard gap keeps a producer from writing a slot
    /// adjacent to one a consumer may still be inspecting.
    pub fn enqueue(&self, value: Arc<T>) -> u64 {
        let raw = Arc::into_raw(value).cast_mut();
        loop {
            let prod = self.prod_pos.get();

            if !self.nodes[prod as usize].get().is_null() {
                thread::sleep(ENQUEUE_BACKOFF);
                continue;
            }

            let cons = self.cons_pos.get();
            if prod == cons + 2
                || (prod == 0 && cons == self.capacity - 2)
                || (prod == 1 && cons == self.capacity - 1)
            {
                thread::sleep(ENQUEUE_BACKOFF);
                continue;
            }

            // Winning this swap grants exclusive ownership of slot `prod`.
            // A losing producer starts over: the slot it inspected is no
            // longer the one it would own.
            if self.prod_pos.bool_cas(prod, self.step(prod)) {
                self.nodes[prod as usize].set(raw);
                self.items.inc();
                return self.items.get();
            }
        }
    }

    /// Dequeue the item at the consumer cursor, or `None` if the queue
    /// appears empty from this consumer's vantage. Never blocks.
    pub fn dequeue(&self) -> Option<Arc<T>> {
        loop {
            let cons = self.cons_pos.get();

            if self.nodes[cons as usize].get().is_null() {
                return None;
            }

            if self.cons_pos.bool_cas(cons, self.step(cons)) {
                let raw = self.nodes[cons as usize].set(ptr::null_mut());
                if raw.is_null() {
                    continue;
                }
                self.items.dec();
                // SAFETY: `raw` came from `Arc::into_raw` in `enqueue` and
                // the slot swap above removed it from the ring, so exactly
                // one `Arc` is reconstructed per stored pointer.
                return Some(unsafe { Arc::from_raw(raw) });
            }
        }
    }
}

impl<T: Send + Sync> Drop for RingQueue<T> {
    fn drop(&mut self) {
        for node in self.nodes.iter() {
            let raw = node.set(ptr::null_mut());
            if !raw.is_null() {
                // SAFETY: same provenance argument as in `dequeue`; the
                // sweep runs with exclusive access, so each pointer is
                // released exactly once.
                drop(unsafe { Arc::from_raw(raw) });
            }
        }
    }
}

impl<T: Send + Sync> fmt::Debug for RingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingQueue")
            .field("capacity", &self.capacity)
            .field("approx_items", &self.approx_items())
            .finish_non_exhaustive()
    }
}

/// Builder for ring queues.
///
/// # Examples
///
/// ```
/// use ringfort::{
///     queue::ring,
///     traits::{QueueConsumer, QueueProducer},
/// };
/// use std::sync::Arc;
///
/// let (producer, consumer) = ring::<u64>().capacity(256).channels();
/// producer.enqueue(Arc::new(7));
/// assert_eq!(consumer.dequeue().as_deref(), Some(&7));
/// ```
#[derive(Debug, Clone)]
pub struct RingBuilder<T: Send + Sync> {
    capacity: u64,
    _phantom: PhantomData<T>,
}

impl<T: Send + Sync> Default for RingBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync> RingBuilder<T> {
    /// Create a builder with the minimum capacity.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            capacity: MIN_CAPACITY,
            _phantom: PhantomData,
        }
    }

    /// Set the queue capacity. Requests below [`MIN_CAPACITY`] are raised.
    #[must_use]
    pub const fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Build the queue.
    #[must_use]
    pub fn build(self) -> Arc<RingQueue<T>> {
        Arc::new(RingQueue::with_capacity(self.capacity))
    }

    /// Build the queue and return a producer/consumer handle pair.
    #[must_use]
    pub fn channels(self) -> (RingProducer<T>, RingConsumer<T>) {
        let queue = self.build();
        (queue.producer(), queue.consumer())
    }
}

/// Convenience entry point for creating ring queues.
#[must_use]
pub const fn ring<T: Send + Sync>() -> RingBuilder<T> {
    RingBuilder::new()
}

/// Cloneable producer handle sharing a [`RingQueue`] via `Arc`.
///
/// Any number of producer handles may enqueue concurrently.
#[derive(Debug)]
pub struct RingProducer<T: Send + Sync> {
    queue: Arc<RingQueue<T>>,
}

impl<T: Send + Sync> Clone for RingProducer<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T: Send + Sync> QueueProducer<T> for RingProducer<T> {
    fn enqueue(&self, value: Arc<T>) -> u64 {
        self.queue.enqueue(value)
    }
}

/// Cloneable consumer handle sharing a [`RingQueue`] via `Arc`.
///
/// Any number of consumer handles may dequeue concurrently.
#[derive(Debug)]
pub struct RingConsumer<T: Send + Sync> {
    queue: Arc<RingQueue<T>>,
}

impl<T: Send + Sync> Clone for RingConsumer<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T: Send + Sync> QueueConsumer<T> for RingConsumer<T> {
    fn dequeue(&self) -> Option<Arc<T>> {
        self.queue.dequeue()
    }

    fn capacity(&self) -> u64 {
        self.queue.capacity()
    }

    fn approx_items(&self) -> u64 {
        self.queue.approx_items()
    }
}

impl<T: Send + Sync> QueueFactory<T> for Arc<RingQueue<T>> {
    type Producer = RingProducer<T>;
    type Consumer = RingConsumer<T>;

    fn producer(&self) -> Self::Producer {
        RingProducer {
            queue: Arc::clone(self),
        }
    }

    fn consumer(&self) -> Self::Consumer {
        RingConsumer {
            queue: Arc::clone(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomic::AtomicWord64;

    #[test]
    fn capacity_floor() {
        assert_eq!(RingQueue::<u64>::with_capacity(0).capacity(), 64);
        assert_eq!(RingQueue::<u64>::with_capacity(1).capacity(), 64);
        assert_eq!(RingQueue::<u64>::with_capacity(63).capacity(), 64);
        assert_eq!(RingQueue::<u64>::with_capacity(64).capacity(), 64);
        assert_eq!(RingQueue::<u64>::with_capacity(1000).capacity(), 1000);
    }

    #[test]
    fn fresh_queue_is_empty() {
        let queue = RingQueue::<u64>::with_capacity(64);
        assert_eq!(queue.dequeue(), None);
        assert_eq!(queue.dequeue(), None);
        assert_eq!(queue.approx_items(), 0);
    }

    #[test]
    fn spsc_fifo_order() {
        let queue = RingQueue::with_capacity(64);
        for i in 0u64..32 {
            queue.enqueue(Arc::new(i));
        }
        for i in 0u64..32 {
            assert_eq!(queue.dequeue().as_deref(), Some(&i));
        }
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn enqueue_reports_running_occupancy() {
        let queue = RingQueue::with_capacity(64);
        assert_eq!(queue.enqueue(Arc::new(10u64)), 1);
        assert_eq!(queue.enqueue(Arc::new(20u64)), 2);
        assert_eq!(queue.enqueue(Arc::new(30u64)), 3);
    }

    #[test]
    fn approx_items_exact_at_quiescence() {
        let queue = RingQueue::with_capacity(64);
        for i in 0u64..16 {
            queue.enqueue(Arc::new(i));
        }
        assert_eq!(queue.approx_items(), 16);
        for _ in 0..16 {
            assert!(queue.dequeue().is_some());
        }
        assert_eq!(queue.approx_items(), 0);
    }

    #[test]
    fn queue_is_sixteen_byte_aligned() {
        let queue = Arc::new(RingQueue::<u64>::with_capacity(64));
        assert_eq!(Arc::as_ptr(&queue) as usize % 16, 0);
    }

    #[test]
    fn drop_releases_remaining_items() {
        let value = Arc::new(99u64);
        let queue = RingQueue::with_capacity(64);
        queue.enqueue(Arc::clone(&value));
        queue.enqueue(Arc::clone(&value));
        assert_eq!(Arc::strong_count(&value), 3);
        drop(queue);
        assert_eq!(Arc::strong_count(&value), 1);
    }

    #[test]
    fn dequeue_hands_back_the_same_allocation() {
        let value = Arc::new(String::from("payload"));
        let queue = RingQueue::with_capacity(64);
        queue.enqueue(Arc::clone(&value));
        let out = queue.dequeue().unwrap();
        assert!(Arc::ptr_eq(&value, &out));
    }

    #[test]
    fn builder_channels() {
        let (producer, consumer) = ring::<u64>().capacity(10).channels();
        assert_eq!(consumer.capacity(), 64);
        producer.enqueue(Arc::new(5));
        assert_eq!(consumer.approx_items(), 1);
        assert_eq!(consumer.dequeue().as_deref(), Some(&5));
    }

    /// Port of the two-producer/one-consumer conservation check from the
    /// original test suite: one producer enqueues only odd values, the other
    /// only even, and the consumer's per-parity tallies must match exactly.
    #[test]
    fn two_producers_one_consumer_conserve_items() {
        const PER_PRODUCER: u64 = 50_000;

        let queue = Arc::new(RingQueue::with_capacity(PER_PRODUCER * 2 + 1));
        let producers: Vec<_> = [1u64, 2u64]
            .into_iter()
            .map(|start| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut value = start;
                    for _ in 0..PER_PRODUCER {
                        queue.enqueue(Arc::new(value));
                        value += 2;
                    }
                })
            })
            .collect();

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut odd = 0u64;
                let mut even = 0u64;
                while odd + even < PER_PRODUCER * 2 {
                    match queue.dequeue() {
                        Some(value) => {
                            if *value % 2 == 0 {
                                even += 1;
                            } else {
                                odd += 1;
                            }
                        }
                        None => thread::yield_now(),
                    }
                }
                (odd, even)
            })
        };

        for p in producers {
            p.join().unwrap();
        }
        let (odd, even) = consumer.join().unwrap();
        assert_eq!(odd, PER_PRODUCER);
        assert_eq!(even, PER_PRODUCER);
        assert_eq!(queue.approx_items(), 0);
    }

    /// Same conservation property over a minimum-size ring, forcing producers
    /// through the near-full backoff path.
    #[test]
    fn saturated_ring_conserves_items() {
        const PER_PRODUCER: u64 = 5_000;
        const PRODUCERS: u64 = 2;
        const CONSUMERS: u64 = 2;

        let queue = Arc::new(RingQueue::with_capacity(1));
        assert_eq!(queue.capacity(), MIN_CAPACITY);

        let consumed = Arc::new(AtomicWord64::new(0));
        let total = PER_PRODUCER * PRODUCERS;

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let consumed = Arc::clone(&consumed);
                thread::spawn(move || loop {
                    if consumed.get() >= total {
                        break;
                    }
                    match queue.dequeue() {
                        Some(_) => {
                            consumed.inc();
                        }
                        None => thread::yield_now(),
                    }
                })
            })
            .collect();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|pid| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.enqueue(Arc::new(pid * PER_PRODUCER + i));
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        for c in consumers {
            c.join().unwrap();
        }
        assert_eq!(consumed.get(), total);
        assert_eq!(queue.approx_items(), 0);
    }

    use std::collections::HashSet;
    use tokio::{task, time::sleep};

    /// Multi-producer / multi-consumer stress run: every value is consumed
    /// exactly once, detected through a shared seen-set.
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn mpmc_stress() {
        let producers = 4u64;
        let consumers = 4usize;
        let items_per_producer = 50_000u64;
        let total = (producers * items_per_producer) as usize;

        // Ample capacity: this run exercises cursor contention, not the
        // near-full backoff (which sleeps and would stall the runtime).
        let queue = ring::<u64>()
            .capacity(producers * items_per_producer * 2 + 1)
            .build();

        let seen = Arc::new(tokio::sync::Mutex::new(HashSet::<u64>::with_capacity(
            total,
        )));
        let consumed = Arc::new(AtomicWord64::new(0));

        let mut consumer_handles = Vec::with_capacity(consumers);
        for _ in 0..consumers {
            let consumer = queue.consumer();
            let seen = Arc::clone(&seen);
            let consumed = Arc::clone(&consumed);
            consumer_handles.push(task::spawn(async move {
                loop {
                    if consumed.get() >= total as u64 {
                        break;
                    }
                    match consumer.dequeue() {
                        Some(value) => {
                            let inserted = seen.lock().await.insert(*value);
                            assert!(inserted, "duplicate value observed: {value}");
                            consumed.inc();
                        }
                        None => task::yield_now().await,
                    }
                }
            }));
        }

        let mut producer_handles = Vec::with_capacity(producers as usize);
        for pid in 0..producers {
            let producer = queue.producer();
            producer_handles.push(task::spawn(async move {
                for i in 0..items_per_producer {
                    producer.enqueue(Arc::new((pid << 32) | i));
                }
            }));
        }

        for h in producer_handles {
            h.await.expect("producer join");
        }
        while consumed.get() < total as u64 {
            sleep(Duration::from_millis(1)).await;
        }
        for h in consumer_handles {
            h.await.expect("consumer join");
        }

        assert_eq!(seen.lock().await.len(), total);
        assert_eq!(queue.approx_items(), 0);
    }
}
