use std::sync::Arc;

/// Trait for queue producers that can enqueue items.
///
/// Implemented by producer handles so callers can stay generic over where a
/// queue came from. Enqueueing cannot fail: the queue retries internally when
/// the ring is near full, so the only signal a producer gets back is the
/// approximate occupancy after its item landed.
pub trait QueueProducer<T> {
    /// Enqueue a value, retrying internally until a slot is claimed.
    ///
    /// Returns the approximate number of items in the queue immediately after
    /// this insert. Other threads may already have changed the count by the
    /// time the caller reads it; it is a heuristic fill signal, not a precise
    /// fact.
    fn enqueue(&self, value: Arc<T>) -> u64;
}

/// Trait for queue consumers that can dequeue items and observe occupancy.
pub trait QueueConsumer<T> {
    /// Dequeue the item at the consumer cursor.
    ///
    /// Returns `None` immediately if the queue appears empty from this
    /// consumer's vantage; never blocks waiting for a producer.
    fn dequeue(&self) -> Option<Arc<T>>;

    /// The fixed creation-time capacity of the queue.
    fn capacity(&self) -> u64;

    /// The approximate number of items currently in the queue.
    ///
    /// Exact only at quiescence (no in-flight operations); otherwise it may
    /// be stale by the time the caller observes it.
    fn approx_items(&self) -> u64;
}

/// Trait for queues that can mint producer and consumer handles.
pub trait QueueFactory<T> {
    /// The type of producers this queue creates.
    type Producer: QueueProducer<T>;

    /// The type of consumers this queue creates.
    type Consumer: QueueConsumer<T>;

    /// Create both handles in one call.
    fn channel(&self) -> (Self::Producer, Self::Consumer) {
        (self.producer(), self.consumer())
    }

    /// Create a new producer handle for this queue.
    fn producer(&self) -> Self::Producer;

    /// Create a new consumer handle for this queue.
    fn consumer(&self) -> Self::Consumer;
}
