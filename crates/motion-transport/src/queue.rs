/// Bounded FIFO queues between callers and the transport workers.
///
/// Both ends live in one value so the queue outlives any single worker task:
/// a restarted worker picks up exactly where the previous one stopped.
///   - `offer()` never waits and reports whether the item was accepted
///   - `put()` waits for space (back-pressure on the producer)
///   - `take()` waits for an item; it is cancel-safe, so it can sit in a
///     `select!` next to a cancellation token

use motion_protocol::OutboundPacket;
use tokio::sync::{mpsc, Mutex};

/// Requests waiting for the send worker (drop-on-full via `offer`).
pub type OutboundQueue = BoundedQueue<OutboundPacket>;
/// Raw datagram text waiting for the consumer (blocking `put`).
pub type InboundQueue = BoundedQueue<String>;

pub struct BoundedQueue<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
}

impl<T> BoundedQueue<T> {
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Enqueue without waiting. Returns false if the queue is full.
    pub fn offer(&self, item: T) -> bool {
        self.tx.try_send(item).is_ok()
    }

    /// Enqueue, waiting for space. Fails only if the receiving half is gone.
    pub async fn put(&self, item: T) -> Result<(), T> {
        self.tx.send(item).await.map_err(|e| e.0)
    }

    /// Dequeue, waiting for an item. `None` only if every sender is gone,
    /// which cannot happen while the queue itself is alive.
    pub async fn take(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}
