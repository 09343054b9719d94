//! Byte-bounded, closable packet FIFO
//!
//! The queue blocks producers once the queued payload reaches the byte
//! cap and blocks consumers while it is empty. `close()` wakes every
//! waiter; afterwards `push` is rejected and `pop` drains what is left
//! before reporting end-of-stream with `None`.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Byte accounting for queued items.
pub trait QueueItem {
    /// Payload size in bytes, charged against the queue's cap.
    fn size_bytes(&self) -> usize;
}

/// A bounded FIFO of compressed packets.
///
/// The bound is in bytes, not items: compressed packet sizes vary by
/// orders of magnitude across codecs, and a byte cap gives a stable
/// memory ceiling. A push that crosses the cap is still accepted, so
/// the queue may transiently overshoot by at most one packet.
pub struct PacketQueue<T> {
    state: Mutex<State<T>>,
    can_push: Condvar,
    can_pop: Condvar,
    max_bytes: usize,
}

struct State<T> {
    items: VecDeque<T>,
    bytes: usize,
    closed: bool,
}

impl<T: QueueItem> PacketQueue<T> {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                bytes: 0,
                closed: false,
            }),
            can_push: Condvar::new(),
            can_pop: Condvar::new(),
            max_bytes,
        }
    }

    /// Append an item, blocking while the queue is at its byte cap.
    ///
    /// Returns `false` if the queue is (or becomes) closed; the item is
    /// dropped in that case.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.state.lock();
        while !state.closed && state.bytes >= self.max_bytes {
            self.can_push.wait(&mut state);
        }
        if state.closed {
            return false;
        }
        state.bytes += item.size_bytes();
        state.items.push_back(item);
        self.can_pop.notify_one();
        true
    }

    /// Remove the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` only when the queue is empty *and* closed, which
    /// is the end-of-stream signal for consumers.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        while !state.closed && state.items.is_empty() {
            self.can_pop.wait(&mut state);
        }
        let item = state.items.pop_front()?;
        state.bytes -= item.size_bytes();
        self.can_push.notify_one();
        Some(item)
    }

    /// Non-blocking pop. `None` means the queue is currently empty,
    /// which callers must not interpret as end-of-stream on its own;
    /// see [`PacketQueue::is_finished`].
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        let item = state.items.pop_front()?;
        state.bytes -= item.size_bytes();
        self.can_push.notify_one();
        Some(item)
    }

    /// Drop all queued items and wake blocked producers.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.items.clear();
        state.bytes = 0;
        self.can_push.notify_all();
    }

    /// Close the queue. Idempotent; wakes every blocked producer and
    /// consumer. Once closed, the queue stays closed.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        self.can_push.notify_all();
        self.can_pop.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Closed and fully drained: nothing more will ever come out.
    pub fn is_finished(&self) -> bool {
        let state = self.state.lock();
        state.closed && state.items.is_empty()
    }

    /// Snapshot of the queued payload size in bytes.
    pub fn bytes_queued(&self) -> usize {
        self.state.lock().bytes
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    struct TestPacket(usize);

    impl QueueItem for TestPacket {
        fn size_bytes(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn test_push_pop_roundtrip() {
        let queue = PacketQueue::new(1024);
        assert!(queue.push(TestPacket(100)));
        assert_eq!(queue.bytes_queued(), 100);
        assert_eq!(queue.len(), 1);

        let packet = queue.pop().unwrap();
        assert_eq!(packet.0, 100);
        assert_eq!(queue.bytes_queued(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_try_pop_empty() {
        let queue: PacketQueue<TestPacket> = PacketQueue::new(1024);
        assert!(queue.try_pop().is_none());
        assert!(!queue.is_finished());
    }

    #[test]
    fn test_fifo_order() {
        let queue = PacketQueue::new(1024);
        for size in [10, 20, 30] {
            assert!(queue.push(TestPacket(size)));
        }
        assert_eq!(queue.pop().unwrap().0, 10);
        assert_eq!(queue.pop().unwrap().0, 20);
        assert_eq!(queue.pop().unwrap().0, 30);
    }

    #[test]
    fn test_clear_resets_bytes() {
        let queue = PacketQueue::new(1024);
        queue.push(TestPacket(500));
        queue.push(TestPacket(400));
        queue.clear();
        assert_eq!(queue.bytes_queued(), 0);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_push_blocks_at_cap_until_pop() {
        let queue = Arc::new(PacketQueue::new(100));
        assert!(queue.push(TestPacket(100)));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(TestPacket(50)))
        };

        // The producer should be parked on the full queue.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.pop().unwrap().0, 100);
        assert!(producer.join().unwrap());
        assert_eq!(queue.pop().unwrap().0, 50);
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue: Arc<PacketQueue<TestPacket>> = Arc::new(PacketQueue::new(1024));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop().map(|p| p.0))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(queue.push(TestPacket(7)));
        assert_eq!(consumer.join().unwrap(), Some(7));
    }

    #[test]
    fn test_close_rejects_push_and_drains_pop() {
        let queue = PacketQueue::new(1024);
        assert!(queue.push(TestPacket(1)));
        queue.close();

        assert!(!queue.push(TestPacket(2)));
        // Remaining items drain before the end-of-stream signal.
        assert_eq!(queue.pop().unwrap().0, 1);
        assert!(queue.pop().is_none());
        assert!(queue.is_finished());
    }

    #[test]
    fn test_close_is_idempotent_and_wakes_waiters() {
        let queue: Arc<PacketQueue<TestPacket>> = Arc::new(PacketQueue::new(1024));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop().is_none())
        };
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                // Fill the queue, then block on the cap.
                queue.push(TestPacket(2048));
                queue.push(TestPacket(1))
            })
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();
        queue.close();
        queue.close();

        assert!(!producer.join().unwrap());
        // The consumer either saw the first packet or the closed queue.
        let _ = consumer.join().unwrap();
        assert!(queue.is_closed());
    }

    #[test]
    fn test_bounded_overshoot_by_one_packet() {
        let queue = PacketQueue::new(100);
        // A single oversized packet is accepted on an empty queue.
        assert!(queue.push(TestPacket(400)));
        assert_eq!(queue.bytes_queued(), 400);
    }
}
