//! Fixed-capacity ring of reusable frame slots
//!
//! The video decoder acquires the slot at the write index, fills it in
//! place, then advances. The presenter peeks the slot at the read index
//! (possibly more than once for the same slot), and advancing the read
//! index releases the slot's payload for reuse. Indices only move
//! through the advance calls, so a peek never consumes anything.

use parking_lot::{Condvar, MappedMutexGuard, Mutex, MutexGuard};

/// Hard upper bound on the ring capacity. Audio paces video through the
/// sync controller, so a very small ring suffices; a large one would
/// only add latency to A/V mismatch recovery.
pub const MAX_RING_CAPACITY: usize = 16;

pub struct FrameRing<T> {
    state: Mutex<State<T>>,
    can_write: Condvar,
    can_read: Condvar,
}

struct State<T> {
    slots: Vec<T>,
    rindex: usize,
    windex: usize,
    size: usize,
    closed: bool,
}

impl<T: Default> FrameRing<T> {
    /// Create a ring with `capacity` preallocated slots, clamped to
    /// `[1, MAX_RING_CAPACITY]`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_RING_CAPACITY);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, T::default);
        Self {
            state: Mutex::new(State {
                slots,
                rindex: 0,
                windex: 0,
                size: 0,
                closed: false,
            }),
            can_write: Condvar::new(),
            can_read: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Borrow the slot at the write index, blocking while the ring is
    /// full. Returns `None` once the ring is closed. Does not advance.
    pub fn peek_writable(&self) -> Option<MappedMutexGuard<'_, T>> {
        let mut state = self.state.lock();
        while !state.closed && state.size == state.slots.len() {
            self.can_write.wait(&mut state);
        }
        if state.closed {
            return None;
        }
        let windex = state.windex;
        Some(MutexGuard::map(state, |s| &mut s.slots[windex]))
    }

    /// Publish the slot filled after `peek_writable` and wake a reader.
    pub fn advance_write(&self) {
        let mut state = self.state.lock();
        state.windex = (state.windex + 1) % state.slots.len();
        state.size += 1;
        self.can_read.notify_one();
    }

    /// Borrow the slot at the read index, blocking while the ring is
    /// empty. Returns `None` only when the ring is empty *and* closed:
    /// every produced frame has been consumed. Does not advance.
    pub fn peek_readable(&self) -> Option<MappedMutexGuard<'_, T>> {
        let mut state = self.state.lock();
        while !state.closed && state.size == 0 {
            self.can_read.wait(&mut state);
        }
        if state.size == 0 {
            return None;
        }
        let rindex = state.rindex;
        Some(MutexGuard::map(state, |s| &mut s.slots[rindex]))
    }

    /// Release the slot at the read index (its payload is replaced with
    /// the default value) and wake a writer.
    pub fn advance_read(&self) {
        let mut state = self.state.lock();
        let rindex = state.rindex;
        state.slots[rindex] = T::default();
        state.rindex = (rindex + 1) % state.slots.len();
        state.size -= 1;
        self.can_write.notify_one();
    }

    /// Release every slot and reset the indices.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        for slot in state.slots.iter_mut() {
            *slot = T::default();
        }
        state.rindex = 0;
        state.windex = 0;
        state.size = 0;
        self.can_write.notify_all();
    }

    /// Close the ring. Idempotent; wakes every blocked reader and
    /// writer. Once closed, the ring stays closed.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        self.can_write.notify_all();
        self.can_read.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().size
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().size == 0
    }
}
