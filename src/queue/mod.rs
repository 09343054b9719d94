//! Bounded queues connecting the pipeline stages
//!
//! Two structures with the same lifecycle but different shapes:
//!
//! - [`PacketQueue`] - a byte-bounded FIFO of compressed packets between
//!   the reader and each decoder
//! - [`FrameRing`] - a fixed-capacity ring of reusable slots between the
//!   video decoder and the presenter
//!
//! Both carry a monotonic `closed` bit. Closing is the pipeline's only
//! end-of-stream signal: every blocked caller wakes and observes the
//! closed state, so cancellation needs no timeouts or polling.

mod frame_ring;
mod packet_queue;

pub use frame_ring::{FrameRing, MAX_RING_CAPACITY};
pub use packet_queue::{PacketQueue, QueueItem};
