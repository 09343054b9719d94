//! Reader stage: demuxes packets into the per-stream queues
//!
//! One thread, one packet per iteration. Queue byte caps provide the
//! backpressure; closing both queues on exit is the pipeline's only
//! end-of-stream signal to the decoders.

use crate::queue::PacketQueue;
use ffmpeg_next as ffmpeg;
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long to sleep when a packet queue is over its byte cap.
const BACKPRESSURE_SLEEP: Duration = Duration::from_millis(10);

/// The reader owns the demuxer; packets are routed by stream index to
/// the bound queues and every other stream is discarded.
pub struct Reader {
    input: ffmpeg::format::context::Input,
    video: Option<(usize, Arc<PacketQueue<ffmpeg::Packet>>)>,
    audio: Option<(usize, Arc<PacketQueue<ffmpeg::Packet>>)>,
    max_queue_bytes: usize,
    stop: Arc<AtomicBool>,
}

impl Reader {
    pub fn new(
        input: ffmpeg::format::context::Input,
        video: Option<(usize, Arc<PacketQueue<ffmpeg::Packet>>)>,
        audio: Option<(usize, Arc<PacketQueue<ffmpeg::Packet>>)>,
        max_queue_bytes: usize,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            input,
            video,
            audio,
            max_queue_bytes,
            stop,
        }
    }

    fn over_cap(&self) -> bool {
        let video_over = self
            .video
            .as_ref()
            .is_some_and(|(_, q)| q.bytes_queued() > self.max_queue_bytes);
        let audio_over = self
            .audio
            .as_ref()
            .is_some_and(|(_, q)| q.bytes_queued() > self.max_queue_bytes);
        video_over || audio_over
    }

    fn queue_for(&self, stream_index: usize) -> Option<&PacketQueue<ffmpeg::Packet>> {
        if let Some((index, queue)) = &self.video {
            if stream_index == *index {
                return Some(queue);
            }
        }
        if let Some((index, queue)) = &self.audio {
            if stream_index == *index {
                return Some(queue);
            }
        }
        None
    }

    /// Thread body. Runs until end-of-stream, a read error, a rejected
    /// push (downstream closed) or the stop flag, then closes both
    /// queues.
    pub fn run(mut self) {
        info!("reader thread started");
        loop {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            if self.over_cap() {
                thread::sleep(BACKPRESSURE_SLEEP);
                continue;
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => {
                    info!("end of input reached");
                    break;
                }
                Err(e) => {
                    error!("packet read failed: {}", e);
                    break;
                }
            }

            if let Some(queue) = self.queue_for(packet.stream()) {
                if !queue.push(packet) {
                    // Downstream closed underneath us; nothing left to feed.
                    break;
                }
            }
        }

        if let Some((_, queue)) = &self.video {
            queue.close();
        }
        if let Some((_, queue)) = &self.audio {
            queue.close();
        }
        info!("reader thread finished");
    }
}
