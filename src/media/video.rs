//! Video decode stage
//!
//! One thread: blocking pops from the video packet queue, decoded
//! frames into the frame ring. A closed-and-empty queue is the EOF
//! signal; the stage then flushes the codec's internal buffering with
//! `send_eof`, drains it, closes the ring and exits. The ring is closed
//! on every exit path so the presenter can never deadlock on it.

use crate::media::StreamBinding;
use crate::queue::{FrameRing, PacketQueue};
use crate::sync::{synchronize_video, Clock, FALLBACK_FRAME_DELAY};
use crate::utils::error::{PlayerError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One slot of the frame ring: a decoded YUV420P frame plus the
/// metadata the presenter needs.
pub struct VideoSlot {
    pub frame: ffmpeg::frame::Video,

    /// Presentation timestamp in seconds (clock-corrected)
    pub pts: f64,

    /// Nominal duration in seconds (1 / frame rate)
    pub duration: f64,

    pub width: u32,
    pub height: u32,

    /// Sample aspect ratio of the source picture
    pub sar: ffmpeg::Rational,
}

impl Default for VideoSlot {
    fn default() -> Self {
        Self {
            frame: ffmpeg::frame::Video::empty(),
            pts: 0.0,
            duration: 0.0,
            width: 0,
            height: 0,
            sar: ffmpeg::Rational::new(0, 1),
        }
    }
}

pub struct VideoDecodeStage {
    decoder: ffmpeg::decoder::Video,
    packets: Arc<PacketQueue<ffmpeg::Packet>>,
    frames: Arc<FrameRing<VideoSlot>>,
    time_base: f64,
    frame_rate: f64,
    /// Local video clock; mirrored into `shared_clock` so the presenter
    /// can fall back to it as the master clock for silent files.
    video_clock: f64,
    shared_clock: Arc<Clock>,
    scaler: Option<scaling::Context>,
    stop: Arc<AtomicBool>,
}

impl VideoDecodeStage {
    pub fn new(
        decoder: ffmpeg::decoder::Video,
        binding: &StreamBinding,
        packets: Arc<PacketQueue<ffmpeg::Packet>>,
        frames: Arc<FrameRing<VideoSlot>>,
        shared_clock: Arc<Clock>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            decoder,
            packets,
            frames,
            time_base: binding.time_base,
            frame_rate: binding.frame_rate,
            video_clock: 0.0,
            shared_clock,
            scaler: None,
            stop,
        }
    }

    /// Thread body.
    pub fn run(mut self) {
        info!("video decode thread started");
        if let Err(e) = self.decode_loop() {
            error!("video decoding failed: {}", e);
        }
        self.frames.close();
        info!("video decode thread finished");
    }

    fn decode_loop(&mut self) -> Result<()> {
        let mut frame = ffmpeg::frame::Video::empty();
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(());
            }

            let packet = self.packets.pop();
            match &packet {
                Some(packet) => {
                    match self.decoder.send_packet(packet) {
                        Ok(()) => {}
                        Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {}
                        // A single bad packet is not fatal; keep decoding.
                        Err(e) => warn!("video packet rejected: {}", e),
                    }
                }
                None => {
                    debug!("video packet queue closed, flushing decoder");
                    let _ = self.decoder.send_eof();
                }
            }

            loop {
                if self.stop.load(Ordering::Relaxed) {
                    return Ok(());
                }
                match self.decoder.receive_frame(&mut frame) {
                    Ok(()) => {
                        if !self.deliver(&mut frame)? {
                            // Frame ring closed: the presenter is gone.
                            return Ok(());
                        }
                    }
                    Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => break,
                    Err(ffmpeg::Error::Eof) => {
                        debug!("video decoder fully drained");
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            if packet.is_none() {
                // The flush packet was sent and the decoder has nothing
                // further to output.
                debug!("no more frames after flush");
                return Ok(());
            }
        }
    }

    /// Timestamp the decoded frame, normalize it to YUV420P and move it
    /// into the next ring slot. Returns `false` when the ring is closed.
    fn deliver(&mut self, frame: &mut ffmpeg::frame::Video) -> Result<bool> {
        let raw_pts = frame
            .pts()
            .map(|pts| pts as f64 * self.time_base)
            .unwrap_or(0.0);
        let pts = synchronize_video(&mut self.video_clock, raw_pts, self.frame_rate, frame.repeat());
        self.shared_clock.set(self.video_clock);

        let duration = if self.frame_rate > 0.0 {
            1.0 / self.frame_rate
        } else {
            FALLBACK_FRAME_DELAY
        };
        let sar = frame.aspect_ratio();

        let output = if frame.format() == Pixel::YUV420P {
            std::mem::replace(frame, ffmpeg::frame::Video::empty())
        } else {
            self.convert(frame)?
        };

        let Some(mut slot) = self.frames.peek_writable() else {
            return Ok(false);
        };
        slot.pts = pts;
        slot.duration = duration;
        slot.width = output.width();
        slot.height = output.height();
        slot.sar = sar;
        slot.frame = output;
        drop(slot);
        self.frames.advance_write();
        Ok(true)
    }

    /// Convert a frame to planar YUV420 for the sink, reusing the
    /// scaler across frames with the same geometry.
    fn convert(&mut self, frame: &ffmpeg::frame::Video) -> Result<ffmpeg::frame::Video> {
        let rebuild = match &self.scaler {
            Some(scaler) => {
                let input = scaler.input();
                input.format != frame.format()
                    || input.width != frame.width()
                    || input.height != frame.height()
            }
            None => true,
        };
        if rebuild {
            self.scaler = Some(scaling::Context::get(
                frame.format(),
                frame.width(),
                frame.height(),
                Pixel::YUV420P,
                frame.width(),
                frame.height(),
                scaling::Flags::BILINEAR,
            )?);
        }
        let Some(scaler) = self.scaler.as_mut() else {
            return Err(PlayerError::Decode("pixel format converter unavailable".to_string()));
        };
        let mut converted = ffmpeg::frame::Video::empty();
        scaler.run(frame, &mut converted)?;
        Ok(converted)
    }
}
