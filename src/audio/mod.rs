//! Audio output path
//!
//! The SDL2 audio device pulls interleaved S16 stereo PCM through a
//! fixed callback on its own thread. That callback must never block:
//! it pops compressed packets non-blockingly, decodes and resamples
//! them into a residual buffer, and fills any shortfall with silence.
//! Transient queue emptiness is therefore an underrun (silence), not an
//! error; sustained emptiness after the reader closed the queue is
//! end-of-stream.

mod resampler;

pub use resampler::{Resampler, BYTES_PER_SAMPLE, OUTPUT_CHANNELS, RESAMPLE_MARGIN};

use crate::queue::PacketQueue;
use crate::sync::{audio_clock_after, Clock};
use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use ffmpeg_next as ffmpeg;
use log::{error, info};
use sdl2::audio::{AudioCallback, AudioDevice, AudioSpecDesired};
use sdl2::AudioSubsystem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The opened audio device. Dropping it stops the callback thread and
/// releases the decoder owned by the pump.
pub struct AudioOutput {
    device: AudioDevice<AudioPump>,
}

impl AudioOutput {
    /// Open the playback device in the decoder's sample rate (stereo
    /// S16, `device_samples` frames per pull) and hand the decoder to
    /// the callback.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        subsystem: &AudioSubsystem,
        decoder: ffmpeg::decoder::Audio,
        time_base: f64,
        packets: Arc<PacketQueue<ffmpeg::Packet>>,
        clock: Arc<Clock>,
        finished: Arc<AtomicBool>,
        stop: Arc<AtomicBool>,
        device_samples: u16,
    ) -> Result<Self> {
        let desired = AudioSpecDesired {
            freq: Some(decoder.rate() as i32),
            channels: Some(OUTPUT_CHANNELS as u8),
            samples: Some(device_samples),
        };

        // The resampler targets the rate the device actually granted,
        // which is only known inside the open callback.
        let pump_ready = Arc::new(AtomicBool::new(true));
        let device = {
            let pump_ready = Arc::clone(&pump_ready);
            subsystem
                .open_playback(None, &desired, move |spec| {
                    info!(
                        "audio device opened: {} Hz, {} channels, {} samples per pull",
                        spec.freq, spec.channels, spec.samples
                    );
                    AudioPump::new(
                        decoder,
                        time_base,
                        spec.freq as u32,
                        packets,
                        clock,
                        finished,
                        stop,
                        pump_ready,
                    )
                })
                .audio_err("opening playback device")?
        };
        if !pump_ready.load(Ordering::Relaxed) {
            return Err(PlayerError::Audio("failed to configure resampler".to_string()));
        }

        Ok(Self { device })
    }

    /// Start pulling; the device calls the pump from here on.
    pub fn resume(&self) {
        self.device.resume();
    }

    pub fn pause(&self) {
        self.device.pause();
    }
}

/// Residual PCM between device pulls. A decoded frame rarely lines up
/// with the pull size, so whatever the callback cannot ship this round
/// is kept here for the next one.
struct PcmBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl PcmBuffer {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            pos: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reset the read cursor and expose the storage for refilling.
    fn refill(&mut self) -> &mut Vec<u8> {
        self.pos = 0;
        &mut self.data
    }

    /// Copy as many whole samples as fit into `out`, advancing the read
    /// cursor. Returns the number of samples written.
    fn drain_into(&mut self, out: &mut [i16]) -> usize {
        let wanted = out.len() * BYTES_PER_SAMPLE;
        let available = self.data.len() - self.pos;
        let bytes = wanted.min(available) & !1;
        for (dst, src) in out
            .iter_mut()
            .zip(self.data[self.pos..self.pos + bytes].chunks_exact(BYTES_PER_SAMPLE))
        {
            *dst = i16::from_ne_bytes([src[0], src[1]]);
        }
        self.pos += bytes;
        bytes / BYTES_PER_SAMPLE
    }
}

/// The audio decode stage, driven entirely by the device's pull
/// callback. All of its state lives here and is touched only from the
/// callback thread; the audio clock is the one value shared outward.
pub struct AudioPump {
    decoder: ffmpeg::decoder::Audio,
    resampler: Option<Resampler>,
    packets: Arc<PacketQueue<ffmpeg::Packet>>,
    frame: ffmpeg::frame::Audio,
    buffer: PcmBuffer,
    clock: Arc<Clock>,
    time_base: f64,
    finished: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl AudioPump {
    #[allow(clippy::too_many_arguments)]
    fn new(
        decoder: ffmpeg::decoder::Audio,
        time_base: f64,
        device_rate: u32,
        packets: Arc<PacketQueue<ffmpeg::Packet>>,
        clock: Arc<Clock>,
        finished: Arc<AtomicBool>,
        stop: Arc<AtomicBool>,
        ready: Arc<AtomicBool>,
    ) -> Self {
        let resampler = match Resampler::new(&decoder, device_rate) {
            Ok(resampler) => Some(resampler),
            Err(e) => {
                error!("resampler setup failed: {}", e);
                ready.store(false, Ordering::Relaxed);
                None
            }
        };
        Self {
            decoder,
            resampler,
            packets,
            frame: ffmpeg::frame::Audio::empty(),
            buffer: PcmBuffer::new(),
            clock,
            time_base,
            finished,
            stop,
        }
    }

    /// Decode one audio frame into the residual buffer and update the
    /// audio clock. Returns the number of bytes produced, 0 when no
    /// packet is currently available (this pull plays silence), or a
    /// negative value on end-of-stream or a fatal error.
    fn decode_audio_frame(&mut self) -> i64 {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return -1;
            }

            let packet = match self.packets.try_pop() {
                Some(packet) => packet,
                None => {
                    if self.packets.is_finished() {
                        // The residual buffer is exhausted (that is why
                        // we are here), so the audio path is done.
                        self.finished.store(true, Ordering::Relaxed);
                        return -1;
                    }
                    return 0;
                }
            };

            match self.decoder.send_packet(&packet) {
                Ok(()) => {}
                // EAGAIN: the decoder wants us to drain frames first.
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {}
                Err(e) => {
                    error!("audio packet rejected: {}", e);
                    return -1;
                }
            }

            loop {
                match self.decoder.receive_frame(&mut self.frame) {
                    Ok(()) => return self.refill_from_frame(),
                    Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => break,
                    Err(e) => {
                        error!("audio frame receive failed: {}", e);
                        return -1;
                    }
                }
            }
        }
    }

    fn refill_from_frame(&mut self) -> i64 {
        let Some(resampler) = self.resampler.as_mut() else {
            return -1;
        };
        let in_samples = self.frame.samples();
        let in_rate = self.frame.rate();

        let bytes = match resampler.convert(&self.frame, self.buffer.refill()) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("audio resampling failed: {}", e);
                return -1;
            }
        };

        // The clock is attributed only after the frame is fully decoded
        // and resampled: the frame's own PTS plus its duration.
        match self.frame.pts() {
            Some(pts) => self
                .clock
                .set(audio_clock_after(pts as f64 * self.time_base, in_samples, in_rate)),
            None => self.clock.invalidate(),
        }

        bytes as i64
    }
}

impl AudioCallback for AudioPump {
    type Channel = i16;

    /// Device pull. Must never block on I/O or unbounded work: any
    /// shortfall stays silence and is retried on the next pull.
    fn callback(&mut self, out: &mut [i16]) {
        out.fill(0);
        if self.stop.load(Ordering::Relaxed) {
            return;
        }

        let mut filled = 0;
        while filled < out.len() {
            if self.buffer.is_empty() {
                if self.decode_audio_frame() <= 0 {
                    return;
                }
            }
            filled += self.buffer.drain_into(&mut out[filled..]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_buffer_drains_across_pulls() {
        let mut buffer = PcmBuffer::new();
        let samples: Vec<i16> = (0..6).collect();
        let storage = buffer.refill();
        for sample in &samples {
            storage.extend_from_slice(&sample.to_ne_bytes());
        }

        let mut out = [0i16; 4];
        assert_eq!(buffer.drain_into(&mut out), 4);
        assert_eq!(out, [0, 1, 2, 3]);
        assert!(!buffer.is_empty());

        let mut out = [0i16; 4];
        assert_eq!(buffer.drain_into(&mut out), 2);
        assert_eq!(&out[..2], &[4, 5]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_pcm_buffer_refill_resets_cursor() {
        let mut buffer = PcmBuffer::new();
        buffer.refill().extend_from_slice(&42i16.to_ne_bytes());
        let mut out = [0i16; 1];
        buffer.drain_into(&mut out);
        assert!(buffer.is_empty());

        buffer.refill().extend_from_slice(&7i16.to_ne_bytes());
        assert!(!buffer.is_empty());
        buffer.drain_into(&mut out);
        assert_eq!(out[0], 7);
    }

    #[test]
    fn test_pcm_buffer_empty_when_new() {
        let buffer = PcmBuffer::new();
        assert!(buffer.is_empty());
    }
}
