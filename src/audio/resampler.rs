//! Audio resampling to the device's interleaved S16 stereo format
//!
//! Configured once at stream open from the decoder's input parameters.
//! When the source already is packed S16 stereo at the device rate the
//! conversion step is skipped and PCM is copied straight through.

use crate::utils::error::Result;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::format::Sample;
use ffmpeg_next::software::resampling;
use ffmpeg_next::ChannelLayout;

/// Output channel count (stereo).
pub const OUTPUT_CHANNELS: usize = 2;

/// Bytes per S16 sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Extra per-channel samples allocated on the resampler output: the
/// converter's internal latency can make it emit slightly more samples
/// than it was fed.
pub const RESAMPLE_MARGIN: usize = 256;

pub struct Resampler {
    /// `None` when the source format already matches the device and no
    /// conversion is needed.
    context: Option<resampling::Context>,
    out_rate: u32,
}

impl Resampler {
    pub fn new(decoder: &ffmpeg::decoder::Audio, device_rate: u32) -> Result<Self> {
        let in_format = decoder.format();
        let in_rate = decoder.rate();
        let in_layout = if decoder.channel_layout().is_empty() {
            ChannelLayout::default(i32::from(decoder.channels()))
        } else {
            decoder.channel_layout()
        };
        let out_format = Sample::I16(SampleType::Packed);

        let context = if in_format == out_format
            && in_rate == device_rate
            && in_layout == ChannelLayout::STEREO
        {
            None
        } else {
            Some(resampling::Context::get(
                in_format,
                in_layout,
                in_rate,
                out_format,
                ChannelLayout::STEREO,
                device_rate,
            )?)
        };

        Ok(Self {
            context,
            out_rate: device_rate,
        })
    }

    /// Convert one decoded frame into `out` (cleared first) and return
    /// the number of bytes produced.
    pub fn convert(&mut self, frame: &ffmpeg::frame::Audio, out: &mut Vec<u8>) -> Result<usize> {
        out.clear();
        let bytes = match self.context.as_mut() {
            Some(context) => {
                let capacity = frame.samples() + RESAMPLE_MARGIN;
                let mut resampled = ffmpeg::frame::Audio::new(
                    Sample::I16(SampleType::Packed),
                    capacity,
                    ChannelLayout::STEREO,
                );
                resampled.set_rate(self.out_rate);
                context.run(frame, &mut resampled)?;
                let bytes = resampled.samples() * OUTPUT_CHANNELS * BYTES_PER_SAMPLE;
                out.extend_from_slice(&resampled.data(0)[..bytes]);
                bytes
            }
            None => {
                let bytes = frame.samples() * OUTPUT_CHANNELS * BYTES_PER_SAMPLE;
                out.extend_from_slice(&frame.data(0)[..bytes]);
                bytes
            }
        };
        Ok(bytes)
    }
}
