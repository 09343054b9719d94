//! Demuxing and decoding over FFmpeg
//!
//! `MediaSource` opens the container and binds the first video and
//! first audio stream. The reader stage routes compressed packets into
//! the per-stream queues; the video decode stage turns video packets
//! into presentable frames in the ring.

mod reader;
mod video;

pub use reader::Reader;
pub use video::{VideoDecodeStage, VideoSlot};

use crate::queue::QueueItem;
use crate::utils::error::{PlayerError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::media;
use log::info;
use std::path::Path;

impl QueueItem for ffmpeg::Packet {
    fn size_bytes(&self) -> usize {
        self.size()
    }
}

/// Everything the pipeline needs to know about one bound stream.
#[derive(Clone)]
pub struct StreamBinding {
    /// Stream index inside the container
    pub index: usize,

    /// Time base in seconds per PTS unit
    pub time_base: f64,

    /// Average frame rate in frames per second; 0.0 when the container
    /// does not report one (video streams only)
    pub frame_rate: f64,

    /// Codec parameters for opening the decoder
    pub parameters: ffmpeg::codec::Parameters,
}

impl StreamBinding {
    fn from_stream(stream: &ffmpeg::Stream) -> Self {
        let rate = stream.avg_frame_rate();
        let frame_rate = if rate.numerator() != 0 && rate.denominator() != 0 {
            f64::from(rate)
        } else {
            0.0
        };
        Self {
            index: stream.index(),
            time_base: f64::from(stream.time_base()),
            frame_rate,
            parameters: stream.parameters(),
        }
    }
}

/// An opened container with its selected streams.
pub struct MediaSource {
    pub input: ffmpeg::format::context::Input,
    pub video: Option<StreamBinding>,
    pub audio: Option<StreamBinding>,
}

impl MediaSource {
    /// Open `path` and bind the first video and first audio stream.
    /// Fails if the container holds neither.
    pub fn open(path: &Path) -> Result<Self> {
        let input = ffmpeg::format::input(&path)
            .map_err(|e| PlayerError::Demux(format!("failed to open {}: {}", path.display(), e)))?;

        let mut video = None;
        let mut audio = None;
        for stream in input.streams() {
            match stream.parameters().medium() {
                media::Type::Video if video.is_none() => {
                    video = Some(StreamBinding::from_stream(&stream));
                }
                media::Type::Audio if audio.is_none() => {
                    audio = Some(StreamBinding::from_stream(&stream));
                }
                _ => {}
            }
        }

        if video.is_none() && audio.is_none() {
            return Err(PlayerError::Demux("no audio or video stream found".to_string()));
        }

        info!(
            "opened {}: video stream {:?}, audio stream {:?}",
            path.display(),
            video.as_ref().map(|s| s.index),
            audio.as_ref().map(|s| s.index),
        );
        Ok(Self { input, video, audio })
    }
}
