//! Error types for miniplay
//!
//! This module defines the error types used throughout the application.
//! We use thiserror for convenient error type definitions; the binary
//! boundary maps any failure to a nonzero exit code.

use thiserror::Error;

/// Main error type for miniplay
#[derive(Error, Debug)]
pub enum PlayerError {
    /// Demuxing errors (open input, stream discovery, packet reads)
    #[error("demux error: {0}")]
    Demux(String),

    /// Codec errors (decoder open, send/receive, pixel conversion)
    #[error("decode error: {0}")]
    Decode(String),

    /// Audio path errors (device open, resampler)
    #[error("audio error: {0}")]
    Audio(String),

    /// Video sink errors (window, renderer, texture)
    #[error("video error: {0}")]
    Video(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("file error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Invalid input errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// FFmpeg errors surfaced without additional context
    #[error(transparent)]
    Ffmpeg(#[from] ffmpeg_next::Error),
}

/// Convenience type alias for Results in miniplay
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Extension trait for converting foreign errors (notably the string
/// errors that SDL2 produces) into a `PlayerError` with context.
pub trait IntoPlayerError<T> {
    fn demux_err(self, context: &str) -> Result<T>;
    fn decode_err(self, context: &str) -> Result<T>;
    fn audio_err(self, context: &str) -> Result<T>;
    fn video_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoPlayerError<T> for std::result::Result<T, E> {
    fn demux_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Demux(format!("{}: {}", context, e)))
    }

    fn decode_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Decode(format!("{}: {}", context, e)))
    }

    fn audio_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Audio(format!("{}: {}", context, e)))
    }

    fn video_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Video(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Config(format!("{}: {}", context, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlayerError::Demux("no audio or video stream found".to_string());
        assert_eq!(err.to_string(), "demux error: no audio or video stream found");

        let err = PlayerError::Audio("device busy".to_string());
        assert_eq!(err.to_string(), "audio error: device busy");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let player_err: PlayerError = io_err.into();
        assert!(matches!(player_err, PlayerError::FileIO(_)));
    }

    #[test]
    fn test_into_player_error_trait() {
        let result: std::result::Result<(), &str> = Err("out of memory");
        let converted = result.video_err("creating texture");

        match converted {
            Err(PlayerError::Video(msg)) => {
                assert_eq!(msg, "creating texture: out of memory");
            }
            _ => panic!("expected Video error"),
        }
    }
}
