//! Configuration management for miniplay
//!
//! Defaults cover everything the player needs; a user config file
//! (TOML) can override individual values.

use crate::utils::error::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Window configuration
    pub window: WindowConfig,

    /// Pipeline buffering configuration
    pub playback: PlaybackConfig,

    /// Audio device configuration
    pub audio: AudioConfig,

    /// A/V synchronization tuning
    pub sync: SyncConfig,
}

/// Window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Initial window width
    pub width: u32,

    /// Initial window height
    pub height: u32,

    /// Window title
    pub title: String,
}

/// Pipeline buffering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Byte cap for each compressed packet queue. Packet sizes vary by
    /// orders of magnitude across codecs, so the bound is in bytes
    /// rather than packets.
    pub packet_queue_bytes: usize,

    /// Number of decoded frames buffered for presentation (clamped to
    /// the ring's hard maximum of 16)
    pub frame_ring_capacity: usize,
}

/// Audio device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Samples per device pull (callback chunk size)
    pub device_samples: u16,
}

/// A/V synchronization tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Lower bound of the sync hysteresis band, seconds
    pub min_sync_threshold: f64,

    /// Upper bound of the sync hysteresis band, seconds
    pub max_sync_threshold: f64,

    /// Clock difference beyond which sync correction is suppressed
    /// entirely, seconds
    pub no_sync_threshold: f64,

    /// Floor for the presenter's computed refresh delay, seconds
    pub min_refresh_delay: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            title: "miniplay".to_string(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            packet_queue_bytes: 15 * 1024 * 1024,
            frame_ring_capacity: 3,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_samples: 1024,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_sync_threshold: 0.040,
            max_sync_threshold: 0.100,
            no_sync_threshold: 10.0,
            min_refresh_delay: 0.010,
        }
    }
}

impl Config {
    /// Load configuration: defaults, overridden by the user config file
    /// when one exists.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::user_config_path() {
            if path.exists() {
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| PlayerError::Config(format!("failed to read {}: {}", path.display(), e)))?;
                config = toml::from_str(&contents)
                    .map_err(|e| PlayerError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(PlayerError::Config("window dimensions must be non-zero".to_string()));
        }

        if self.playback.packet_queue_bytes == 0 {
            return Err(PlayerError::Config("packet queue cap must be non-zero".to_string()));
        }

        if self.playback.frame_ring_capacity == 0 {
            return Err(PlayerError::Config("frame ring capacity must be non-zero".to_string()));
        }

        if self.sync.min_sync_threshold > self.sync.max_sync_threshold {
            return Err(PlayerError::Config(
                "min sync threshold must not exceed max sync threshold".to_string(),
            ));
        }

        Ok(())
    }

    /// Get user config file path
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("miniplay").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window.width, 1920);
        assert_eq!(config.window.height, 1080);
        assert_eq!(config.playback.packet_queue_bytes, 15 * 1024 * 1024);
        assert_eq!(config.playback.frame_ring_capacity, 3);
        assert_eq!(config.audio.device_samples, 1024);
        assert_eq!(config.sync.min_sync_threshold, 0.040);
        assert_eq!(config.sync.max_sync_threshold, 0.100);
        assert_eq!(config.sync.no_sync_threshold, 10.0);
        assert_eq!(config.sync.min_refresh_delay, 0.010);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.window.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.playback.frame_ring_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sync.min_sync_threshold = 0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml).unwrap();

        assert_eq!(config.window.width, deserialized.window.width);
        assert_eq!(config.playback.packet_queue_bytes, deserialized.playback.packet_queue_bytes);
        assert_eq!(config.sync.max_sync_threshold, deserialized.sync.max_sync_threshold);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("[window]\nwidth = 1280\nheight = 720\n").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.playback.frame_ring_capacity, 3);
    }
}
