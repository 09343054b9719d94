//! Clocks and A/V synchronization laws
//!
//! The master clock is the audio clock whenever an audio stream is
//! bound, otherwise the video clock. Lip-sync is achieved by comparing
//! each video frame's PTS against the master clock and either dropping
//! the frame (video is late; audio cannot slow down without pitch
//! artifacts) or stretching the refresh delay (video is early).

use crate::utils::config::SyncConfig;
use std::sync::atomic::{AtomicU64, Ordering};

/// Frame duration used when the stream carries no usable frame rate
/// (0.04 s, i.e. 25 fps).
pub const FALLBACK_FRAME_DELAY: f64 = 0.04;

/// A clock value in seconds, shared across threads as a single atomic
/// 64-bit scalar. NaN means "unavailable" (e.g. an audio frame without
/// a PTS) and consumers must treat it as such.
pub struct Clock(AtomicU64);

impl Clock {
    pub fn new() -> Self {
        Self(AtomicU64::new(0f64.to_bits()))
    }

    pub fn set(&self, seconds: f64) {
        self.0.store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Mark the clock as unavailable until the next valid update.
    pub fn invalidate(&self) {
        self.set(f64::NAN);
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Update the video clock for one decoded frame and return the frame's
/// effective PTS.
///
/// A frame with a PTS resets the clock; a frame without one inherits
/// the clock (the extrapolated timestamp of the previous frame). The
/// clock then advances by the frame interval, stretched by half an
/// interval per unit of `repeat` (the codec's hold hint for telecined
/// or interlaced content).
pub fn synchronize_video(video_clock: &mut f64, pts: f64, frame_rate: f64, repeat: f64) -> f64 {
    let pts = if pts != 0.0 {
        *video_clock = pts;
        pts
    } else {
        *video_clock
    };
    let base_delay = if frame_rate > 0.0 {
        1.0 / frame_rate
    } else {
        FALLBACK_FRAME_DELAY
    };
    let frame_delay = base_delay + repeat * (base_delay * 0.5);
    *video_clock += frame_delay;
    pts
}

/// Audio clock value after a decoded frame: the frame's PTS plus its
/// duration in samples.
pub fn audio_clock_after(pts_seconds: f64, samples: usize, sample_rate: u32) -> f64 {
    pts_seconds + samples as f64 / f64::from(sample_rate)
}

/// Presenter decision for the frame at the head of the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStep {
    /// The frame is too late: discard it without rendering and refresh
    /// again immediately.
    Drop,

    /// Render the frame and refresh again after `delay_ms`.
    Present { delay_ms: u32 },
}

/// Presentation timing state, owned by the presenter.
///
/// `frame_timer` is a cumulative ideal timetable: it advances by the
/// adjusted per-frame delay on every refresh, and the actual timer
/// delay is computed against real time. Scheduler jitter therefore
/// corrects itself instead of accumulating.
pub struct VideoSyncState {
    frame_timer: f64,
    last_frame_pts: f64,
    last_frame_delay: f64,
}

impl VideoSyncState {
    /// `now` calibrates the zero point of the frame timer; pass the
    /// current time on the same monotonic scale used for refreshes.
    pub fn new(now: f64) -> Self {
        Self {
            frame_timer: now,
            last_frame_pts: 0.0,
            last_frame_delay: 0.0,
        }
    }

    /// Decide what to do with the frame whose PTS is `pts`, given the
    /// master clock and the current monotonic time, both in seconds.
    pub fn advance(&mut self, pts: f64, master_clock: f64, now: f64, cfg: &SyncConfig) -> RefreshStep {
        // Frame interval from consecutive PTS values. Container quirks
        // can make PTS repeat or jump backwards; fall back to the last
        // good interval when the delta is unusable.
        let mut delay = if self.last_frame_pts == 0.0 {
            0.0
        } else {
            pts - self.last_frame_pts
        };
        if delay <= 0.0 || delay >= 1.0 {
            delay = self.last_frame_delay;
        }
        self.last_frame_delay = delay;
        self.last_frame_pts = pts;

        let diff = pts - master_clock;
        // Low frame rates get a wider tolerance band, high frame rates
        // a tighter one.
        let sync_threshold = delay.clamp(cfg.min_sync_threshold, cfg.max_sync_threshold);

        // diff is NaN when the audio clock is marked unavailable, and
        // wildly large when the timestamps are not comparable at all.
        // Either way, no correction this refresh.
        if diff.is_finite() && diff.abs() < cfg.no_sync_threshold {
            if diff <= -sync_threshold {
                return RefreshStep::Drop;
            }
            if diff >= sync_threshold {
                delay *= 2.0;
            }
        }

        self.frame_timer += delay;
        let mut actual_delay = self.frame_timer - now;
        if actual_delay < cfg.min_refresh_delay {
            actual_delay = cfg.min_refresh_delay;
        }
        RefreshStep::Present {
            delay_ms: (actual_delay * 1000.0 + 0.5) as u32,
        }
    }
}
