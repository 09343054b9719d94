//! Playback supervisor
//!
//! The `Player` owns every stage of the pipeline: the demuxer, the
//! packet queues, the frame ring, the decoders, the audio device and
//! the video sink. `run()` spawns the reader and video decode threads,
//! unpauses audio and then drives the presenter from the SDL event
//! loop via a refresh timer. Shutdown closes all queues (waking every
//! blocked worker), joins the threads and releases resources in
//! reverse construction order.

use crate::audio::AudioOutput;
use crate::media::{MediaSource, Reader, VideoDecodeStage, VideoSlot};
use crate::queue::{FrameRing, PacketQueue};
use crate::renderer::VideoRenderer;
use crate::sync::{Clock, RefreshStep, VideoSyncState};
use crate::utils::config::Config;
use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use crossbeam_channel::Sender;
use ffmpeg_next as ffmpeg;
use log::{error, info};
use sdl2::event::Event;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Delay before the presenter's very first tick.
const WARMUP_DELAY_MS: u32 = 40;

/// Retry interval while no video stream is bound (audio-only files).
const NO_VIDEO_RETRY_MS: u32 = 100;

/// Custom SDL user event pushed by the refresh timer thread.
struct RefreshTick;

/// Player lifecycle. `Opening` can fail straight into `Stopped`;
/// `Running -> Draining` happens on end-of-stream or user quit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninit,
    Opening,
    Running,
    Draining,
    Stopped,
}

pub struct Player {
    config: Config,
    state: LifecycleState,
    /// Zero point of the monotonic clock used by the presenter.
    started: Instant,

    stop: Arc<AtomicBool>,
    audio_clock: Arc<Clock>,
    video_clock: Arc<Clock>,
    /// Raised by the audio pump once its queue is finished and the
    /// residual buffer has drained.
    audio_finished: Arc<AtomicBool>,

    video_packets: Option<Arc<PacketQueue<ffmpeg::Packet>>>,
    audio_packets: Option<Arc<PacketQueue<ffmpeg::Packet>>>,
    frames: Option<Arc<FrameRing<VideoSlot>>>,

    // Staged until `run()` moves them onto their threads.
    source: Option<MediaSource>,
    video_stage: Option<VideoDecodeStage>,

    sync: VideoSyncState,

    reader_thread: Option<JoinHandle<()>>,
    video_thread: Option<JoinHandle<()>>,
    timer_thread: Option<JoinHandle<()>>,
    refresh_tx: Option<Sender<u32>>,

    // Release order matters: the audio device (and the decoder inside
    // its callback) goes before the renderer, which goes before the
    // SDL context handles below it.
    audio_output: Option<AudioOutput>,
    renderer: VideoRenderer,
    event_subsystem: sdl2::EventSubsystem,
    sdl: sdl2::Sdl,
}

impl Player {
    /// Open the container, bind streams, open decoders and the audio
    /// device, and allocate the queues. Any failure here tears down
    /// everything acquired so far (all handles are owned).
    pub fn new(path: &Path, config: Config) -> Result<Self> {
        ffmpeg::init().decode_err("initializing ffmpeg")?;
        ffmpeg::log::set_level(ffmpeg::log::Level::Warning);

        let sdl = sdl2::init().video_err("initializing SDL")?;
        let video_subsystem = sdl.video().video_err("initializing video subsystem")?;
        let audio_subsystem = sdl.audio().audio_err("initializing audio subsystem")?;
        let event_subsystem = sdl.event().video_err("initializing event subsystem")?;
        let renderer = VideoRenderer::new(&video_subsystem, &config.window)?;

        let source = MediaSource::open(path)?;

        let started = Instant::now();
        let stop = Arc::new(AtomicBool::new(false));
        let audio_clock = Arc::new(Clock::new());
        let video_clock = Arc::new(Clock::new());
        let audio_finished = Arc::new(AtomicBool::new(false));

        let mut video_packets = None;
        let mut frames = None;
        let mut video_stage = None;
        if let Some(binding) = &source.video {
            let context = ffmpeg::codec::context::Context::from_parameters(binding.parameters.clone())?;
            let decoder = context.decoder().video()?;
            info!(
                "video decoder opened: {}x{} @ {:.3} fps",
                decoder.width(),
                decoder.height(),
                binding.frame_rate
            );

            let queue = Arc::new(PacketQueue::new(config.playback.packet_queue_bytes));
            let ring = Arc::new(FrameRing::new(config.playback.frame_ring_capacity));
            video_stage = Some(VideoDecodeStage::new(
                decoder,
                binding,
                Arc::clone(&queue),
                Arc::clone(&ring),
                Arc::clone(&video_clock),
                Arc::clone(&stop),
            ));
            video_packets = Some(queue);
            frames = Some(ring);
        }

        let mut audio_packets = None;
        let mut audio_output = None;
        if let Some(binding) = &source.audio {
            let context = ffmpeg::codec::context::Context::from_parameters(binding.parameters.clone())?;
            let decoder = context.decoder().audio()?;
            info!(
                "audio decoder opened: {} Hz, {} channels",
                decoder.rate(),
                decoder.channels()
            );

            let queue = Arc::new(PacketQueue::new(config.playback.packet_queue_bytes));
            audio_output = Some(AudioOutput::open(
                &audio_subsystem,
                decoder,
                binding.time_base,
                Arc::clone(&queue),
                Arc::clone(&audio_clock),
                Arc::clone(&audio_finished),
                Arc::clone(&stop),
                config.audio.device_samples,
            )?);
            audio_packets = Some(queue);
        }

        let sync = VideoSyncState::new(started.elapsed().as_secs_f64());

        Ok(Self {
            config,
            state: LifecycleState::Opening,
            started,
            stop,
            audio_clock,
            video_clock,
            audio_finished,
            video_packets,
            audio_packets,
            frames,
            source: Some(source),
            video_stage,
            sync,
            reader_thread: None,
            video_thread: None,
            timer_thread: None,
            refresh_tx: None,
            audio_output,
            renderer,
            event_subsystem,
            sdl,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Spawn the pipeline threads and block on the event loop until
    /// playback ends or the user quits. Returns once the player is
    /// fully stopped.
    pub fn run(&mut self) -> Result<()> {
        self.event_subsystem
            .register_custom_event::<RefreshTick>()
            .video_err("registering refresh event")?;

        // One timer thread converts "refresh in N ms" requests into
        // user events on the SDL queue; dropping the sender stops it.
        let (refresh_tx, refresh_rx) = crossbeam_channel::unbounded::<u32>();
        let sender = self.event_subsystem.event_sender();
        self.timer_thread = Some(
            thread::Builder::new()
                .name("refresh-timer".to_string())
                .spawn(move || {
                    while let Ok(delay_ms) = refresh_rx.recv() {
                        if delay_ms > 0 {
                            thread::sleep(Duration::from_millis(u64::from(delay_ms)));
                        }
                        if sender.push_custom_event(RefreshTick).is_err() {
                            break;
                        }
                    }
                })
                .map_err(PlayerError::FileIO)?,
        );
        self.refresh_tx = Some(refresh_tx);

        let MediaSource { input, video, audio } = self
            .source
            .take()
            .ok_or_else(|| PlayerError::InvalidInput("player already ran".to_string()))?;
        let video_route = video.as_ref().map(|b| b.index).zip(self.video_packets.clone());
        let audio_route = audio.as_ref().map(|b| b.index).zip(self.audio_packets.clone());
        // The bindings hold codec parameters tied to the demuxer's
        // ownership; release them on this thread before the input
        // context moves to the reader thread.
        drop(video);
        drop(audio);

        let reader = Reader::new(
            input,
            video_route,
            audio_route,
            self.config.playback.packet_queue_bytes,
            Arc::clone(&self.stop),
        );
        self.reader_thread = Some(
            thread::Builder::new()
                .name("reader".to_string())
                .spawn(move || reader.run())
                .map_err(PlayerError::FileIO)?,
        );

        if let Some(stage) = self.video_stage.take() {
            self.video_thread = Some(
                thread::Builder::new()
                    .name("video-decode".to_string())
                    .spawn(move || stage.run())
                    .map_err(PlayerError::FileIO)?,
            );
        }

        if let Some(audio) = &self.audio_output {
            audio.resume();
        }

        self.state = LifecycleState::Running;
        info!("playback started");
        self.schedule_refresh(WARMUP_DELAY_MS);

        let mut events = self.sdl.event_pump().video_err("creating event pump")?;
        loop {
            let event = events.wait_event();
            if event.is_user_event() {
                if event.as_user_event_type::<RefreshTick>().is_some() {
                    self.video_refresh();
                }
                continue;
            }
            match event {
                Event::Quit { .. } => {
                    info!("quit requested");
                    break;
                }
                _ => {}
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Presenter tick: decide what to do with the frame at the head of
    /// the ring and schedule the next tick.
    fn video_refresh(&mut self) {
        if self.stop.load(Ordering::Relaxed) {
            return;
        }

        let Some(frames) = self.frames.clone() else {
            // Audio-only file: the ring never exists. Poll until the
            // audio path reports it has drained, then quit cleanly.
            if self.audio_finished.load(Ordering::Relaxed) {
                info!("audio stream drained");
                self.request_quit();
            } else {
                self.schedule_refresh(NO_VIDEO_RETRY_MS);
            }
            return;
        };

        let master_clock = self.master_clock();
        let now = self.started.elapsed().as_secs_f64();

        let pts = {
            let Some(slot) = frames.peek_readable() else {
                // Ring closed and empty: every decoded frame has been
                // presented.
                info!("all video frames presented");
                self.request_quit();
                return;
            };
            slot.pts
        };

        match self.sync.advance(pts, master_clock, now, &self.config.sync) {
            RefreshStep::Drop => {
                // Late frame: discard without rendering and catch up on
                // the next tick.
                frames.advance_read();
                self.schedule_refresh(0);
            }
            RefreshStep::Present { delay_ms } => {
                self.schedule_refresh(delay_ms);
                if let Some(slot) = frames.peek_readable() {
                    if let Err(e) = self.renderer.render(&slot) {
                        error!("frame render failed: {}", e);
                    }
                }
                frames.advance_read();
            }
        }
    }

    /// Audio clock when an audio stream is bound, video clock otherwise.
    fn master_clock(&self) -> f64 {
        if self.audio_packets.is_some() {
            self.audio_clock.get()
        } else {
            self.video_clock.get()
        }
    }

    fn schedule_refresh(&self, delay_ms: u32) {
        if let Some(tx) = &self.refresh_tx {
            let _ = tx.send(delay_ms);
        }
    }

    fn request_quit(&mut self) {
        self.state = LifecycleState::Draining;
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.event_subsystem.push_event(Event::Quit { timestamp: 0 });
    }

    /// Retire every stage: set the stop flag, close all queues to wake
    /// blocked workers, join the threads, then silence the device.
    fn shutdown(&mut self) {
        if self.state == LifecycleState::Stopped {
            return;
        }
        self.state = LifecycleState::Draining;
        self.stop.store(true, Ordering::Relaxed);

        if let Some(queue) = &self.video_packets {
            queue.close();
        }
        if let Some(queue) = &self.audio_packets {
            queue.close();
        }
        if let Some(ring) = &self.frames {
            ring.close();
        }

        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.video_thread.take() {
            let _ = handle.join();
        }

        // Dropping the sender ends the timer thread's receive loop.
        self.refresh_tx = None;
        if let Some(handle) = self.timer_thread.take() {
            let _ = handle.join();
        }

        if let Some(audio) = self.audio_output.take() {
            audio.pause();
        }

        self.state = LifecycleState::Stopped;
        info!("player stopped");
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shutdown();
    }
}
