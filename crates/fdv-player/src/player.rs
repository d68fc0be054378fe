//! Playback session controller.
//!
//! Owns exactly one decoder session, the frame buffer pool sized from its
//! capability metadata, the trigger loop, and the presentation target.
//! Lifecycle is driven by explicit events (`on_activate`, focus changes,
//! `on_teardown`) rather than per-tick polling.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use fdv_bridge::{
    open_source, BridgeError, OutOfRangeMode, SessionInfo, Source, SourceDescriptor,
    TextureEncoding,
};

use crate::pool::{FramePool, SlotSpec};
use crate::present::{MeshFrame, PresentationSpec, PresentationTarget};
use crate::scheduler::{tick_interval, DeliveryState, SequenceTicker, SharedSession};
use crate::stats::{PlaybackStats, RateStats};

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("no source configured")]
    NoSource,
    #[error("player is not initialized")]
    NotInitialized,
    #[error("preview requires a file source")]
    PreviewUnsupported,
}

/// Outward notifications, delivered through a polled channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// A new frame was handed to the presentation layer.
    NewModel,
    /// Opening the configured source failed.
    ModelNotFound,
    /// Playback position left the active frame range.
    OutOfRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub source: Option<SourceDescriptor>,
    pub auto_play: bool,
    pub out_of_range_mode: OutOfRangeMode,
    pub compute_normals: bool,
    /// Decoder-side read-ahead, pushed to the session at initialization.
    pub buffer_mode: bool,
    pub buffer_size: i32,
    /// Pool slots and presentation resource sets. Forced to 1 for preview.
    pub buffer_count: usize,
    pub preview_frame: i32,
    /// Enables decode/update rate telemetry.
    pub diagnostics: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            source: None,
            auto_play: true,
            out_of_range_mode: OutOfRangeMode::Loop,
            compute_normals: false,
            buffer_mode: true,
            buffer_size: 10,
            buffer_count: 2,
            preview_frame: 0,
            diagnostics: false,
        }
    }
}

struct ActiveSession {
    info: SessionInfo,
    delivery: DeliveryState,
    ticker: SequenceTicker,
    present_index: usize,
    presentation_buffers: usize,
}

pub struct Player {
    config: PlayerConfig,
    target: Box<dyn PresentationTarget>,
    active: Option<ActiveSession>,
    events_tx: Sender<PlayerEvent>,
    events_rx: Receiver<PlayerEvent>,
    /// Whether the trigger loop is running. Distinct from the transport
    /// flag: a focus loss suspends the trigger without pausing transport.
    trigger_active: bool,
    preview_mode: bool,
    /// Frame count kept across uninitialize (preview inspects it after).
    cached_frame_count: u32,
}

impl Player {
    pub fn new(config: PlayerConfig, target: Box<dyn PresentationTarget>) -> Self {
        let (events_tx, events_rx) = unbounded();
        Player {
            config,
            target,
            active: None,
            events_tx,
            events_rx,
            trigger_active: false,
            preview_mode: false,
            cached_frame_count: 0,
        }
    }

    /// Open the configured source and bring the session up. Idempotent.
    pub fn initialize(&mut self) -> Result<(), PlayerError> {
        if self.active.is_some() {
            return Ok(());
        }
        let desc = self.config.source.clone().ok_or(PlayerError::NoSource)?;
        match open_source(&desc, self.config.out_of_range_mode) {
            Ok(source) => self.initialize_with(source),
            Err(err) => {
                warn!(%err, "failed to open source");
                let _ = self.events_tx.send(PlayerEvent::ModelNotFound);
                Err(err.into())
            }
        }
    }

    /// Bring the session up from an already-open source. Used by
    /// `initialize` and by tests injecting a scripted session.
    pub fn initialize_with(&mut self, source: Source) -> Result<(), PlayerError> {
        if self.active.is_some() {
            return Ok(());
        }
        let Source { mut session, info } = source;
        session.set_compute_normals(self.config.compute_normals);
        session.set_buffering(self.config.buffer_mode, self.config.buffer_size);

        let slot_count = if self.preview_mode {
            1
        } else {
            self.config.buffer_count.max(2)
        };
        let spec = SlotSpec::from_info(&info, self.config.compute_normals);
        let pool = Arc::new(FramePool::new(&spec, slot_count));
        self.target.allocate(&PresentationSpec {
            buffer_count: slot_count,
            texture_size: info.texture_size,
            texture_encoding: info.texture_encoding,
            vertex_capacity: spec.vertex_capacity,
            index_capacity: spec.index_capacity,
        });

        let session: SharedSession = Arc::new(Mutex::new(session));
        let delivery = DeliveryState {
            session,
            pool,
            playing: Arc::new(AtomicBool::new(false)),
            new_frame: Arc::new(AtomicBool::new(false)),
            clear_requested: Arc::new(AtomicBool::new(false)),
            last_frame_id: Arc::new(AtomicI32::new(-1)),
            compute_normals: Arc::new(AtomicBool::new(self.config.compute_normals)),
            vertex_capacity: spec.vertex_capacity,
            out_of_range_mode: Arc::new(Mutex::new(self.config.out_of_range_mode)),
            events: self.events_tx.clone(),
            stats: Arc::new(Mutex::new(RateStats::default())),
            diagnostics: self.config.diagnostics,
        };
        let ticker = SequenceTicker::spawn(tick_interval(info.frame_rate), delivery.clone());

        self.cached_frame_count = info.frame_count;
        self.active = Some(ActiveSession {
            info,
            delivery,
            ticker,
            present_index: 0,
            presentation_buffers: slot_count,
        });
        info!(
            frame_rate = info.frame_rate,
            frames = info.frame_count,
            slots = slot_count,
            "session initialized"
        );

        if self.config.auto_play {
            self.play(true);
        }
        Ok(())
    }

    /// Start or stop playback. Both directions are idempotent. Stopping is
    /// synchronous: no decode attempt is pending once this returns.
    pub fn play(&mut self, on: bool) {
        let Some(active) = self.active.as_ref() else {
            warn!("play called before initialize");
            return;
        };
        if on {
            if self.trigger_active && active.delivery.playing.load(Ordering::SeqCst) {
                return;
            }
            active.delivery.session.lock().set_playing(true);
            active.delivery.playing.store(true, Ordering::SeqCst);
            active.ticker.start();
            self.trigger_active = true;
        } else {
            active.delivery.playing.store(false, Ordering::SeqCst);
            if !self.trigger_active {
                return;
            }
            active.delivery.session.lock().set_playing(false);
            active.ticker.stop();
            self.trigger_active = false;
        }
    }

    /// Seek. Always pauses transport, then forces one immediate delivery
    /// attempt. The frame is not range-checked here; the decoder clamps.
    pub fn goto_frame(&mut self, frame: i32) -> Result<(), PlayerError> {
        {
            let active = self.active.as_ref().ok_or(PlayerError::NotInitialized)?;
            active.delivery.session.lock().seek(frame);
            active.delivery.playing.store(false, Ordering::SeqCst);
            active.ticker.stop();
            active.delivery.run();
        }
        self.trigger_active = false;
        Ok(())
    }

    /// Presentation handoff; call once per host render tick. Consumes the
    /// new-frame flag at most once and uploads the read slot.
    pub fn update(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.delivery.clear_requested.swap(false, Ordering::SeqCst) {
            self.target.clear_mesh();
        }
        if !active.delivery.new_frame.swap(false, Ordering::SeqCst) {
            return;
        }
        {
            let slot = active.delivery.pool.read_slot();
            if slot.triangle_count == 0 {
                // An empty triangle set presents as a cleared mesh.
                self.target.clear_mesh();
            } else {
                let frame = MeshFrame::from_slot(&slot);
                self.target.upload(active.present_index, &frame);
                self.target.update_collision(&frame);
            }
        }
        active.present_index = (active.present_index + 1) % active.presentation_buffers;
        if active.delivery.diagnostics {
            active.delivery.stats.lock().record_update();
        }
        let _ = self.events_tx.send(PlayerEvent::NewModel);
    }

    /// Tear the session down. Ordering is mandatory: trigger loop first,
    /// then the decoder session, then the pinned buffers it wrote into,
    /// then the presentation resources (kept alive during preview).
    /// No-op when already uninitialized.
    pub fn uninitialize(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let ActiveSession {
            delivery,
            mut ticker,
            ..
        } = active;
        ticker.shutdown();
        let DeliveryState { session, pool, .. } = delivery;
        drop(session);
        drop(pool);
        self.trigger_active = false;
        if !self.preview_mode {
            self.target.release();
        }
        info!("session released");
    }

    /// Decode a single frame for inspection without committing to playback.
    /// Presentation resources survive the teardown and keep the frame.
    pub fn preview(&mut self) -> Result<(), PlayerError> {
        match self.config.source {
            Some(SourceDescriptor::Files { .. }) => {}
            Some(SourceDescriptor::Network { .. }) => return Err(PlayerError::PreviewUnsupported),
            None => return Err(PlayerError::NoSource),
        }
        let saved_auto_play = self.config.auto_play;
        let saved_buffer_count = self.config.buffer_count;
        let saved_buffer_mode = self.config.buffer_mode;
        let saved_diagnostics = self.config.diagnostics;
        self.config.auto_play = false;
        self.config.buffer_count = 1;
        self.config.buffer_mode = false;
        self.config.diagnostics = false;
        self.preview_mode = true;

        self.uninitialize();
        let result = self.initialize().and_then(|()| {
            self.goto_frame(self.config.preview_frame)?;
            self.update();
            Ok(())
        });
        self.uninitialize();

        self.preview_mode = false;
        self.config.auto_play = saved_auto_play;
        self.config.buffer_count = saved_buffer_count;
        self.config.buffer_mode = saved_buffer_mode;
        self.config.diagnostics = saved_diagnostics;
        result
    }

    // Lifecycle events.

    /// The host activated this session; initialize when a source is
    /// configured. Call again to retry after a `ModelNotFound`.
    pub fn on_activate(&mut self) -> Result<(), PlayerError> {
        if self.active.is_some() || self.config.source.is_none() {
            return Ok(());
        }
        self.initialize()
    }

    /// Suspend or resume the trigger loop with host focus, leaving the
    /// transport flag untouched so playback resumes where it paused.
    pub fn on_focus_changed(&mut self, focused: bool) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let transport_playing = active.delivery.playing.load(Ordering::SeqCst);
        if focused {
            if transport_playing && !self.trigger_active {
                active.delivery.session.lock().set_playing(true);
                active.ticker.start();
                self.trigger_active = true;
            }
        } else if self.trigger_active {
            active.delivery.session.lock().set_playing(false);
            active.ticker.stop();
            self.trigger_active = false;
        }
    }

    pub fn on_teardown(&mut self) {
        self.uninitialize();
    }

    // Configuration.

    pub fn set_out_of_range_mode(&mut self, mode: OutOfRangeMode) {
        self.config.out_of_range_mode = mode;
        if let Some(active) = self.active.as_ref() {
            active.delivery.session.lock().set_out_of_range_mode(mode);
            *active.delivery.out_of_range_mode.lock() = mode;
        }
    }

    /// Enabling after initialization allocates the normal arrays lazily on
    /// the next delivery.
    pub fn set_compute_normals(&mut self, enabled: bool) {
        self.config.compute_normals = enabled;
        if let Some(active) = self.active.as_ref() {
            active.delivery.session.lock().set_compute_normals(enabled);
            active
                .delivery
                .compute_normals
                .store(enabled, Ordering::SeqCst);
        }
    }

    // Transport properties.

    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.active
            .as_ref()
            .map(|a| a.delivery.playing.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Last frame id delivered by the decoder, 0 before any delivery.
    pub fn current_frame(&self) -> i32 {
        self.active
            .as_ref()
            .map(|a| a.delivery.last_frame_id.load(Ordering::SeqCst).max(0))
            .unwrap_or(0)
    }

    pub fn frame_rate(&self) -> f32 {
        self.active.as_ref().map(|a| a.info.frame_rate).unwrap_or(0.0)
    }

    pub fn frame_count(&self) -> u32 {
        self.active
            .as_ref()
            .map(|a| a.info.frame_count)
            .unwrap_or(self.cached_frame_count)
    }

    pub fn texture_encoding(&self) -> Option<TextureEncoding> {
        self.active.as_ref().map(|a| a.info.texture_encoding)
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.active.as_ref().map(|a| a.info)
    }

    pub fn first_active_frame(&self) -> i32 {
        match &self.config.source {
            Some(SourceDescriptor::Files { active_range, .. }) => active_range.0.max(0),
            _ => 0,
        }
    }

    /// Resolved end of the active range; the -1 sentinel maps to the last
    /// sequence frame once the count is known.
    pub fn last_active_frame(&self) -> i32 {
        let raw = match &self.config.source {
            Some(SourceDescriptor::Files { active_range, .. }) => active_range.1,
            _ => -1,
        };
        if raw >= 0 {
            raw
        } else {
            self.frame_count() as i32 - 1
        }
    }

    pub fn active_frame_count(&self) -> i32 {
        self.last_active_frame() - self.first_active_frame() + 1
    }

    pub fn stats(&self) -> PlaybackStats {
        self.active
            .as_ref()
            .map(|a| a.delivery.stats.lock().snapshot())
            .unwrap_or_default()
    }

    pub fn events(&self) -> &Receiver<PlayerEvent> {
        &self.events_rx
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.uninitialize();
    }
}
