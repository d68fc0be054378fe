//! Volumetric sequence playback: buffer pool, trigger loop and session
//! controller over the `fdv-bridge` decoder gateway.

pub mod player;
pub mod pool;
pub mod present;
pub mod scheduler;
pub mod stats;

pub use player::{Player, PlayerConfig, PlayerError, PlayerEvent};
pub use pool::{FramePool, FrameSlot, PinnedBuffer, SlotSpec, VERTEX_CEILING};
pub use present::{HeadlessPresentation, MeshFrame, PresentationSpec, PresentationTarget};
pub use scheduler::{tick_interval, MIN_TICK_INTERVAL, TRIGGER_RATE_FACTOR};
pub use stats::PlaybackStats;

pub use fdv_bridge::{
    open_source, BridgeError, DecodeOutcome, DecoderSession, FrameBuffersMut, OutOfRangeMode,
    SessionInfo, Source, SourceDescriptor, StubConfig, StubSession, TextureEncoding, Vec2, Vec3,
};
