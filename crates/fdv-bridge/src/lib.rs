//! Gateway to the native volumetric ("4D") sequence decoder.
//!
//! The decoding, buffering and streaming engine is a closed-source native
//! library; this crate declares its call contract, wraps one open decoder
//! session in a safe RAII type, and exposes the trait the player programs
//! against. A synthetic stub backend stands in when the vendor library is
//! not linked (feature `native` disabled).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[cfg(feature = "native")]
mod ffi;
#[cfg(feature = "native")]
mod native;
mod stub;

#[cfg(feature = "native")]
pub use native::NativeSession;
pub use stub::{StubConfig, StubSession};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("source not found: {0}")]
    SourceNotFound(String),
    #[error("invalid source path: {0}")]
    InvalidPath(String),
}

/// Behavior when the playback position leaves the active frame range.
/// Discriminants match the native enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum OutOfRangeMode {
    Loop = 0,
    Reverse = 1,
    Stop = 2,
    Hide = 3,
}

impl Default for OutOfRangeMode {
    fn default() -> Self {
        OutOfRangeMode::Loop
    }
}

/// Texture payload encoding reported by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureEncoding {
    Dxt1,
    PvrtcRgb2,
    PvrtcRgb4,
    EtcRgb4,
    AstcRgba8x8,
}

impl TextureEncoding {
    /// Map the raw code from the native layer. Unknown codes fall back to
    /// DXT1, the desktop default.
    pub fn from_raw(code: i32) -> Self {
        match code {
            1 => TextureEncoding::Dxt1,
            4 => TextureEncoding::PvrtcRgb2,
            5 => TextureEncoding::EtcRgb4,
            6 => TextureEncoding::PvrtcRgb4,
            8 => TextureEncoding::AstcRgba8x8,
            _ => TextureEncoding::Dxt1,
        }
    }
}

/// Vertex position or normal handed to the native layer by address.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Texture coordinate handed to the native layer by address.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vec2 {
    pub u: f32,
    pub v: f32,
}

/// Mutable views over one frame slot's buffers, filled in place by the
/// decoder. The backing memory must stay at a stable address for the
/// duration of the call.
pub struct FrameBuffersMut<'a> {
    pub vertices: &'a mut [Vec3],
    pub uvs: &'a mut [Vec2],
    pub normals: Option<&'a mut [Vec3]>,
    pub triangles: &'a mut [u32],
    pub texture: &'a mut [u8],
}

/// Result of one decode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    NewFrame {
        frame_id: i32,
        vertex_count: usize,
        triangle_count: usize,
    },
    /// Nothing newer than the frame id that was passed in. The buffers were
    /// left untouched.
    NoNewFrame,
}

/// Where a decoder session is bound: a sequence on disk or a network
/// streaming endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceDescriptor {
    Files {
        path: PathBuf,
        /// Active playback range; `-1` for the end means "full sequence".
        active_range: (i32, i32),
    },
    Network {
        host: String,
        port: u16,
    },
}

/// One open decoder session. Closing happens exactly once, on drop.
pub trait DecoderSession: Send {
    fn set_playing(&mut self, on: bool);

    /// Pull the next decoded frame into `bufs`, given the last frame id that
    /// was delivered. Must never be invoked concurrently with itself.
    fn decode_frame(&mut self, bufs: FrameBuffersMut<'_>, last_frame_id: i32) -> DecodeOutcome;

    /// Edge-triggered: returns true once per out-of-range crossing.
    fn out_of_range_event(&mut self) -> bool;

    // Capability metadata. Zero means "unknown, apply the documented default".
    fn texture_size(&self) -> i32;
    fn texture_encoding(&self) -> i32;
    fn max_vertices(&self) -> i32;
    fn max_triangles(&self) -> i32;
    fn frame_rate(&self) -> f32;
    fn frame_count(&self) -> i32;
    fn current_frame(&self) -> i32;

    /// Also stops playback, as a decoder-side effect.
    fn seek(&mut self, frame: i32);

    fn set_out_of_range_mode(&mut self, mode: OutOfRangeMode);
    fn set_buffering(&mut self, enabled: bool, size: i32);
    fn set_compute_normals(&mut self, enabled: bool);
}

/// Capability metadata for an open session, with defaults applied so buffer
/// sizing never starts from zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionInfo {
    pub texture_size: u32,
    pub texture_encoding: TextureEncoding,
    pub max_vertices: u32,
    pub max_triangles: u32,
    pub frame_rate: f32,
    pub frame_count: u32,
}

pub const DEFAULT_TEXTURE_SIZE: u32 = 1024;
pub const DEFAULT_MAX_VERTICES: u32 = 65535;
pub const DEFAULT_MAX_TRIANGLES: u32 = 65535;

impl SessionInfo {
    pub fn query(session: &dyn DecoderSession) -> Self {
        let texture_size = match session.texture_size() {
            s if s > 0 => s as u32,
            _ => DEFAULT_TEXTURE_SIZE,
        };
        let max_vertices = match session.max_vertices() {
            v if v > 0 => v as u32,
            _ => DEFAULT_MAX_VERTICES,
        };
        let max_triangles = match session.max_triangles() {
            t if t > 0 => t as u32,
            _ => DEFAULT_MAX_TRIANGLES,
        };
        let info = SessionInfo {
            texture_size,
            texture_encoding: TextureEncoding::from_raw(session.texture_encoding()),
            max_vertices,
            max_triangles,
            frame_rate: session.frame_rate(),
            frame_count: session.frame_count().max(0) as u32,
        };
        debug!(?info, "queried session capabilities");
        info
    }
}

/// An open session coupled with its capability metadata.
pub struct Source {
    pub session: Box<dyn DecoderSession>,
    pub info: SessionInfo,
}

impl Source {
    pub fn new(session: Box<dyn DecoderSession>) -> Self {
        let info = SessionInfo::query(session.as_ref());
        Source { session, info }
    }
}

/// Open a decoder session for the given descriptor. Uses the vendor library
/// when the `native` feature is enabled, otherwise the synthetic stub.
pub fn open_source(
    desc: &SourceDescriptor,
    mode: OutOfRangeMode,
) -> Result<Source, BridgeError> {
    #[cfg(feature = "native")]
    {
        let session: Box<dyn DecoderSession> = match desc {
            SourceDescriptor::Files { path, active_range } => {
                Box::new(NativeSession::open_file(path, *active_range, mode)?)
            }
            SourceDescriptor::Network { host, port } => {
                Box::new(NativeSession::open_network(host, *port)?)
            }
        };
        Ok(Source::new(session))
    }

    #[cfg(not(feature = "native"))]
    {
        let session: Box<dyn DecoderSession> = Box::new(stub::open_stub(desc, mode)?);
        Ok(Source::new(session))
    }
}

/// Whether this build links the vendor decoder.
pub fn is_native_backend() -> bool {
    cfg!(feature = "native")
}
