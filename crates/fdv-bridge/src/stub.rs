//! Synthetic in-process decoder session.
//!
//! Stands in for the vendor library when it is not linked: deterministic
//! geometry, honoring play/seek/out-of-range semantics, so the player and
//! the CLI can run headless and tests stay hermetic.

use tracing::info;

use crate::{
    BridgeError, DecodeOutcome, DecoderSession, FrameBuffersMut, OutOfRangeMode, SourceDescriptor,
};

#[derive(Debug, Clone)]
pub struct StubConfig {
    pub frame_count: i32,
    pub frame_rate: f32,
    pub texture_size: i32,
    pub texture_encoding: i32,
    pub max_vertices: i32,
    pub max_triangles: i32,
    pub active_range: (i32, i32),
    pub out_of_range_mode: OutOfRangeMode,
}

impl Default for StubConfig {
    fn default() -> Self {
        StubConfig {
            frame_count: 120,
            frame_rate: 30.0,
            texture_size: 256,
            texture_encoding: 1,
            max_vertices: 1024,
            max_triangles: 1024,
            active_range: (0, -1),
            out_of_range_mode: OutOfRangeMode::Loop,
        }
    }
}

pub struct StubSession {
    config: StubConfig,
    mode: OutOfRangeMode,
    playing: bool,
    /// Next frame to emit while playing.
    cursor: i32,
    direction: i32,
    /// Frame forced by a seek, emitted on the next decode even when paused.
    pending: Option<i32>,
    out_of_range: bool,
}

impl StubSession {
    pub fn new(config: StubConfig) -> Self {
        let mode = config.out_of_range_mode;
        let mut session = StubSession {
            config,
            mode,
            playing: false,
            cursor: 0,
            direction: 1,
            pending: None,
            out_of_range: false,
        };
        session.cursor = session.first_frame();
        session
    }

    // Range accessors normalize degenerate configs instead of failing:
    // first <= last always holds, even for an inverted range or an empty
    // sequence.
    fn last_frame(&self) -> i32 {
        let end = (self.config.frame_count - 1).max(0);
        let last = self.config.active_range.1;
        if last < 0 {
            end
        } else {
            last.min(end)
        }
    }

    fn first_frame(&self) -> i32 {
        self.config.active_range.0.clamp(0, self.last_frame())
    }

    fn advance(&mut self) {
        let first = self.first_frame();
        let last = self.last_frame();
        let next = self.cursor + self.direction;
        if next >= first && next <= last {
            self.cursor = next;
            return;
        }
        self.out_of_range = true;
        match self.mode {
            OutOfRangeMode::Loop => {
                self.cursor = if self.direction > 0 { first } else { last };
            }
            OutOfRangeMode::Reverse => {
                self.direction = -self.direction;
                self.cursor = (self.cursor + self.direction).clamp(first, last);
            }
            OutOfRangeMode::Stop | OutOfRangeMode::Hide => {
                self.cursor = self.cursor.clamp(first, last);
                self.playing = false;
            }
        }
    }

    fn write_frame(&self, frame: i32, bufs: FrameBuffersMut<'_>) -> (usize, usize) {
        // A quad sliding along z with the frame index, one byte pattern per
        // frame in the texture payload.
        let z = frame as f32;
        let vertex_count = bufs.vertices.len().min(4);
        let positions = [
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 1.0),
        ];
        for (i, &(x, y)) in positions.iter().take(vertex_count).enumerate() {
            bufs.vertices[i] = crate::Vec3 { x, y, z };
            bufs.uvs[i] = crate::Vec2 { u: x, v: y };
        }
        if let Some(normals) = bufs.normals {
            for n in normals.iter_mut().take(vertex_count) {
                *n = crate::Vec3 { x: 0.0, y: 0.0, z: 1.0 };
            }
        }
        let indices = [0u32, 1, 2, 0, 2, 3];
        // Emit only triangles whose indices fit the written vertices.
        let fitting = match vertex_count {
            0..=2 => 0,
            3 => 1,
            _ => 2,
        };
        let triangle_count = (bufs.triangles.len() / 3).min(fitting);
        bufs.triangles[..triangle_count * 3].copy_from_slice(&indices[..triangle_count * 3]);
        for byte in bufs.texture.iter_mut() {
            *byte = (frame & 0xff) as u8;
        }
        (vertex_count, triangle_count)
    }
}

impl DecoderSession for StubSession {
    fn set_playing(&mut self, on: bool) {
        self.playing = on;
    }

    fn decode_frame(&mut self, bufs: FrameBuffersMut<'_>, last_frame_id: i32) -> DecodeOutcome {
        let frame = match self.pending.take() {
            Some(frame) => Some(frame),
            None if self.playing => {
                let frame = self.cursor;
                self.advance();
                Some(frame)
            }
            None => None,
        };
        match frame {
            Some(frame) if frame != last_frame_id => {
                let (vertex_count, triangle_count) = self.write_frame(frame, bufs);
                DecodeOutcome::NewFrame {
                    frame_id: frame,
                    vertex_count,
                    triangle_count,
                }
            }
            _ => DecodeOutcome::NoNewFrame,
        }
    }

    fn out_of_range_event(&mut self) -> bool {
        std::mem::take(&mut self.out_of_range)
    }

    fn texture_size(&self) -> i32 {
        self.config.texture_size
    }

    fn texture_encoding(&self) -> i32 {
        self.config.texture_encoding
    }

    fn max_vertices(&self) -> i32 {
        self.config.max_vertices
    }

    fn max_triangles(&self) -> i32 {
        self.config.max_triangles
    }

    fn frame_rate(&self) -> f32 {
        self.config.frame_rate
    }

    fn frame_count(&self) -> i32 {
        self.config.frame_count
    }

    fn current_frame(&self) -> i32 {
        self.cursor
    }

    fn seek(&mut self, frame: i32) {
        let clamped = frame.clamp(0, (self.config.frame_count - 1).max(0));
        self.cursor = clamped;
        self.pending = Some(clamped);
        self.playing = false;
    }

    fn set_out_of_range_mode(&mut self, mode: OutOfRangeMode) {
        self.mode = mode;
    }

    fn set_buffering(&mut self, _enabled: bool, _size: i32) {}

    fn set_compute_normals(&mut self, _enabled: bool) {}
}

pub(crate) fn open_stub(
    desc: &SourceDescriptor,
    mode: OutOfRangeMode,
) -> Result<StubSession, BridgeError> {
    match desc {
        SourceDescriptor::Files { path, active_range } => {
            if !path.exists() {
                return Err(BridgeError::SourceNotFound(path.display().to_string()));
            }
            info!(path = %path.display(), "stub backend: opening file source");
            Ok(StubSession::new(StubConfig {
                active_range: *active_range,
                out_of_range_mode: mode,
                ..StubConfig::default()
            }))
        }
        SourceDescriptor::Network { host, port } => {
            if host.is_empty() {
                return Err(BridgeError::SourceNotFound(format!("{host}:{port}")));
            }
            info!(host, port, "stub backend: opening network source");
            Ok(StubSession::new(StubConfig {
                out_of_range_mode: mode,
                ..StubConfig::default()
            }))
        }
    }
}
