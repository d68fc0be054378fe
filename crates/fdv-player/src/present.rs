//! Boundary to the host renderer.
//!
//! The surrounding engine owns the actual GPU mesh/texture resources; the
//! player only tells it when and what to upload. Implementations swap
//! between `buffer_count` resource sets, mirroring the pool's double
//! buffering.

use tracing::debug;

use fdv_bridge::{TextureEncoding, Vec2, Vec3};

use crate::pool::FrameSlot;

/// Capacity parameters for the renderer-owned resource sets, fixed at
/// session initialization.
#[derive(Debug, Clone, Copy)]
pub struct PresentationSpec {
    pub buffer_count: usize,
    pub texture_size: u32,
    pub texture_encoding: TextureEncoding,
    pub vertex_capacity: usize,
    pub index_capacity: usize,
}

/// Borrowed view of one delivered frame, trimmed to the delivered counts.
pub struct MeshFrame<'a> {
    pub frame_id: i32,
    pub vertices: &'a [Vec3],
    pub uvs: &'a [Vec2],
    pub normals: Option<&'a [Vec3]>,
    pub triangles: &'a [u32],
    pub texture: &'a [u8],
}

impl<'a> MeshFrame<'a> {
    pub fn from_slot(slot: &'a FrameSlot) -> Self {
        let vertex_count = slot.vertex_count.min(slot.vertices.len());
        let index_count = (slot.triangle_count * 3).min(slot.triangles.len());
        MeshFrame {
            frame_id: slot.frame_id,
            vertices: &slot.vertices.as_slice()[..vertex_count],
            uvs: &slot.uvs.as_slice()[..vertex_count],
            normals: slot
                .normals
                .as_ref()
                .map(|n| &n.as_slice()[..vertex_count]),
            triangles: &slot.triangles.as_slice()[..index_count],
            texture: slot.texture.as_slice(),
        }
    }
}

/// Host renderer surface consumed by the presentation handoff.
pub trait PresentationTarget {
    /// Create `spec.buffer_count` mesh/texture resource sets.
    fn allocate(&mut self, spec: &PresentationSpec);

    /// Upload one frame into the given resource set and make it current.
    fn upload(&mut self, buffer_index: usize, frame: &MeshFrame<'_>);

    /// Present nothing (empty frame, or Hide policy after out-of-range).
    fn clear_mesh(&mut self);

    /// Refresh an attached collision proxy from the new geometry.
    fn update_collision(&mut self, _frame: &MeshFrame<'_>) {}

    /// Destroy the resource sets. Not called on preview teardown.
    fn release(&mut self);
}

/// Counting/logging target for headless playback (CLI, benchmarks).
#[derive(Debug, Default)]
pub struct HeadlessPresentation {
    pub allocations: u32,
    pub uploads: u64,
    pub clears: u32,
    pub releases: u32,
    pub last_frame_id: Option<i32>,
}

impl PresentationTarget for HeadlessPresentation {
    fn allocate(&mut self, spec: &PresentationSpec) {
        self.allocations += 1;
        debug!(
            buffers = spec.buffer_count,
            texture_size = spec.texture_size,
            vertices = spec.vertex_capacity,
            "allocated presentation resources"
        );
    }

    fn upload(&mut self, buffer_index: usize, frame: &MeshFrame<'_>) {
        self.uploads += 1;
        self.last_frame_id = Some(frame.frame_id);
        debug!(
            buffer_index,
            frame_id = frame.frame_id,
            vertices = frame.vertices.len(),
            indices = frame.triangles.len(),
            "uploaded frame"
        );
    }

    fn clear_mesh(&mut self) {
        self.clears += 1;
        self.last_frame_id = None;
    }

    fn release(&mut self) {
        self.releases += 1;
    }
}
