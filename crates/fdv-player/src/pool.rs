//! Fixed-capacity, double-buffered frame storage.
//!
//! Slots are allocated once per session and reused; the decoder writes into
//! the write slot while the presentation side reads the read slot. Indices
//! advance only on a committed delivery, so the two never alias for pools
//! of two or more slots.

use bytemuck::Zeroable;
use parking_lot::{Mutex, MutexGuard};

use fdv_bridge::{FrameBuffersMut, TextureEncoding, Vec2, Vec3};

/// Hard ceiling on vertex/UV/normal array length, inherited from the 16-bit
/// index space of the mesh format.
pub const VERTEX_CEILING: usize = 65535;

/// Geometry array length for a sequence reporting `max_vertices`.
pub fn geometry_len(max_vertices: u32) -> usize {
    (max_vertices as usize).min(VERTEX_CEILING)
}

/// Byte length of one frame's texture payload for the given edge size and
/// encoding. 4 bits per pixel is the common case; PVRTC-2 halves it and the
/// 8x8 block format is 16 bytes per block.
pub fn texture_payload_len(texture_size: u32, encoding: TextureEncoding) -> usize {
    let s = texture_size as usize;
    match encoding {
        TextureEncoding::PvrtcRgb2 => s * s / 4,
        TextureEncoding::AstcRgba8x8 => {
            let blocks = s.div_ceil(8);
            blocks * blocks * 16
        }
        TextureEncoding::Dxt1 | TextureEncoding::PvrtcRgb4 | TextureEncoding::EtcRgb4 => s * s / 2,
    }
}

/// Heap buffer with a stable address, handed to the native decoder to write
/// into. Never moves after allocation and is freed exactly once, on drop;
/// ownership makes use-after-release unrepresentable.
pub struct PinnedBuffer<T> {
    data: Box<[T]>,
}

impl<T: Zeroable + Copy> PinnedBuffer<T> {
    pub fn zeroed(len: usize) -> Self {
        PinnedBuffer {
            data: vec![T::zeroed(); len].into_boxed_slice(),
        }
    }
}

impl<T> PinnedBuffer<T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// Capacity parameters for every slot in a pool.
#[derive(Debug, Clone, Copy)]
pub struct SlotSpec {
    pub vertex_capacity: usize,
    pub index_capacity: usize,
    pub texture_len: usize,
    pub with_normals: bool,
}

impl SlotSpec {
    pub fn from_info(info: &fdv_bridge::SessionInfo, with_normals: bool) -> Self {
        SlotSpec {
            vertex_capacity: geometry_len(info.max_vertices),
            index_capacity: info.max_triangles as usize * 3,
            texture_len: texture_payload_len(info.texture_size, info.texture_encoding),
            with_normals,
        }
    }
}

/// One decoded frame's storage: geometry arrays plus the compressed texture
/// payload, and the counts of the last delivery into it.
pub struct FrameSlot {
    pub vertices: PinnedBuffer<Vec3>,
    pub uvs: PinnedBuffer<Vec2>,
    pub normals: Option<PinnedBuffer<Vec3>>,
    pub triangles: PinnedBuffer<u32>,
    pub texture: PinnedBuffer<u8>,
    pub frame_id: i32,
    pub vertex_count: usize,
    pub triangle_count: usize,
}

impl FrameSlot {
    fn new(spec: &SlotSpec) -> Self {
        FrameSlot {
            vertices: PinnedBuffer::zeroed(spec.vertex_capacity),
            uvs: PinnedBuffer::zeroed(spec.vertex_capacity),
            normals: spec
                .with_normals
                .then(|| PinnedBuffer::zeroed(spec.vertex_capacity)),
            triangles: PinnedBuffer::zeroed(spec.index_capacity),
            texture: PinnedBuffer::zeroed(spec.texture_len),
            frame_id: -1,
            vertex_count: 0,
            triangle_count: 0,
        }
    }

    /// Allocate the normal array after the fact, when normal computation is
    /// enabled on a live session.
    pub fn ensure_normals(&mut self, vertex_capacity: usize) {
        if self.normals.is_none() {
            self.normals = Some(PinnedBuffer::zeroed(vertex_capacity));
        }
    }

    pub fn buffers_mut(&mut self) -> FrameBuffersMut<'_> {
        FrameBuffersMut {
            vertices: self.vertices.as_mut_slice(),
            uvs: self.uvs.as_mut_slice(),
            normals: self.normals.as_mut().map(PinnedBuffer::as_mut_slice),
            triangles: self.triangles.as_mut_slice(),
            texture: self.texture.as_mut_slice(),
        }
    }
}

struct SlotIndices {
    write: usize,
    read: usize,
}

/// Double-buffered slot pool. Size 1 is reserved for synchronous preview;
/// continuous playback always uses two or more slots.
pub struct FramePool {
    slots: Vec<Mutex<FrameSlot>>,
    indices: Mutex<SlotIndices>,
}

impl FramePool {
    pub fn new(spec: &SlotSpec, slot_count: usize) -> Self {
        let slot_count = slot_count.max(1);
        let slots = (0..slot_count)
            .map(|_| Mutex::new(FrameSlot::new(spec)))
            .collect();
        FramePool {
            slots,
            indices: Mutex::new(SlotIndices {
                write: 0,
                read: slot_count - 1,
            }),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn write_index(&self) -> usize {
        self.indices.lock().write
    }

    pub fn read_index(&self) -> usize {
        self.indices.lock().read
    }

    /// Lock the slot the decoder may write into next.
    pub fn write_slot(&self) -> MutexGuard<'_, FrameSlot> {
        let index = self.indices.lock().write;
        self.slots[index].lock()
    }

    /// Lock the slot holding the last committed delivery.
    pub fn read_slot(&self) -> MutexGuard<'_, FrameSlot> {
        let index = self.indices.lock().read;
        self.slots[index].lock()
    }

    /// Publish the write slot and advance. Called only after a full
    /// successful delivery; failed or no-new-frame attempts leave the
    /// indices untouched.
    pub fn commit(&self) {
        let mut indices = self.indices.lock();
        indices.read = indices.write;
        indices.write = (indices.write + 1) % self.slots.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdv_bridge::SessionInfo;

    fn spec(vertex_capacity: usize) -> SlotSpec {
        SlotSpec {
            vertex_capacity,
            index_capacity: 12,
            texture_len: 64,
            with_normals: false,
        }
    }

    #[test]
    fn vertex_ceiling_applies() {
        assert_eq!(geometry_len(100_000), 65535);
        assert_eq!(geometry_len(50_000), 50_000);
    }

    #[test]
    fn texture_payload_lengths_per_encoding() {
        assert_eq!(texture_payload_len(1024, TextureEncoding::Dxt1), 524_288);
        assert_eq!(texture_payload_len(1024, TextureEncoding::PvrtcRgb2), 262_144);
        assert_eq!(
            texture_payload_len(1024, TextureEncoding::AstcRgba8x8),
            128 * 128 * 16
        );
        // Non-multiple-of-8 edge sizes round the block count up.
        assert_eq!(
            texture_payload_len(100, TextureEncoding::AstcRgba8x8),
            13 * 13 * 16
        );
    }

    #[test]
    fn slot_spec_for_reported_capabilities() {
        let info = SessionInfo {
            texture_size: 2048,
            texture_encoding: TextureEncoding::Dxt1,
            max_vertices: 50_000,
            max_triangles: 20_000,
            frame_rate: 30.0,
            frame_count: 100,
        };
        let spec = SlotSpec::from_info(&info, false);
        assert_eq!(spec.vertex_capacity, 50_000);
        assert_eq!(spec.index_capacity, 60_000);
        assert_eq!(spec.texture_len, 2_097_152);
    }

    #[test]
    fn write_and_read_never_alias_for_double_buffering() {
        let pool = FramePool::new(&spec(16), 2);
        for _ in 0..8 {
            assert_ne!(pool.write_index(), pool.read_index());
            pool.commit();
        }
    }

    #[test]
    fn commit_advances_read_to_published_slot() {
        let pool = FramePool::new(&spec(16), 2);
        let written = pool.write_index();
        pool.commit();
        assert_eq!(pool.read_index(), written);
        assert_ne!(pool.write_index(), written);
    }

    #[test]
    fn normals_allocate_lazily() {
        let pool = FramePool::new(&spec(16), 2);
        {
            let mut slot = pool.write_slot();
            assert!(slot.normals.is_none());
            slot.ensure_normals(16);
            assert_eq!(slot.normals.as_ref().map(PinnedBuffer::len), Some(16));
        }
    }
}
