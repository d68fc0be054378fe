//! Safe wrapper over one native decoder session.

use std::ffi::CString;
use std::os::raw::{c_int, c_void};
use std::path::Path;
use std::ptr;

use tracing::{debug, info};

use crate::{ffi, BridgeError, DecodeOutcome, DecoderSession, FrameBuffersMut, OutOfRangeMode};

/// Owns a non-zero session key. The sequence is destroyed exactly once, on
/// drop; the key is never handed out, so use-after-close cannot happen.
pub struct NativeSession {
    key: c_int,
}

impl NativeSession {
    pub fn open_file(
        path: &Path,
        active_range: (i32, i32),
        mode: OutOfRangeMode,
    ) -> Result<Self, BridgeError> {
        let display = path.display().to_string();
        let c_path = CString::new(display.clone())
            .map_err(|_| BridgeError::InvalidPath(display.clone()))?;
        let key = unsafe {
            ffi::CreateSequence(c_path.as_ptr(), active_range.0, active_range.1, mode as c_int)
        };
        if key == 0 {
            return Err(BridgeError::SourceNotFound(display));
        }
        info!(key, path = %display, "opened file source");
        Ok(NativeSession { key })
    }

    pub fn open_network(host: &str, port: u16) -> Result<Self, BridgeError> {
        let c_host = CString::new(host).map_err(|_| BridgeError::InvalidPath(host.to_string()))?;
        let key = unsafe { ffi::CreateConnection(c_host.as_ptr(), c_int::from(port)) };
        if key == 0 {
            return Err(BridgeError::SourceNotFound(format!("{host}:{port}")));
        }
        info!(key, host, port, "opened network source");
        Ok(NativeSession { key })
    }
}

impl DecoderSession for NativeSession {
    fn set_playing(&mut self, on: bool) {
        unsafe { ffi::Play(self.key, on) }
    }

    fn decode_frame(&mut self, bufs: FrameBuffersMut<'_>, last_frame_id: i32) -> DecodeOutcome {
        let normals_ptr = match bufs.normals {
            Some(normals) => normals.as_mut_ptr().cast::<c_void>(),
            None => ptr::null_mut(),
        };
        let mut nb_vertices: c_int = 0;
        let mut nb_triangles: c_int = 0;
        let frame_id = unsafe {
            ffi::UpdateModel(
                self.key,
                bufs.vertices.as_mut_ptr().cast(),
                bufs.uvs.as_mut_ptr().cast(),
                bufs.triangles.as_mut_ptr().cast(),
                bufs.texture.as_mut_ptr().cast(),
                normals_ptr,
                last_frame_id,
                &mut nb_vertices,
                &mut nb_triangles,
            )
        };
        if frame_id < 0 {
            DecodeOutcome::NoNewFrame
        } else {
            DecodeOutcome::NewFrame {
                frame_id,
                vertex_count: nb_vertices.max(0) as usize,
                triangle_count: nb_triangles.max(0) as usize,
            }
        }
    }

    fn out_of_range_event(&mut self) -> bool {
        unsafe { ffi::OutOfRangeEvent(self.key) }
    }

    fn texture_size(&self) -> i32 {
        unsafe { ffi::GetTextureSize(self.key) }
    }

    fn texture_encoding(&self) -> i32 {
        unsafe { ffi::GetTextureEncoding(self.key) }
    }

    fn max_vertices(&self) -> i32 {
        unsafe { ffi::GetSequenceMaxVertices(self.key) }
    }

    fn max_triangles(&self) -> i32 {
        unsafe { ffi::GetSequenceMaxTriangles(self.key) }
    }

    fn frame_rate(&self) -> f32 {
        unsafe { ffi::GetSequenceFramerate(self.key) }
    }

    fn frame_count(&self) -> i32 {
        unsafe { ffi::GetSequenceNbFrames(self.key) }
    }

    fn current_frame(&self) -> i32 {
        unsafe { ffi::GetSequenceCurrentFrame(self.key) }
    }

    fn seek(&mut self, frame: i32) {
        unsafe { ffi::GotoFrame(self.key, frame) }
    }

    fn set_out_of_range_mode(&mut self, mode: OutOfRangeMode) {
        unsafe { ffi::ChangeOutRangeMode(self.key, mode as c_int) }
    }

    fn set_buffering(&mut self, enabled: bool, size: i32) {
        unsafe { ffi::SetBuffering(self.key, enabled, size) }
    }

    fn set_compute_normals(&mut self, enabled: bool) {
        unsafe { ffi::SetComputeNormals(self.key, enabled) }
    }
}

impl Drop for NativeSession {
    fn drop(&mut self) {
        debug!(key = self.key, "destroying sequence");
        unsafe { ffi::DestroySequence(self.key) }
    }
}
