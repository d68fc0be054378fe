//! Raw bindings to the vendor decoder library. All calls are synchronous
//! and operate on an opaque session key; 0 is never a valid key.

#![allow(non_snake_case)]

use std::os::raw::{c_char, c_float, c_int, c_void};

#[link(name = "Bridge4DS")]
extern "C" {
    pub fn CreateSequence(
        data_path: *const c_char,
        range_begin: c_int,
        range_end: c_int,
        out_range_mode: c_int,
    ) -> c_int;

    pub fn CreateConnection(server_ip: *const c_char, server_port: c_int) -> c_int;

    pub fn DestroySequence(key: c_int);

    pub fn Play(key: c_int, on: bool);

    pub fn UpdateModel(
        key: c_int,
        vertices: *mut c_void,
        uvs: *mut c_void,
        triangles: *mut c_void,
        texture: *mut c_void,
        normals: *mut c_void,
        last_model_id: c_int,
        nb_vertices: *mut c_int,
        nb_triangles: *mut c_int,
    ) -> c_int;

    pub fn OutOfRangeEvent(key: c_int) -> bool;

    pub fn GetTextureSize(key: c_int) -> c_int;
    pub fn GetTextureEncoding(key: c_int) -> c_int;
    pub fn GetSequenceMaxVertices(key: c_int) -> c_int;
    pub fn GetSequenceMaxTriangles(key: c_int) -> c_int;
    pub fn GetSequenceFramerate(key: c_int) -> c_float;
    pub fn GetSequenceNbFrames(key: c_int) -> c_int;
    pub fn GetSequenceCurrentFrame(key: c_int) -> c_int;

    pub fn GotoFrame(key: c_int, frame: c_int);

    pub fn ChangeOutRangeMode(key: c_int, mode: c_int);

    pub fn SetBuffering(key: c_int, buffering: bool, buffer_size: c_int);

    pub fn SetComputeNormals(key: c_int, compute_normals: bool);
}
