//! Client -> server input frame
//!
//! Layout (33 bytes): `u16 actions | u16 seq | u8 dt | f32x4 cam quat | f32x3 cam pos`

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{ensure, get_quat, get_vec3, put_quat, put_vec3, Actions, WireError};

/// Encoded size of an input frame
pub const INPUT_FRAME_LEN: usize = 2 + 2 + 1 + 16 + 12;

/// One client input sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputFrame {
    pub actions: Actions,
    pub seq: u16,
    /// Client frame time, quantized to 1/255 s on the wire
    pub dt_quantized: u8,
    /// Camera orientation `[x, y, z, w]`
    pub cam_rotation: [f32; 4],
    pub cam_position: [f32; 3],
}

impl InputFrame {
    /// Client delta time in seconds
    pub fn dt(&self) -> f32 {
        self.dt_quantized as f32 / 255.0
    }

    /// Quantize a delta time in seconds into the wire byte
    pub fn quantize_dt(dt: f32) -> u8 {
        (dt.clamp(0.0, 1.0) * 255.0).round() as u8
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(INPUT_FRAME_LEN);
        buf.put_u16(self.actions.bits());
        buf.put_u16(self.seq);
        buf.put_u8(self.dt_quantized);
        put_quat(&mut buf, &self.cam_rotation);
        put_vec3(&mut buf, &self.cam_position);
        buf.freeze()
    }

    /// Decode one frame. Trailing bytes are ignored; unknown action bits are kept.
    pub fn decode(mut buf: impl Buf) -> Result<Self, WireError> {
        ensure(&buf, INPUT_FRAME_LEN)?;
        let actions = Actions::from_bits_retain(buf.get_u16());
        let seq = buf.get_u16();
        let dt_quantized = buf.get_u8();
        let cam_rotation = get_quat(&mut buf)?;
        let cam_position = get_vec3(&mut buf)?;
        Ok(Self {
            actions,
            seq,
            dt_quantized,
            cam_rotation,
            cam_position,
        })
    }
}
