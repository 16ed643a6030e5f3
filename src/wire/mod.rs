//! Binary frame codec for per-tick input and world snapshots.
//!
//! All multi-byte fields are big-endian. Decoding checks the remaining length before
//! every read so a short buffer surfaces as [`WireError::Truncated`].

pub mod actions;
pub mod input;
pub mod snapshot;

pub use actions::Actions;
pub use input::InputFrame;
pub use snapshot::{NpcRecord, PlayerRecord, SeatRecord, VehicleRecord, WheelRecord, WorldSnapshot};

use bytes::{Buf, BufMut};

/// Wire decoding errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("frame truncated: needed {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    #[error("entity id is not valid utf-8")]
    InvalidId,

    #[error("too many {0} records for one frame")]
    TooMany(&'static str),
}

pub(crate) fn ensure(buf: &impl Buf, needed: usize) -> Result<(), WireError> {
    if buf.remaining() < needed {
        return Err(WireError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

pub(crate) fn get_vec3(buf: &mut impl Buf) -> Result<[f32; 3], WireError> {
    ensure(buf, 12)?;
    Ok([buf.get_f32(), buf.get_f32(), buf.get_f32()])
}

pub(crate) fn get_quat(buf: &mut impl Buf) -> Result<[f32; 4], WireError> {
    ensure(buf, 16)?;
    Ok([buf.get_f32(), buf.get_f32(), buf.get_f32(), buf.get_f32()])
}

pub(crate) fn put_vec3(buf: &mut impl BufMut, v: &[f32; 3]) {
    for c in v {
        buf.put_f32(*c);
    }
}

pub(crate) fn put_quat(buf: &mut impl BufMut, q: &[f32; 4]) {
    for c in q {
        buf.put_f32(*c);
    }
}

/// Length-prefixed (u8) id string. Ids longer than 255 bytes are cut at a char boundary.
pub(crate) fn put_id(buf: &mut impl BufMut, id: &str) {
    let mut end = id.len().min(u8::MAX as usize);
    while !id.is_char_boundary(end) {
        end -= 1;
    }
    buf.put_u8(end as u8);
    buf.put_slice(&id.as_bytes()[..end]);
}

pub(crate) fn get_id(buf: &mut impl Buf) -> Result<String, WireError> {
    ensure(buf, 1)?;
    let len = buf.get_u8() as usize;
    ensure(buf, len)?;
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| WireError::InvalidId)
}
