//! Fixed-layout order frame codec
//!
//! Layout (little-endian, 40 bytes):
//!
//! | offset | size | field        |
//! |--------|------|--------------|
//! | 0      | 2    | magic 0x4E58 |
//! | 2      | 1    | version      |
//! | 3      | 1    | side code    |
//! | 4      | 4    | instrument   |
//! | 8      | 8    | order id     |
//! | 16     | 8    | price ticks  |
//! | 24     | 8    | quantity     |
//! | 32     | 4    | CRC-32 of 0..32 |
//! | 36     | 4    | reserved, zero |
//!
//! Decoding reads straight out of the borrowed slice and never allocates.

use crate::order::Order;
use crate::source::MalformedInput;
use byteorder::{ByteOrder, LittleEndian};
use common::{InstrumentId, OrderId, Px, Qty, SideCode};

/// Encoded frame size in bytes
pub const FRAME_LEN: usize = 40;
/// Frame magic, "XN" on the wire
pub const FRAME_MAGIC: u16 = 0x4E58;
/// Only supported layout version
pub const FRAME_VERSION: u8 = 1;

const CHECKSUM_AT: usize = 32;
const RESERVED_AT: usize = 36;

/// Decode one frame
///
/// # Errors
/// Returns [`MalformedInput`] for a wrong length, bad magic, unsupported
/// version, checksum mismatch or non-zero reserved bytes. Field values are
/// not judged here; an unknown side or a negative quantity decodes fine and
/// is left to the risk gate.
#[inline]
pub fn decode(frame: &[u8]) -> Result<Order, MalformedInput> {
    if frame.len() != FRAME_LEN {
        return Err(MalformedInput::BadLength { len: frame.len() });
    }

    let magic = LittleEndian::read_u16(&frame[0..2]);
    if magic != FRAME_MAGIC {
        return Err(MalformedInput::BadMagic { found: magic });
    }

    let version = frame[2];
    if version != FRAME_VERSION {
        return Err(MalformedInput::UnsupportedVersion { found: version });
    }

    let expected = LittleEndian::read_u32(&frame[CHECKSUM_AT..RESERVED_AT]);
    let computed = crc32fast::hash(&frame[..CHECKSUM_AT]);
    if expected != computed {
        return Err(MalformedInput::ChecksumMismatch { expected, computed });
    }

    if LittleEndian::read_u32(&frame[RESERVED_AT..FRAME_LEN]) != 0 {
        return Err(MalformedInput::ReservedBytesSet);
    }

    Ok(Order::new(
        OrderId(LittleEndian::read_u64(&frame[8..16])),
        InstrumentId(LittleEndian::read_u32(&frame[4..8])),
        SideCode(frame[3]),
        Px::from_i64(LittleEndian::read_i64(&frame[16..24])),
        Qty::from_i64(LittleEndian::read_i64(&frame[24..32])),
    ))
}

/// Encode an order into a checksummed frame
#[inline]
#[must_use]
pub fn encode(order: &Order) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    LittleEndian::write_u16(&mut frame[0..2], FRAME_MAGIC);
    frame[2] = FRAME_VERSION;
    frame[3] = order.side().raw();
    LittleEndian::write_u32(&mut frame[4..8], order.instrument_id().0);
    LittleEndian::write_u64(&mut frame[8..16], order.order_id().0);
    LittleEndian::write_i64(&mut frame[16..24], order.price().as_i64());
    LittleEndian::write_i64(&mut frame[24..32], order.quantity().as_i64());
    let checksum = crc32fast::hash(&frame[..CHECKSUM_AT]);
    LittleEndian::write_u32(&mut frame[CHECKSUM_AT..RESERVED_AT], checksum);
    frame
}
