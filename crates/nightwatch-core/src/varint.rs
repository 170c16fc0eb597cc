//! Variable-length Integer Encoding (Varint)
//!
//! PBF containers encode almost every integer as a protobuf varint:
//!
//! ## Varint Encoding
//! - Little-endian base-128: each byte carries 7 bits of data
//! - The high bit is a continuation flag
//! - A u64 takes between 1 and 10 bytes
//!
//! ## ZigZag Encoding (for signed integers)
//! `sint64` fields map signed values onto unsigned ones so small negative numbers stay short:
//! - 0 → 0, -1 → 1, 1 → 2, -2 → 3, 2 → 4, etc.
//! - Dense node ids and relation member ids are zig-zag *deltas*, so most of them fit in one byte
//!
//! ## Failure Model
//! Decoders never panic on hostile input. Running out of bytes yields
//! [`Error::Truncated`] and a value that does not fit in 64 bits yields [`Error::VarintOverflow`].
//! Both are fatal for the surrounding blob.
//!
//! ## Usage
//! ```ignore
//! let mut buf = BytesMut::new();
//! encode_varint(&mut buf, -42);
//! let value = decode_varint(&mut buf.as_ref())?;  // -42
//! ```

use bytes::{Buf, BufMut};

use crate::{Error, Result};

/// Longest legal encoding of a u64.
pub const MAX_VARINT_LEN: usize = 10;

/// Encode a signed integer as a varint (ZigZag encoding)
pub fn encode_varint(buf: &mut impl BufMut, value: i64) {
    encode_varint_u64(buf, zigzag_encode(value));
}

/// Encode an unsigned integer as a varint
pub fn encode_varint_u64(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80; // Set continuation bit
        }

        buf.put_u8(byte);

        if value == 0 {
            break;
        }
    }
}

/// Decode a zig-zag varint to a signed integer
pub fn decode_varint(buf: &mut impl Buf) -> Result<i64> {
    decode_varint_u64(buf).map(zigzag_decode)
}

/// Decode a varint to an unsigned integer
pub fn decode_varint_u64(buf: &mut impl Buf) -> Result<u64> {
    let mut value: u64 = 0;

    for i in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(Error::Truncated {
                needed: i + 1,
                available: i,
            });
        }
        let byte = buf.get_u8();
        // The tenth byte only has room for bit 63
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(Error::VarintOverflow);
        }
        value |= ((byte & 0x7F) as u64) << (7 * i);

        if (byte & 0x80) == 0 {
            return Ok(value);
        }
    }

    Err(Error::VarintOverflow)
}

/// Map a signed integer onto the unsigned zig-zag space: `(n << 1) ^ (n >> 63)`
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`]
#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}
