//! Fixed-width Binary Fields
//!
//! Two places need fixed-width integers rather than varints:
//!
//! - the container framing, where every blob header is preceded by a
//!   **big-endian** `u32` length
//! - the persisted caches (offset index, tracker snapshot), which are plain
//!   **little-endian** records
//!
//! Writing goes straight through [`bytes::BufMut`] (`put_u32`, `put_i64_le`, ...).
//! Reading goes through the helpers below, which check the remaining length first
//! so a short file becomes [`Error::Truncated`] instead of a panic inside `Buf`.

use bytes::Buf;

use crate::{Error, Result};

#[inline]
fn ensure(buf: &impl Buf, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(Error::Truncated {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

/// Read the big-endian length that prefixes every blob header
pub fn read_u32_be(buf: &mut impl Buf) -> Result<u32> {
    ensure(&*buf, 4)?;
    Ok(buf.get_u32())
}

pub fn read_u32_le(buf: &mut impl Buf) -> Result<u32> {
    ensure(&*buf, 4)?;
    Ok(buf.get_u32_le())
}

pub fn read_i32_le(buf: &mut impl Buf) -> Result<i32> {
    ensure(&*buf, 4)?;
    Ok(buf.get_i32_le())
}

pub fn read_i64_le(buf: &mut impl Buf) -> Result<i64> {
    ensure(&*buf, 8)?;
    Ok(buf.get_i64_le())
}

/// Read a little-endian `i32` element count, rejecting negative values
pub fn read_count_i32(buf: &mut impl Buf) -> Result<usize> {
    let count = read_i32_le(buf)?;
    usize::try_from(count).map_err(|_| Error::Schema(format!("negative count {}", count)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    #[test]
    fn test_mixed_endianness() {
        let mut buf = Vec::new();
        buf.put_u32(0x0000_0102);
        buf.put_u32_le(0x0000_0102);
        assert_eq!(&buf[..4], &[0, 0, 1, 2]);
        assert_eq!(&buf[4..], &[2, 1, 0, 0]);

        let mut cur = &buf[..];
        assert_eq!(read_u32_be(&mut cur).unwrap(), 258);
        assert_eq!(read_u32_le(&mut cur).unwrap(), 258);
    }

    #[test]
    fn test_short_read_is_truncated() {
        let mut cur: &[u8] = &[1, 2, 3];
        let err = read_i64_le(&mut cur).unwrap_err();
        assert!(matches!(
            err,
            Error::Truncated {
                needed: 8,
                available: 3
            }
        ));
    }

    #[test]
    fn test_negative_count_rejected() {
        let mut buf = Vec::new();
        buf.put_i32_le(-1);
        assert!(matches!(
            read_count_i32(&mut &buf[..]).unwrap_err(),
            Error::Schema(_)
        ));
    }
}
