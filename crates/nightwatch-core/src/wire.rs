//! Protobuf Wire Framing
//!
//! A PBF container is a chain of protobuf messages, but decoding it through a
//! generated codec would materialize every node, way and relation. This module
//! exposes the handful of framing operations the decoders need to walk the
//! nested structure in place:
//!
//! - field keys (`field << 3 | wire_type`)
//! - length-delimited sub-slices, borrowed from the input without copying
//! - packed repeated varints (plain and zig-zag delta encoded)
//! - skipping a value whose field is known but not needed
//!
//! All readers take a `&mut &[u8]` cursor and advance it past what they consume.
//! A length that overruns the enclosing frame is [`Error::Truncated`].
//!
//! The `put_*` writers emit the same framing and are what tests use to build
//! synthetic containers.
//!
//! ```text
//! PrimitiveBlock
//! ├── 1: StringTable   (length-delimited)
//! └── 2: PrimitiveGroup (length-delimited, repeated)
//!        ├── 1: Node       (repeated)
//!        ├── 2: DenseNodes
//!        ├── 3: Way        (repeated)
//!        └── 4: Relation   (repeated)
//! ```

use bytes::BufMut;

use crate::varint::{decode_varint_u64, encode_varint_u64, zigzag_decode, zigzag_encode};
use crate::{Error, Result};

/// Protobuf wire types this decoder accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    pub fn as_u8(self) -> u8 {
        match self {
            WireType::Varint => 0,
            WireType::Fixed64 => 1,
            WireType::LengthDelimited => 2,
            WireType::Fixed32 => 5,
        }
    }
}

/// A decoded field key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldKey {
    pub field: u32,
    pub wire_type: WireType,
}

impl FieldKey {
    /// Build the error for a key that is not valid in `context`
    pub fn unexpected(self, context: &'static str) -> Error {
        Error::UnexpectedField {
            context,
            field: self.field,
            wire_type: self.wire_type.as_u8(),
        }
    }
}

/// Read a field key. Group wire types (3, 4) and reserved ones are rejected.
pub fn read_key(cur: &mut &[u8], context: &'static str) -> Result<FieldKey> {
    let raw = decode_varint_u64(cur)?;
    let field = u32::try_from(raw >> 3).map_err(|_| {
        Error::Schema(format!("field number {} out of range in {}", raw >> 3, context))
    })?;
    let wire_type = match raw & 0x7 {
        0 => WireType::Varint,
        1 => WireType::Fixed64,
        2 => WireType::LengthDelimited,
        5 => WireType::Fixed32,
        other => {
            return Err(Error::UnexpectedField {
                context,
                field,
                wire_type: other as u8,
            })
        }
    };
    Ok(FieldKey { field, wire_type })
}

/// Read a key and require it to be exactly `field` with `wire_type`
pub fn expect_key(
    cur: &mut &[u8],
    field: u32,
    wire_type: WireType,
    context: &'static str,
) -> Result<()> {
    let key = read_key(cur, context)?;
    if key.field != field || key.wire_type != wire_type {
        return Err(key.unexpected(context));
    }
    Ok(())
}

/// Split `len` bytes off the front of the cursor
pub fn take<'a>(cur: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if cur.len() < len {
        return Err(Error::Truncated {
            needed: len,
            available: cur.len(),
        });
    }
    let (head, tail) = cur.split_at(len);
    *cur = tail;
    Ok(head)
}

/// Read a varint length prefix and the bytes it covers
pub fn read_len_delimited<'a>(cur: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = decode_varint_u64(cur)?;
    let len = usize::try_from(len).map_err(|_| Error::Truncated {
        needed: usize::MAX,
        available: cur.len(),
    })?;
    take(cur, len)
}

/// Read a key that must be length-delimited, returning its field number and payload
pub fn read_bytes_field<'a>(cur: &mut &'a [u8], context: &'static str) -> Result<(u32, &'a [u8])> {
    let key = read_key(cur, context)?;
    if key.wire_type != WireType::LengthDelimited {
        return Err(key.unexpected(context));
    }
    Ok((key.field, read_len_delimited(cur)?))
}

/// Read a length-prefixed UTF-8 string
pub fn read_string(cur: &mut &[u8]) -> Result<String> {
    let bytes = read_len_delimited(cur)?;
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| Error::InvalidUtf8)
}

/// Skip over the value of a field that is known but not needed
pub fn skip_value(cur: &mut &[u8], wire_type: WireType) -> Result<()> {
    match wire_type {
        WireType::Varint => {
            decode_varint_u64(cur)?;
        }
        WireType::Fixed64 => {
            take(cur, 8)?;
        }
        WireType::Fixed32 => {
            take(cur, 4)?;
        }
        WireType::LengthDelimited => {
            read_len_delimited(cur)?;
        }
    }
    Ok(())
}

/// Iterator over a packed repeated varint field
#[derive(Debug, Clone)]
pub struct PackedVarints<'a> {
    data: &'a [u8],
}

impl<'a> PackedVarints<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl Iterator for PackedVarints<'_> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        let item = decode_varint_u64(&mut self.data);
        if item.is_err() {
            // Stop after the first error so callers see it exactly once
            self.data = &[];
        }
        Some(item)
    }
}

/// Iterator over a packed `sint64` field holding delta-encoded ids.
///
/// Deltas accumulate from zero, so each item is an absolute id.
#[derive(Debug, Clone)]
pub struct DeltaIds<'a> {
    inner: PackedVarints<'a>,
    current: i64,
}

impl<'a> DeltaIds<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: PackedVarints::new(data),
            current: 0,
        }
    }
}

impl Iterator for DeltaIds<'_> {
    type Item = Result<i64>;

    fn next(&mut self) -> Option<Self::Item> {
        let delta = match self.inner.next()? {
            Ok(raw) => zigzag_decode(raw),
            Err(e) => return Some(Err(e)),
        };
        self.current = self.current.wrapping_add(delta);
        Some(Ok(self.current))
    }
}

// ---------------------------------------------------------------
// Writers
// ---------------------------------------------------------------

pub fn put_key(buf: &mut impl BufMut, field: u32, wire_type: WireType) {
    encode_varint_u64(buf, ((field as u64) << 3) | wire_type.as_u8() as u64);
}

pub fn put_varint_field(buf: &mut impl BufMut, field: u32, value: u64) {
    put_key(buf, field, WireType::Varint);
    encode_varint_u64(buf, value);
}

pub fn put_bytes_field(buf: &mut impl BufMut, field: u32, bytes: &[u8]) {
    put_key(buf, field, WireType::LengthDelimited);
    encode_varint_u64(buf, bytes.len() as u64);
    buf.put_slice(bytes);
}

pub fn put_packed_varints(buf: &mut impl BufMut, field: u32, values: impl IntoIterator<Item = u64>) {
    let mut packed = Vec::new();
    for value in values {
        encode_varint_u64(&mut packed, value);
    }
    put_bytes_field(buf, field, &packed);
}

/// Write ids as a packed `sint64` delta sequence (the inverse of [`DeltaIds`])
pub fn put_packed_delta_ids(buf: &mut impl BufMut, field: u32, ids: &[i64]) {
    let mut last = 0i64;
    put_packed_varints(
        buf,
        field,
        ids.iter().map(|&id| {
            let delta = id.wrapping_sub(last);
            last = id;
            zigzag_encode(delta)
        }),
    );
}
