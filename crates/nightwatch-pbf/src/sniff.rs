//! Entity-kind sniffing.
//!
//! Index construction only needs to know which kind a blob holds and the first
//! id of that kind. This walks a decoded `PrimitiveBlock` just far enough to
//! find it: the string table is skipped unread, and within the first group that
//! holds elements only the leading id is decoded.

use nightwatch_core::varint::{decode_varint_u64, zigzag_decode};
use nightwatch_core::wire::{self, DeltaIds, WireType};
use nightwatch_core::{ElementKind, Error, Result};

const BLOCK: &str = "primitive block";
const GROUP: &str = "primitive group";
const DENSE: &str = "dense nodes";

/// Return the kind of the first element in `payload` and its id
pub fn sniff_first_element(payload: &[u8]) -> Result<(ElementKind, i64)> {
    let mut cur = payload;

    while !cur.is_empty() {
        let key = wire::read_key(&mut cur, BLOCK)?;
        match (key.field, key.wire_type) {
            // stringtable
            (1, WireType::LengthDelimited) => wire::skip_value(&mut cur, key.wire_type)?,
            (2, WireType::LengthDelimited) => {
                let group = wire::read_len_delimited(&mut cur)?;
                if let Some(found) = sniff_group(group)? {
                    return Ok(found);
                }
            }
            // granularity, lat_offset, lon_offset, date_granularity
            (17..=20, WireType::Varint) => wire::skip_value(&mut cur, key.wire_type)?,
            _ => return Err(key.unexpected(BLOCK)),
        }
    }

    Err(Error::Schema(
        "primitive block holds no elements".to_string(),
    ))
}

fn sniff_group(mut group: &[u8]) -> Result<Option<(ElementKind, i64)>> {
    while !group.is_empty() {
        let key = wire::read_key(&mut group, GROUP)?;
        match (key.field, key.wire_type) {
            (1, WireType::LengthDelimited) => {
                let mut node = wire::read_len_delimited(&mut group)?;
                wire::expect_key(&mut node, 1, WireType::Varint, "node")?;
                let id = zigzag_decode(decode_varint_u64(&mut node)?);
                return Ok(Some((ElementKind::Node, id)));
            }
            (2, WireType::LengthDelimited) => {
                let dense = wire::read_len_delimited(&mut group)?;
                if let Some(id) = first_dense_id(dense)? {
                    return Ok(Some((ElementKind::Node, id)));
                }
            }
            (3, WireType::LengthDelimited) => {
                let id = leading_id(wire::read_len_delimited(&mut group)?, "way")?;
                return Ok(Some((ElementKind::Way, id)));
            }
            (4, WireType::LengthDelimited) => {
                let id = leading_id(wire::read_len_delimited(&mut group)?, "relation")?;
                return Ok(Some((ElementKind::Relation, id)));
            }
            // changesets
            (5, WireType::LengthDelimited) => wire::skip_value(&mut group, key.wire_type)?,
            _ => return Err(key.unexpected(GROUP)),
        }
    }
    Ok(None)
}

/// First id of a `DenseNodes` message, or `None` if it holds no ids
fn first_dense_id(mut dense: &[u8]) -> Result<Option<i64>> {
    while !dense.is_empty() {
        let (field, value) = wire::read_bytes_field(&mut dense, DENSE)?;
        if field == 1 {
            return DeltaIds::new(value).next().transpose();
        }
    }
    Ok(None)
}

/// Ways and relations must open with their `int64 id` field
fn leading_id(mut element: &[u8], context: &'static str) -> Result<i64> {
    wire::expect_key(&mut element, 1, WireType::Varint, context)?;
    Ok(decode_varint_u64(&mut element)? as i64)
}
