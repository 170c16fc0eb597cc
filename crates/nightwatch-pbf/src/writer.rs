//! Container writer.
//!
//! Produces minimal but well-formed containers: an `OSMHeader` blob followed
//! by `OSMData` blobs built with [`BlockBuilder`]. Only the fields the readers
//! in this crate consume are written (node coordinates are zero).
//!
//! ```ignore
//! let mut block = BlockBuilder::new();
//! block.dense_nodes(&[1, 2, 3]);
//!
//! let mut writer = ContainerWriter::new(Vec::new(), BlobEncoding::Zlib)?;
//! let offset = writer.push_block(&block)?;
//! let bytes = writer.finish()?;
//! ```

use std::collections::HashMap;
use std::io::{self, Write};

use bytes::BufMut;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use nightwatch_core::wire::{put_bytes_field, put_packed_delta_ids, put_packed_varints, put_varint_field};
use nightwatch_core::{Member, Tags, Way};

use crate::blob::{DATA_BLOB_TYPE, HEADER_BLOB_TYPE};

/// How blob payloads are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobEncoding {
    Raw,
    Zlib,
}

/// Serialize a `BlobHeader`
pub fn encode_blob_header(blob_type: &str, datasize: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    put_bytes_field(&mut buf, 1, blob_type.as_bytes());
    put_varint_field(&mut buf, 3, datasize as u64);
    buf
}

/// Serialize a `Blob` holding `payload`
pub fn encode_blob(payload: &[u8], encoding: BlobEncoding) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    match encoding {
        BlobEncoding::Raw => put_bytes_field(&mut buf, 1, payload),
        BlobEncoding::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(payload)?;
            let compressed = encoder.finish()?;
            put_varint_field(&mut buf, 2, payload.len() as u64);
            put_bytes_field(&mut buf, 3, &compressed);
        }
    }
    Ok(buf)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    DenseNodes,
    Ways,
    Relations,
}

/// Builds one `PrimitiveBlock`
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    strings: Vec<String>,
    string_ids: HashMap<String, u32>,
    groups: Vec<(GroupKind, Vec<u8>)>,
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockBuilder {
    pub fn new() -> Self {
        // Index 0 is reserved for the empty string
        Self {
            strings: vec![String::new()],
            string_ids: HashMap::from([(String::new(), 0)]),
            groups: Vec::new(),
        }
    }

    fn string_id(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.string_ids.get(s) {
            return id;
        }
        let id = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.string_ids.insert(s.to_string(), id);
        id
    }

    fn group(&mut self, kind: GroupKind) -> &mut Vec<u8> {
        if self.groups.last().map(|(k, _)| *k) != Some(kind) {
            self.groups.push((kind, Vec::new()));
        }
        let last = self.groups.len() - 1;
        &mut self.groups[last].1
    }

    /// Add a dense node group holding `ids`
    pub fn dense_nodes(&mut self, ids: &[i64]) -> &mut Self {
        let mut dense = Vec::new();
        put_packed_delta_ids(&mut dense, 1, ids);
        let zeros = vec![0i64; ids.len()];
        put_packed_delta_ids(&mut dense, 8, &zeros);
        put_packed_delta_ids(&mut dense, 9, &zeros);

        let mut group = Vec::new();
        put_bytes_field(&mut group, 2, &dense);
        self.groups.push((GroupKind::DenseNodes, group));
        self
    }

    pub fn ways(&mut self, ways: &[Way]) -> &mut Self {
        let group = self.group(GroupKind::Ways);
        for way in ways {
            let mut record = Vec::new();
            put_varint_field(&mut record, 1, way.id as u64);
            if !way.nodes.is_empty() {
                put_packed_delta_ids(&mut record, 8, &way.nodes);
            }
            put_bytes_field(group, 3, &record);
        }
        self
    }

    pub fn relation(&mut self, id: i64, members: &[Member], tags: &Tags) -> &mut Self {
        let keys: Vec<u64> = tags.iter().map(|(k, _)| self.string_id(k) as u64).collect();
        let vals: Vec<u64> = tags.iter().map(|(_, v)| self.string_id(v) as u64).collect();
        let roles: Vec<u64> = members
            .iter()
            .map(|m| self.string_id(&m.role) as u64)
            .collect();
        let ids: Vec<i64> = members.iter().map(|m| m.id).collect();

        let mut record = Vec::new();
        put_varint_field(&mut record, 1, id as u64);
        if !keys.is_empty() {
            put_packed_varints(&mut record, 2, keys);
            put_packed_varints(&mut record, 3, vals);
        }
        if !members.is_empty() {
            put_packed_varints(&mut record, 8, roles);
            put_packed_delta_ids(&mut record, 9, &ids);
            put_packed_varints(&mut record, 10, members.iter().map(|m| m.kind.member_type()));
        }

        put_bytes_field(self.group(GroupKind::Relations), 4, &record);
        self
    }

    /// Serialize the block
    pub fn encode(&self) -> Vec<u8> {
        let mut table = Vec::new();
        for s in &self.strings {
            put_bytes_field(&mut table, 1, s.as_bytes());
        }

        let mut block = Vec::new();
        put_bytes_field(&mut block, 1, &table);
        for (_, group) in &self.groups {
            put_bytes_field(&mut block, 2, group);
        }
        // granularity
        put_varint_field(&mut block, 17, 100);
        block
    }
}

/// Writes a container to any `Write` sink, tracking blob offsets
pub struct ContainerWriter<W: Write> {
    inner: W,
    position: u64,
    encoding: BlobEncoding,
}

impl<W: Write> ContainerWriter<W> {
    /// Start a container, writing its `OSMHeader` blob
    pub fn new(inner: W, encoding: BlobEncoding) -> io::Result<Self> {
        let mut writer = Self {
            inner,
            position: 0,
            encoding,
        };

        let mut header = Vec::new();
        put_bytes_field(&mut header, 4, b"OsmSchema-V0.6");
        put_bytes_field(&mut header, 4, b"DenseNodes");
        put_bytes_field(&mut header, 16, b"nightwatch");
        let blob = encode_blob(&header, encoding)?;
        writer.push_raw_blob(HEADER_BLOB_TYPE, &blob)?;
        Ok(writer)
    }

    /// Append a data blob, returning its offset
    pub fn push_block(&mut self, block: &BlockBuilder) -> io::Result<u64> {
        let blob = encode_blob(&block.encode(), self.encoding)?;
        self.push_raw_blob(DATA_BLOB_TYPE, &blob)
    }

    /// Append an already serialized `Blob` under `blob_type`, returning its offset
    pub fn push_raw_blob(&mut self, blob_type: &str, blob: &[u8]) -> io::Result<u64> {
        let offset = self.position;
        let header = encode_blob_header(blob_type, blob.len());

        let mut frame = Vec::with_capacity(4 + header.len() + blob.len());
        frame.put_u32(header.len() as u32);
        frame.put_slice(&header);
        frame.put_slice(blob);

        self.inner.write_all(&frame)?;
        self.position += frame.len() as u64;
        Ok(offset)
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobHeader;
    use nightwatch_core::binary::read_u32_be;

    #[test]
    fn test_string_table_dedups() {
        let mut block = BlockBuilder::new();
        let tags: Tags = [("type", "route"), ("route", "bus")].into_iter().collect();
        block.relation(1, &[], &tags);
        // "", type, route, bus
        assert_eq!(block.strings.len(), 4);
    }

    #[test]
    fn test_container_layout() {
        let mut block = BlockBuilder::new();
        block.dense_nodes(&[1, 2]);

        let mut writer = ContainerWriter::new(Vec::new(), BlobEncoding::Raw).unwrap();
        let first = writer.push_block(&block).unwrap();
        let second = writer.push_block(&block).unwrap();
        let bytes = writer.finish().unwrap();

        assert!(first > 0);
        assert!(second > first);
        assert_eq!(second - first, bytes.len() as u64 - second);

        let mut cur = &bytes[first as usize..];
        let header_len = read_u32_be(&mut cur).unwrap() as usize;
        let header = BlobHeader::parse(&cur[..header_len]).unwrap();
        assert_eq!(header.blob_type, DATA_BLOB_TYPE);
    }
}
