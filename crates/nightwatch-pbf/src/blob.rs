//! Blob Framing and Decoding
//!
//! ## Container Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ u32 (big-endian) header length               │
//! │ BlobHeader { type: "OSMHeader", datasize }   │
//! │ Blob (datasize bytes)                        │  skipped
//! ├──────────────────────────────────────────────┤
//! │ u32 (big-endian) header length               │  <- blob offset
//! │ BlobHeader { type: "OSMData", datasize }     │
//! │ Blob { raw_size, zlib_data }                 │
//! ├──────────────────────────────────────────────┤
//! │ ...                                          │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! A blob's *offset* is the file position of its header length prefix, so a
//! reader can seek there and decode the blob without any other context.
//!
//! ## Reading vs Decoding
//!
//! [`BlobReader`] owns the file handle and walks the chain strictly in order:
//! headers must be read sequentially, and the cursor is never shared with a
//! worker. It hands out [`RawBlob`]s (pooled bytes plus offset).
//!
//! [`BlobDecoder`] turns a raw blob into its uncompressed payload. It is cheap
//! to clone and is what decode workers carry.

use std::path::Path;
use std::sync::Arc;

use nightwatch_core::binary::read_u32_be;
use nightwatch_core::varint::decode_varint_u64;
use nightwatch_core::wire::{self, WireType};
use nightwatch_core::Error as DecodeError;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

use crate::decompress::{Decompressor, ZlibDecompressor};
use crate::pool::{BufferPool, PooledBuffer};
use crate::Result;

/// Type string of the leading header blob
pub const HEADER_BLOB_TYPE: &str = "OSMHeader";

/// Type string of every data blob
pub const DATA_BLOB_TYPE: &str = "OSMData";

/// Upper bound on a serialized `BlobHeader`
pub const MAX_BLOB_HEADER_SIZE: usize = 64 * 1024;

/// Upper bound on a serialized `Blob` and on its uncompressed payload
pub const MAX_BLOB_SIZE: usize = 32 * 1024 * 1024;

/// Parsed `BlobHeader` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeader {
    pub blob_type: String,
    pub datasize: usize,
}

impl BlobHeader {
    /// Parse a serialized `BlobHeader`
    pub fn parse(mut data: &[u8]) -> nightwatch_core::Result<Self> {
        let mut blob_type = None;
        let mut datasize = None;

        while !data.is_empty() {
            let key = wire::read_key(&mut data, "blob header")?;
            match (key.field, key.wire_type) {
                (1, WireType::LengthDelimited) => blob_type = Some(wire::read_string(&mut data)?),
                // indexdata
                (2, WireType::LengthDelimited) => wire::skip_value(&mut data, key.wire_type)?,
                (3, WireType::Varint) => {
                    datasize = Some(blob_size(decode_varint_u64(&mut data)?, "datasize")?);
                }
                _ => return Err(key.unexpected("blob header")),
            }
        }

        let blob_type =
            blob_type.ok_or_else(|| DecodeError::Schema("blob header without type".to_string()))?;
        let datasize = datasize
            .ok_or_else(|| DecodeError::Schema("blob header without datasize".to_string()))?;
        if datasize > MAX_BLOB_SIZE {
            return Err(DecodeError::Schema(format!(
                "blob of {} bytes exceeds the {} byte limit",
                datasize, MAX_BLOB_SIZE
            )));
        }

        Ok(Self {
            blob_type,
            datasize,
        })
    }

    fn expect_type(&self, expected: &'static str) -> nightwatch_core::Result<()> {
        if self.blob_type != expected {
            return Err(DecodeError::UnexpectedBlobType {
                expected,
                found: self.blob_type.clone(),
            });
        }
        Ok(())
    }
}

/// Convert a declared size, refusing values this platform cannot address
fn blob_size(size: u64, field: &str) -> nightwatch_core::Result<usize> {
    usize::try_from(size)
        .map_err(|_| DecodeError::Schema(format!("{} {} does not fit in usize", field, size)))
}

/// Serialized `Blob` bytes read from the container
#[derive(Debug)]
pub struct RawBlob {
    /// Offset of the blob's header length prefix
    pub offset: u64,
    pub data: PooledBuffer,
}

/// Sequential reader over the blob chain of one container file
pub struct BlobReader {
    file: File,
    position: u64,
    pool: Arc<BufferPool>,
}

impl BlobReader {
    pub async fn open(path: impl AsRef<Path>, pool: Arc<BufferPool>) -> Result<Self> {
        let file = File::open(path.as_ref()).await?;
        Ok(Self {
            file,
            position: 0,
            pool,
        })
    }

    pub async fn seek(&mut self, offset: u64) -> Result<()> {
        self.position = self.file.seek(SeekFrom::Start(offset)).await?;
        Ok(())
    }

    /// Skip the leading `OSMHeader` blob
    pub async fn skip_header_blob(&mut self) -> Result<()> {
        let header = self.read_header(HEADER_BLOB_TYPE).await?.ok_or_else(|| {
            DecodeError::Schema("container does not start with an OSMHeader blob".to_string())
        })?;
        // Read rather than seek, so a header blob cut short is Truncated
        let mut skipped = self.pool.acquire(header.datasize);
        self.read_exact(&mut skipped).await
    }

    /// Read the next `OSMData` blob, or `None` at a clean end of file
    pub async fn next_blob(&mut self) -> Result<Option<RawBlob>> {
        let offset = self.position;
        let Some(header) = self.read_header(DATA_BLOB_TYPE).await? else {
            return Ok(None);
        };

        let mut data = self.pool.acquire(header.datasize);
        self.read_exact(&mut data).await?;
        Ok(Some(RawBlob { offset, data }))
    }

    /// Read the blob that starts at `offset`
    pub async fn blob_at(&mut self, offset: u64) -> Result<RawBlob> {
        self.seek(offset).await?;
        self.next_blob().await?.ok_or_else(|| {
            DecodeError::Truncated {
                needed: 4,
                available: 0,
            }
            .into()
        })
    }

    async fn read_header(&mut self, expected: &'static str) -> Result<Option<BlobHeader>> {
        let mut len_buf = [0u8; 4];
        let filled = self.read_up_to(&mut len_buf).await?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < len_buf.len() {
            return Err(DecodeError::Truncated {
                needed: len_buf.len(),
                available: filled,
            }
            .into());
        }

        let header_len = read_u32_be(&mut &len_buf[..])? as usize;
        if header_len > MAX_BLOB_HEADER_SIZE {
            return Err(DecodeError::Schema(format!(
                "blob header of {} bytes exceeds the {} byte limit",
                header_len, MAX_BLOB_HEADER_SIZE
            ))
            .into());
        }

        let mut header_buf = vec![0u8; header_len];
        self.read_exact(&mut header_buf).await?;
        let header = BlobHeader::parse(&header_buf)?;
        header.expect_type(expected)?;
        Ok(Some(header))
    }

    /// Fill `buf` or fail with `Truncated`
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let filled = self.read_up_to(buf).await?;
        if filled < buf.len() {
            return Err(DecodeError::Truncated {
                needed: buf.len(),
                available: filled,
            }
            .into());
        }
        Ok(())
    }

    /// Read until `buf` is full or the file ends, returning the bytes read
    async fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.position += filled as u64;
        Ok(filled)
    }
}

/// Inflated payload of one blob, backed by a pooled buffer
#[derive(Debug)]
pub struct DecodedBlob {
    buffer: PooledBuffer,
}

impl DecodedBlob {
    pub fn payload(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Turns serialized `Blob` messages into payload bytes
#[derive(Clone)]
pub struct BlobDecoder {
    pool: Arc<BufferPool>,
    decompressor: Arc<dyn Decompressor>,
}

impl BlobDecoder {
    pub fn new(pool: Arc<BufferPool>, decompressor: Arc<dyn Decompressor>) -> Self {
        Self { pool, decompressor }
    }

    /// Decoder using zlib, the encoding OSM writers produce
    pub fn zlib(pool: Arc<BufferPool>) -> Self {
        Self::new(pool, Arc::new(ZlibDecompressor))
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Decode one serialized `Blob`.
    ///
    /// The declared `raw_size` must match what the decompressor produces exactly.
    pub fn decode(&self, blob: &[u8]) -> nightwatch_core::Result<DecodedBlob> {
        let mut cur = blob;
        let mut raw = None;
        let mut raw_size = None;
        let mut zlib_data = None;

        while !cur.is_empty() {
            let key = wire::read_key(&mut cur, "blob")?;
            match (key.field, key.wire_type) {
                (1, WireType::LengthDelimited) => raw = Some(wire::read_len_delimited(&mut cur)?),
                (2, WireType::Varint) => {
                    raw_size = Some(blob_size(decode_varint_u64(&mut cur)?, "raw_size")?)
                }
                (3, WireType::LengthDelimited) => {
                    zlib_data = Some(wire::read_len_delimited(&mut cur)?)
                }
                (4..=7, WireType::LengthDelimited) => {
                    return Err(DecodeError::Schema(format!(
                        "unsupported blob compression (field {})",
                        key.field
                    )))
                }
                _ => return Err(key.unexpected("blob")),
            }
        }

        match (raw, zlib_data) {
            (Some(raw), None) => {
                let mut buffer = self.pool.acquire(raw.len());
                buffer.copy_from_slice(raw);
                Ok(DecodedBlob { buffer })
            }
            (None, Some(compressed)) => {
                let declared = raw_size.ok_or_else(|| {
                    DecodeError::Schema("compressed blob without raw_size".to_string())
                })?;
                if declared > MAX_BLOB_SIZE {
                    return Err(DecodeError::Schema(format!(
                        "raw_size {} exceeds the {} byte limit",
                        declared, MAX_BLOB_SIZE
                    )));
                }

                let mut buffer = self.pool.acquire(declared);
                let actual = self.decompressor.decompress(compressed, &mut buffer)?;
                if actual != declared {
                    return Err(DecodeError::SizeMismatch { declared, actual });
                }
                Ok(DecodedBlob { buffer })
            }
            (Some(_), Some(_)) => Err(DecodeError::Schema(
                "blob carries both raw and zlib data".to_string(),
            )),
            (None, None) => Err(DecodeError::Schema("blob without payload".to_string())),
        }
    }
}
