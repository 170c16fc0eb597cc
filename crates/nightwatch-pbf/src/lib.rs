//! Nightwatch PBF Layer
//!
//! Random access into OSM PBF containers without decoding them in full.
//!
//! ## What This Crate Does
//!
//! 1. **Index Building**: one concurrent pass over every blob, recording the
//!    first id of each blob per element kind
//! 2. **Lookup and Bucketing**: map an id (or a batch of ids) to the blobs that
//!    would hold them
//! 3. **Selective Relation Decoding**: decode only the relations a caller asks
//!    for, by tag filter or by id, and follow relation-of-relation members until
//!    the set is closed
//!
//! ## Architecture Overview
//!
//! ```text
//!                ┌──────────────┐
//!  container ──► │  BlobReader  │  sequential, single cursor
//!                └──────┬───────┘
//!                       │ raw blobs
//!                       ▼
//!                ┌──────────────┐
//!                │  DecodeGate  │  N blocking workers
//!                │ BlobDecoder  │  zlib -> pooled buffer
//!                └──────┬───────┘
//!              ┌────────┴─────────┐
//!              ▼                  ▼
//!     sniff_first_element    parse_relations
//!              │                  │
//!              ▼                  ▼
//!        OffsetIndex ◄──── RelationLoader (closure passes)
//!         (+ cache)
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! use nightwatch_core::{ElementFilter, ElementKind};
//! use nightwatch_pbf::{build_index, load_relations, IndexConfig};
//!
//! let index = build_index("planet.pbf", false).await?;
//!
//! let filters = vec![ElementFilter::new(ElementKind::Relation).with_key("boundary")];
//! let relations = load_relations(&filters, &index, IndexConfig::default()).await?;
//!
//! let way_blob = index.lookup(ElementKind::Way, 4_242);
//! ```
//!
//! ## Error Handling
//!
//! Truncation, schema violations and size mismatches are fatal and abort the
//! whole operation. See [`Error`].

pub mod blob;
pub mod builder;
pub mod config;
pub mod decompress;
pub mod error;
pub mod filter;
pub mod gate;
pub mod index;
pub mod pool;
pub mod relations;
pub mod sniff;
pub mod writer;

pub use blob::{BlobDecoder, BlobHeader, BlobReader, DecodedBlob, RawBlob};
pub use builder::{build_index, IndexBuilder};
pub use config::IndexConfig;
pub use decompress::{Decompressor, ZlibDecompressor};
pub use error::{Error, Result};
pub use filter::{BlobTagFilter, IndexedTagFilters, KeyMatch};
pub use index::{OffsetBucket, OffsetEntry, OffsetIndex};
pub use pool::{BufferPool, PooledBuffer};
pub use relations::{load_relations, load_relations_by_id, parse_relations, RelationLoader};
pub use sniff::sniff_first_element;
pub use writer::{BlobEncoding, BlockBuilder, ContainerWriter};
