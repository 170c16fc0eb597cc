//! Concurrent Index Builder
//!
//! Builds an [`OffsetIndex`] by visiting every blob of a container once.
//!
//! ## Flow
//!
//! ```text
//! BlobReader (sequential)          DecodeGate (N blocking workers)
//! ───────────────────────          ────────────────────────────────
//! skip OSMHeader
//! next_blob() ──► wait permit ──►  decode + sniff ──► (kind, first_id, offset)
//! next_blob() ──► wait permit ──►  decode + sniff ──► ...
//! EOF
//! finish() ◄──────────────────────  join all
//! sort per kind, write cache
//! ```
//!
//! Only the reader touches the file handle. Workers receive the raw blob bytes
//! and hand back one entry each; the scratch buffers they hold go back to the
//! pool when the task ends, whether it succeeded or not.
//!
//! ## Caching
//!
//! A cache file next to the container (see [`IndexConfig::cache_path`]) is
//! loaded instead of scanning when present, unless `ignore_cache` is set.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use nightwatch_core::ElementKind;
use tracing::info;

use crate::blob::{BlobDecoder, BlobReader};
use crate::config::IndexConfig;
use crate::gate::DecodeGate;
use crate::index::{OffsetEntry, OffsetIndex};
use crate::pool::BufferPool;
use crate::sniff::sniff_first_element;
use crate::Result;

pub struct IndexBuilder {
    config: IndexConfig,
    pool: Arc<BufferPool>,
    decoder: BlobDecoder,
}

impl IndexBuilder {
    pub fn new(config: IndexConfig) -> Self {
        let pool = BufferPool::new(config.pool_buffers_per_class);
        let decoder = BlobDecoder::zlib(Arc::clone(&pool));
        Self {
            config,
            pool,
            decoder,
        }
    }

    /// Use a different blob decoder (and its pool) for payloads
    pub fn with_decoder(mut self, decoder: BlobDecoder) -> Self {
        self.pool = Arc::clone(decoder.pool());
        self.decoder = decoder;
        self
    }

    /// Load the cached index for `path`, or scan the container and cache the result
    pub async fn build(&self, path: impl AsRef<Path>) -> Result<OffsetIndex> {
        let path = path.as_ref();
        let cache_path = self.config.cache_path(path);

        if !self.config.ignore_cache && tokio::fs::try_exists(&cache_path).await? {
            let bytes = tokio::fs::read(&cache_path).await?;
            let index = OffsetIndex::from_cache_bytes(path, &bytes)?;
            info!(
                path = ?path,
                cache = ?cache_path,
                nodes = index.table(ElementKind::Node).len(),
                ways = index.table(ElementKind::Way).len(),
                relations = index.table(ElementKind::Relation).len(),
                "Loaded offset index from cache"
            );
            return Ok(index);
        }

        let index = self.scan(path).await?;

        if self.config.write_cache {
            tokio::fs::write(&cache_path, index.to_cache_bytes()).await?;
            info!(cache = ?cache_path, "Wrote offset index cache");
        }
        Ok(index)
    }

    /// Scan every blob of the container, ignoring any cache
    pub async fn scan(&self, path: &Path) -> Result<OffsetIndex> {
        let started = Instant::now();
        info!(
            path = ?path,
            max_concurrent_decodes = self.config.max_concurrent_decodes,
            "Building offset index"
        );

        let mut reader = BlobReader::open(path, Arc::clone(&self.pool)).await?;
        reader.skip_header_blob().await?;

        let mut gate = DecodeGate::new(self.config.max_concurrent_decodes);
        while let Some(blob) = reader.next_blob().await? {
            let decoder = self.decoder.clone();
            gate.dispatch(move || {
                let decoded = decoder.decode(&blob.data)?;
                drop(blob.data);
                let (kind, first_id) = sniff_first_element(decoded.payload())?;
                Ok((kind, OffsetEntry::new(first_id, blob.offset as i64)))
            })
            .await?;
        }
        let found = gate.finish().await?;

        let mut nodes = Vec::new();
        let mut ways = Vec::new();
        let mut relations = Vec::new();
        for (kind, entry) in found {
            match kind {
                ElementKind::Node => nodes.push(entry),
                ElementKind::Way => ways.push(entry),
                ElementKind::Relation => relations.push(entry),
            }
        }
        let index = OffsetIndex::new(PathBuf::from(path), nodes, ways, relations);

        info!(
            path = ?path,
            nodes = index.table(ElementKind::Node).len(),
            ways = index.table(ElementKind::Way).len(),
            relations = index.table(ElementKind::Relation).len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Built offset index"
        );
        Ok(index)
    }
}

/// Build (or load) the index for `path` with default settings
pub async fn build_index(path: impl AsRef<Path>, ignore_cache: bool) -> Result<OffsetIndex> {
    let config = IndexConfig {
        ignore_cache,
        ..Default::default()
    };
    IndexBuilder::new(config).build(path).await
}
