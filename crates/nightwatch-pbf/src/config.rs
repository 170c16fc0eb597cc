//! Index and Decode Configuration
//!
//! ## IndexConfig
//!
//! Controls how the offset index is built and cached, and how much decode work
//! runs at once:
//!
//! - **max_concurrent_decodes**: decode tasks in flight (default: 24, or 1 in debug builds)
//! - **cache_extension**: extension of the cache file next to the container (default: `pbf.index`)
//! - **ignore_cache**: rebuild even if a cache file exists (default: false)
//! - **write_cache**: persist a freshly built index (default: true)
//! - **pool_buffers_per_class**: idle scratch buffers kept per size class (default: 32)
//!
//! The cache is invalidated by presence only. Replacing the container without
//! deleting the cache (or setting `ignore_cache`) serves stale offsets.
//!
//! ## Usage
//!
//! ```ignore
//! use nightwatch_pbf::IndexConfig;
//!
//! // Force a rebuild, keep the default worker budget
//! let config = IndexConfig {
//!     ignore_cache: true,
//!     ..Default::default()
//! };
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum decode tasks in flight. The blob reader waits for a permit before
    /// dispatching, so this also bounds how far reading runs ahead of decoding.
    #[serde(default = "default_max_concurrent_decodes")]
    pub max_concurrent_decodes: usize,

    /// Extension that replaces the container's own to name the cache file
    #[serde(default = "default_cache_extension")]
    pub cache_extension: String,

    /// Rebuild even if a cache file exists
    #[serde(default)]
    pub ignore_cache: bool,

    /// Persist the index after building it
    #[serde(default = "default_write_cache")]
    pub write_cache: bool,

    /// Idle buffers retained per scratch pool size class
    #[serde(default = "default_pool_buffers_per_class")]
    pub pool_buffers_per_class: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_concurrent_decodes: default_max_concurrent_decodes(),
            cache_extension: default_cache_extension(),
            ignore_cache: false,
            write_cache: default_write_cache(),
            pool_buffers_per_class: default_pool_buffers_per_class(),
        }
    }
}

impl IndexConfig {
    /// Where the cache for `container` lives, e.g. `planet.pbf` -> `planet.pbf.index`
    pub fn cache_path(&self, container: &Path) -> PathBuf {
        container.with_extension(&self.cache_extension)
    }
}

fn default_max_concurrent_decodes() -> usize {
    // Serial decoding in debug builds keeps failures reproducible
    if cfg!(debug_assertions) {
        1
    } else {
        24
    }
}

fn default_cache_extension() -> String {
    "pbf.index".to_string()
}

fn default_write_cache() -> bool {
    true
}

fn default_pool_buffers_per_class() -> usize {
    32
}
