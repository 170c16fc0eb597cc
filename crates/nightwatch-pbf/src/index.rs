//! Offset Index
//!
//! Maps element ids to the blobs that hold them, one table per element kind.
//!
//! ## Table Layout
//!
//! Each table holds one [`OffsetEntry`] per blob of that kind: the smallest id
//! in the blob and the blob's file offset. Tables are sorted by id, which for a
//! well-formed container is also blob order.
//!
//! ```text
//! ways:  [ (1, 4_096), (5_000, 81_920), (9_800, 160_011) ]
//!            │               │                 │
//!            └ ids [1, 5000) └ ids [5000, 9800) └ ids [9800, ∞)
//! ```
//!
//! First ids are lower bounds only. An id inside a blob's range is not
//! guaranteed to exist; the index answers "which blob would hold it".
//!
//! ## Cache Format
//!
//! Little-endian, three tables in node, way, relation order:
//!
//! ```text
//! i32 count, count x (i64 first_id, i64 offset)
//! ```
//!
//! The container path is not stored; the cache sits next to the container and
//! is keyed by its file name.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut};
use nightwatch_core::binary::{read_count_i32, read_i64_le};
use nightwatch_core::ElementKind;
use tracing::debug;

use crate::{Error, Result};

/// First id held by one blob and the blob's file offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OffsetEntry {
    pub first_id: i64,
    pub offset: i64,
}

impl OffsetEntry {
    pub fn new(first_id: i64, offset: i64) -> Self {
        Self { first_id, offset }
    }
}

/// Target ids assigned to the blob at `offset`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetBucket {
    pub offset: i64,
    pub ids: HashSet<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetIndex {
    path: PathBuf,
    nodes: Vec<OffsetEntry>,
    ways: Vec<OffsetEntry>,
    relations: Vec<OffsetEntry>,
}

impl OffsetIndex {
    /// Build an index from unsorted per-kind entries
    pub fn new(
        path: impl Into<PathBuf>,
        mut nodes: Vec<OffsetEntry>,
        mut ways: Vec<OffsetEntry>,
        mut relations: Vec<OffsetEntry>,
    ) -> Self {
        nodes.sort_unstable();
        ways.sort_unstable();
        relations.sort_unstable();
        Self {
            path: path.into(),
            nodes,
            ways,
            relations,
        }
    }

    /// Container file this index describes
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self, kind: ElementKind) -> &[OffsetEntry] {
        match kind {
            ElementKind::Node => &self.nodes,
            ElementKind::Way => &self.ways,
            ElementKind::Relation => &self.relations,
        }
    }

    /// Offset of the blob that would hold `id`.
    ///
    /// An exact first-id hit returns that blob. Otherwise the last blob whose
    /// first id is below `id` owns it. An id below every entry resolves to the
    /// *last* blob's offset; callers must tolerate that over-inclusive answer.
    /// Returns `None` only for an empty table.
    pub fn lookup(&self, kind: ElementKind, id: i64) -> Option<i64> {
        let table = self.table(kind);
        let last = table.last()?;
        let upper = table.partition_point(|e| e.first_id <= id);
        if upper == 0 {
            return Some(last.offset);
        }
        Some(table[upper - 1].offset)
    }

    /// Offset of the first blob of `kind`
    pub fn first_offset(&self, kind: ElementKind) -> Option<i64> {
        self.table(kind).first().map(|e| e.offset)
    }

    /// Every blob offset of `kind`, in id order
    pub fn offsets(&self, kind: ElementKind) -> impl Iterator<Item = i64> + '_ {
        self.table(kind).iter().map(|e| e.offset)
    }

    /// Partition `ids` into one bucket per owning blob.
    ///
    /// Entry `i` owns `[first_id(i), first_id(i + 1))`, the last entry owns
    /// everything above its first id. Ids below the first entry are dropped.
    /// Buckets come back in table order and are never empty.
    pub fn bucket_offsets(
        &self,
        ids: impl IntoIterator<Item = i64>,
        kind: ElementKind,
    ) -> Vec<OffsetBucket> {
        let table = self.table(kind);
        let mut targets: Vec<i64> = ids.into_iter().collect();
        targets.sort_unstable();
        targets.dedup();

        let mut buckets = Vec::new();
        let Some(first) = table.first() else {
            return buckets;
        };

        let mut cursor = targets.partition_point(|&id| id < first.first_id);
        for (i, entry) in table.iter().enumerate() {
            if cursor == targets.len() {
                break;
            }
            let end = table.get(i + 1).map(|next| next.first_id);
            let start = cursor;
            while cursor < targets.len() && end.map_or(true, |end| targets[cursor] < end) {
                cursor += 1;
            }
            if cursor > start {
                buckets.push(OffsetBucket {
                    offset: entry.offset,
                    ids: targets[start..cursor].iter().copied().collect(),
                });
            }
        }

        debug!(
            kind = %kind,
            buckets = buckets.len(),
            offsets = table.len(),
            "Created offset buckets"
        );
        buckets
    }

    /// Serialize the three tables in cache format
    pub fn to_cache_bytes(&self) -> Vec<u8> {
        let entries = self.nodes.len() + self.ways.len() + self.relations.len();
        let mut buf = Vec::with_capacity(12 + entries * 16);
        for kind in ElementKind::ALL {
            let table = self.table(kind);
            buf.put_i32_le(table.len() as i32);
            for entry in table {
                buf.put_i64_le(entry.first_id);
                buf.put_i64_le(entry.offset);
            }
        }
        buf
    }

    /// Parse a cache file produced by [`to_cache_bytes`](Self::to_cache_bytes)
    pub fn from_cache_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Result<Self> {
        let path = path.into();
        let mut cur = bytes;
        let invalid = |reason: String| Error::InvalidCache {
            path: path.clone(),
            reason,
        };

        let mut tables = Vec::with_capacity(3);
        for kind in ElementKind::ALL {
            let table = read_table(&mut cur).map_err(|e| invalid(format!("{kind} table: {e}")))?;
            if table.windows(2).any(|w| w[0] > w[1]) {
                return Err(invalid(format!("{kind} table is not sorted")));
            }
            tables.push(table);
        }
        if cur.has_remaining() {
            return Err(invalid(format!("{} trailing bytes", cur.remaining())));
        }

        let relations = tables.pop().unwrap_or_default();
        let ways = tables.pop().unwrap_or_default();
        let nodes = tables.pop().unwrap_or_default();
        Ok(Self {
            path,
            nodes,
            ways,
            relations,
        })
    }
}

fn read_table(cur: &mut &[u8]) -> nightwatch_core::Result<Vec<OffsetEntry>> {
    let count = read_count_i32(cur)?;
    // Each entry is 16 bytes; refuse counts the input cannot back
    if count > cur.remaining() / 16 {
        return Err(nightwatch_core::Error::Truncated {
            needed: count.saturating_mul(16),
            available: cur.remaining(),
        });
    }
    (0..count)
        .map(|_| Ok(OffsetEntry::new(read_i64_le(cur)?, read_i64_le(cur)?)))
        .collect()
}
