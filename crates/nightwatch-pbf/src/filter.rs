//! Byte-level tag filter matching.
//!
//! Relation tags are string-table indices. Rather than decoding each relation's
//! tags to test them, the filter strings are matched against a blob's string
//! table once, turning the filter into index sets for that blob:
//!
//! 1. Filter keys and values are stored once each and bucketed by byte length
//! 2. Per blob, each string-table entry whose length has a bucket is compared
//!    byte-for-byte against that bucket's candidates
//! 3. The result ([`BlobTagFilter`]) maps string-table indices of filter keys to
//!    either "any value" or the set of string-table indices of accepted values
//!
//! A filter string missing from a blob's table simply cannot match there.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use nightwatch_core::{ElementFilter, ElementKind};

/// Distinct filter strings bucketed by byte length
#[derive(Debug, Clone)]
pub struct IndexedTagFilters {
    strings: Vec<Vec<u8>>,
    by_length: HashMap<usize, Vec<usize>>,
    /// (key string, accepted value strings); `None` accepts any value
    keys: Vec<(usize, Option<Vec<usize>>)>,
}

impl IndexedTagFilters {
    /// Index the tag constraints of every filter for `kind`.
    ///
    /// Returns `None` when nothing restricts `kind`: either no filter names it,
    /// or one of them has no tag constraints at all.
    pub fn for_kind(filters: &[ElementFilter], kind: ElementKind) -> Option<Self> {
        let mut relevant = filters.iter().filter(|f| f.kind == kind).peekable();
        if relevant.peek().is_none() || relevant.clone().any(|f| f.tags.is_empty()) {
            return None;
        }

        let mut indexed = Self {
            strings: Vec::new(),
            by_length: HashMap::new(),
            keys: Vec::new(),
        };
        let mut key_slots: HashMap<usize, usize> = HashMap::new();

        for tag in relevant.flat_map(|f| &f.tags) {
            let key = indexed.intern(tag.key.as_bytes());
            let values: Vec<usize> = tag
                .values
                .iter()
                .map(|v| indexed.intern(v.as_bytes()))
                .collect();

            let slot = *key_slots.entry(key).or_insert_with(|| {
                indexed.keys.push((key, Some(Vec::new())));
                indexed.keys.len() - 1
            });
            let accepted = &mut indexed.keys[slot].1;
            if values.is_empty() {
                *accepted = None;
            } else if let Some(accepted) = accepted {
                accepted.extend(values);
            }
        }

        Some(indexed)
    }

    fn intern(&mut self, bytes: &[u8]) -> usize {
        let bucket = self.by_length.entry(bytes.len()).or_default();
        if let Some(&existing) = bucket.iter().find(|&&id| self.strings[id] == bytes) {
            return existing;
        }
        self.strings.push(bytes.to_vec());
        let id = self.strings.len() - 1;
        bucket.push(id);
        id
    }

    /// Resolve the filter against one blob's string table
    pub fn resolve(&self, table: &[&[u8]]) -> BlobTagFilter {
        let mut positions: HashMap<usize, Vec<u32>> = HashMap::new();
        for (idx, entry) in table.iter().enumerate() {
            let Some(bucket) = self.by_length.get(&entry.len()) else {
                continue;
            };
            if let Some(&id) = bucket.iter().find(|&&id| self.strings[id] == *entry) {
                positions.entry(id).or_default().push(idx as u32);
            }
        }

        let mut keys: HashMap<u32, Option<HashSet<u32>>> = HashMap::new();
        for (key, values) in &self.keys {
            let Some(key_positions) = positions.get(key) else {
                continue;
            };
            let accepted = match values {
                None => None,
                Some(values) => {
                    let set: HashSet<u32> = values
                        .iter()
                        .filter_map(|v| positions.get(v))
                        .flatten()
                        .copied()
                        .collect();
                    if set.is_empty() {
                        continue;
                    }
                    Some(set)
                }
            };
            for &pos in key_positions {
                match keys.entry(pos) {
                    Entry::Vacant(slot) => {
                        slot.insert(accepted.clone());
                    }
                    Entry::Occupied(mut slot) => {
                        let merged = slot.get_mut();
                        match &accepted {
                            None => *merged = None,
                            Some(more) => {
                                if let Some(existing) = merged {
                                    existing.extend(more.iter().copied());
                                }
                            }
                        }
                    }
                }
            }
        }

        BlobTagFilter { keys }
    }
}

/// A tag filter resolved to string-table indices of one blob
#[derive(Debug, Clone, Default)]
pub struct BlobTagFilter {
    keys: HashMap<u32, Option<HashSet<u32>>>,
}

/// How one tag key relates to the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch<'a> {
    /// Key is not filtered on
    Miss,
    /// Key alone accepts the element
    Accept,
    /// Key accepts the element if its value is one of these
    Values(&'a HashSet<u32>),
}

impl BlobTagFilter {
    pub fn match_key(&self, key: u32) -> KeyMatch<'_> {
        match self.keys.get(&key) {
            None => KeyMatch::Miss,
            Some(None) => KeyMatch::Accept,
            Some(Some(values)) => KeyMatch::Values(values),
        }
    }

    /// True when no filter string occurs in the blob, so nothing can match
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
