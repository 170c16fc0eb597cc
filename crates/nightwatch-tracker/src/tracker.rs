//! Relation change tracker.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use nightwatch_core::{Changeset, Way};
use parking_lot::RwLock;
use tracing::debug;

use crate::snapshot;
use crate::Result;

/// Reverse adjacency of tracked relations.
///
/// Way and relation ids are stored as `u32`, node ids as `i64`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct State {
    pub(crate) node_to_ways: HashMap<i64, HashSet<u32>>,
    pub(crate) way_to_relations: HashMap<u32, HashSet<u32>>,
    pub(crate) relations: HashSet<u32>,
}

/// Tracks which relations are affected when nodes, ways or relations change
#[derive(Debug, Default)]
pub struct RelationChangesTracker {
    state: RwLock<State>,
}

impl RelationChangesTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `relation` and record reverse edges for its member `ways`.
    ///
    /// A way registered by an earlier relation only gains the new relation;
    /// its nodes are not walked again. The whole registration happens under
    /// one write lock, and nothing is recorded if any id is out of range.
    pub fn add_relation(&self, relation: i64, ways: &[Way]) -> Result<()> {
        let relation = to_u32(relation)?;
        let way_ids = ways
            .iter()
            .map(|way| to_u32(way.id))
            .collect::<Result<Vec<_>>>()?;

        let mut state = self.state.write();
        let State {
            node_to_ways,
            way_to_relations,
            relations,
        } = &mut *state;

        relations.insert(relation);
        for (way, &way_id) in ways.iter().zip(&way_ids) {
            match way_to_relations.entry(way_id) {
                Entry::Occupied(mut known) => {
                    known.get_mut().insert(relation);
                }
                Entry::Vacant(slot) => {
                    slot.insert(HashSet::from([relation]));
                    for &node in &way.nodes {
                        node_to_ways.entry(node).or_default().insert(way_id);
                    }
                }
            }
        }
        Ok(())
    }

    /// Tracked relations reached by any id in `changeset`
    pub fn changed_relations(&self, changeset: &Changeset) -> HashSet<i64> {
        let state = self.state.read();
        let mut changed = HashSet::new();

        let mut add_way = |way: u32| {
            if let Some(relations) = state.way_to_relations.get(&way) {
                changed.extend(relations.iter().map(|&r| r as i64));
            }
        };

        for node in &changeset.nodes {
            if let Some(ways) = state.node_to_ways.get(node) {
                ways.iter().copied().for_each(&mut add_way);
            }
        }
        for &way in &changeset.ways {
            if let Ok(way) = u32::try_from(way) {
                add_way(way);
            }
        }
        for &relation in &changeset.relations {
            if u32::try_from(relation).is_ok_and(|r| state.relations.contains(&r)) {
                changed.insert(relation);
            }
        }

        changed
    }

    pub fn is_tracked(&self, relation: i64) -> bool {
        u32::try_from(relation).is_ok_and(|r| self.state.read().relations.contains(&r))
    }

    /// Ids of every tracked relation
    pub fn tracked_relations(&self) -> HashSet<i64> {
        self.state.read().relations.iter().map(|&r| r as i64).collect()
    }

    pub fn ways_for_node(&self, node: i64) -> HashSet<i64> {
        self.state
            .read()
            .node_to_ways
            .get(&node)
            .map(|ways| ways.iter().map(|&w| w as i64).collect())
            .unwrap_or_default()
    }

    pub fn relations_for_way(&self, way: i64) -> HashSet<i64> {
        let Ok(way) = u32::try_from(way) else {
            return HashSet::new();
        };
        self.state
            .read()
            .way_to_relations
            .get(&way)
            .map(|relations| relations.iter().map(|&r| r as i64).collect())
            .unwrap_or_default()
    }

    /// Number of tracked relations
    pub fn len(&self) -> usize {
        self.state.read().relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the tracker to its snapshot format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        snapshot::encode(&self.state.read())
    }

    /// Restore a tracker from snapshot bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            state: RwLock::new(snapshot::decode(bytes)?),
        })
    }

    /// Write a snapshot to `path`
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        tokio::fs::write(path, &bytes).await?;
        debug!(
            path = ?path,
            bytes = bytes.len(),
            relations = self.len(),
            "Saved tracker snapshot"
        );
        Ok(())
    }

    /// Load a snapshot written by [`save`](Self::save)
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let tracker = Self::from_bytes(&bytes)?;
        {
            let state = tracker.state.read();
            debug!(
                path = ?path,
                relations = state.relations.len(),
                ways = state.way_to_relations.len(),
                nodes = state.node_to_ways.len(),
                "Loaded tracker snapshot"
            );
        }
        Ok(tracker)
    }
}

fn to_u32(id: i64) -> Result<u32> {
    u32::try_from(id).map_err(|_| nightwatch_core::Error::IdOutOfRange(id).into())
}
