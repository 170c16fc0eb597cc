//! Tracker Snapshot Format
//!
//! All integers little-endian:
//!
//! ```text
//! u32 relation_count
//! u32 relation_id            x relation_count
//!
//! u32 way_count
//! { u32 way_id, u32 fanout, u32 relation_id x fanout }   x way_count
//!
//! u32 node_count
//! { i64 node_id, u32 fanout, u32 way_id x fanout }        x node_count
//! ```
//!
//! Fan-out is a full `u32`, so a way shared by more than 255 relations
//! round-trips exactly. Entries are written in ascending id order, making the
//! snapshot of a given state byte-for-byte deterministic.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use bytes::{Buf, BufMut};
use nightwatch_core::binary::{read_i64_le, read_u32_le};

use crate::tracker::State;
use crate::{Error, Result};

pub(crate) fn encode(state: &State) -> Result<Vec<u8>> {
    let mut buf = Vec::new();

    put_ids(&mut buf, &state.relations)?;

    buf.put_u32_le(count(state.way_to_relations.len())?);
    for (way, relations) in sorted(&state.way_to_relations) {
        buf.put_u32_le(*way);
        put_ids(&mut buf, relations)?;
    }

    buf.put_u32_le(count(state.node_to_ways.len())?);
    for (node, ways) in sorted(&state.node_to_ways) {
        buf.put_i64_le(*node);
        put_ids(&mut buf, ways)?;
    }

    Ok(buf)
}

pub(crate) fn decode(mut cur: &[u8]) -> Result<State> {
    let relations = read_ids(&mut cur)?;

    let ways = read_u32_le(&mut cur)? as usize;
    let mut way_to_relations = HashMap::with_capacity(ways.min(cur.remaining() / 8));
    for _ in 0..ways {
        let way = read_u32_le(&mut cur)?;
        let fanout = read_ids(&mut cur)?;
        if way_to_relations.insert(way, fanout).is_some() {
            return Err(Error::InvalidSnapshot(format!("way {} listed twice", way)));
        }
    }

    let nodes = read_u32_le(&mut cur)? as usize;
    let mut node_to_ways = HashMap::with_capacity(nodes.min(cur.remaining() / 12));
    for _ in 0..nodes {
        let node = read_i64_le(&mut cur)?;
        let fanout = read_ids(&mut cur)?;
        if node_to_ways.insert(node, fanout).is_some() {
            return Err(Error::InvalidSnapshot(format!("node {} listed twice", node)));
        }
    }

    if cur.has_remaining() {
        return Err(Error::InvalidSnapshot(format!(
            "{} trailing bytes",
            cur.remaining()
        )));
    }

    Ok(State {
        node_to_ways,
        way_to_relations,
        relations,
    })
}

fn count(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| Error::InvalidSnapshot(format!("{} entries exceed the u32 count field", len)))
}

fn put_ids(buf: &mut Vec<u8>, ids: &HashSet<u32>) -> Result<()> {
    buf.put_u32_le(count(ids.len())?);
    let mut ids: Vec<u32> = ids.iter().copied().collect();
    ids.sort_unstable();
    for id in ids {
        buf.put_u32_le(id);
    }
    Ok(())
}

fn read_ids(cur: &mut &[u8]) -> Result<HashSet<u32>> {
    let len = read_u32_le(cur)? as usize;
    if len > cur.remaining() / 4 {
        return Err(nightwatch_core::Error::Truncated {
            needed: len.saturating_mul(4),
            available: cur.remaining(),
        }
        .into());
    }
    (0..len).map(|_| Ok(read_u32_le(cur)?)).collect()
}

fn sorted<K: Ord + Hash, V>(map: &HashMap<K, V>) -> Vec<(&K, &V)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
    entries
}
