//! Changed element ids
//!
//! The merged changeset produced upstream is reduced to three id sets; only
//! membership is ever consulted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    pub nodes: HashSet<i64>,
    pub ways: HashSet<i64>,
    pub relations: HashSet<i64>,
}

impl Changeset {
    pub fn with_nodes(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.nodes.extend(ids);
        self
    }

    pub fn with_ways(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.ways.extend(ids);
        self
    }

    pub fn with_relations(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.relations.extend(ids);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.ways.is_empty() && self.relations.is_empty()
    }
}
