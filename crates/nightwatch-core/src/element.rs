//! Element Model
//!
//! The three OSM element kinds and the records the decoders hand back.
//!
//! Only the fields needed for indexing and relation resolution are modeled:
//! a [`Relation`] carries its members and tags, a [`Way`] its node ids.
//! Coordinates, metadata (`Info`) and changesets are never decoded.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Element kind, as used by the offset index and relation member lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    pub const ALL: [ElementKind; 3] = [ElementKind::Node, ElementKind::Way, ElementKind::Relation];

    /// Decode the `MemberType` enum stored in a relation's `types` field
    pub fn from_member_type(value: u64) -> Result<Self> {
        match value {
            0 => Ok(ElementKind::Node),
            1 => Ok(ElementKind::Way),
            2 => Ok(ElementKind::Relation),
            other => Err(Error::Schema(format!("unknown member type {}", other))),
        }
    }

    pub fn member_type(self) -> u64 {
        match self {
            ElementKind::Node => 0,
            ElementKind::Way => 1,
            ElementKind::Relation => 2,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
        };
        f.write_str(name)
    }
}

/// One entry of a relation's member list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub role: String,
    pub kind: ElementKind,
}

impl Member {
    pub fn new(id: i64, role: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            id,
            role: role.into(),
            kind,
        }
    }
}

/// Ordered tag set with unique keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags(Vec<(String, String)>);

impl Tags {
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Append a tag. Returns `false` (and keeps the existing value) if the key is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.contains_key(&key) {
            return false;
        }
        self.0.push((key, value.into()));
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Tags::default();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

/// A decoded relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub id: i64,
    pub members: Vec<Member>,
    pub tags: Tags,
}

impl Relation {
    /// Ids of members that are themselves relations
    pub fn child_relations(&self) -> impl Iterator<Item = i64> + '_ {
        self.members
            .iter()
            .filter(|m| m.kind == ElementKind::Relation)
            .map(|m| m.id)
    }
}

/// A way reduced to its node references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Way {
    pub id: i64,
    pub nodes: Vec<i64>,
}

impl Way {
    pub fn new(id: i64, nodes: Vec<i64>) -> Self {
        Self { id, nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_type_mapping() {
        for kind in ElementKind::ALL {
            assert_eq!(ElementKind::from_member_type(kind.member_type()).unwrap(), kind);
        }
        assert!(ElementKind::from_member_type(3).is_err());
    }

    #[test]
    fn test_tags_keep_first_value_for_duplicate_key() {
        let mut tags = Tags::default();
        assert!(tags.insert("boundary", "administrative"));
        assert!(!tags.insert("boundary", "postal_code"));
        assert_eq!(tags.get("boundary"), Some("administrative"));
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_tags_preserve_order() {
        let tags: Tags = [("type", "boundary"), ("admin_level", "2"), ("name", "X")]
            .into_iter()
            .collect();
        let keys: Vec<&str> = tags.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["type", "admin_level", "name"]);
    }

    #[test]
    fn test_child_relations() {
        let relation = Relation {
            id: 1,
            members: vec![
                Member::new(10, "outer", ElementKind::Way),
                Member::new(20, "subarea", ElementKind::Relation),
                Member::new(30, "admin_centre", ElementKind::Node),
            ],
            tags: Tags::default(),
        };
        assert_eq!(relation.child_relations().collect::<Vec<_>>(), [20]);
    }
}
