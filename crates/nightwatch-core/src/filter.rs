//! Tag Filter Declarations
//!
//! Callers describe which elements they care about as a list of
//! [`ElementFilter`]s. Each filter names an element kind and a list of tag
//! constraints; an element matches when **any** constraint matches:
//!
//! - a [`TagFilter`] with no values matches any element carrying the key
//! - a [`TagFilter`] with values matches when the key carries one of them
//!
//! ```ignore
//! let filters = vec![
//!     ElementFilter::new(ElementKind::Relation)
//!         .with_key("boundary")
//!         .with_values("type", ["multipolygon", "boundary"]),
//! ];
//! ```
//!
//! Decoders match these against raw string-table bytes; see
//! `nightwatch_pbf::IndexedTagFilters`.

use serde::{Deserialize, Serialize};

use crate::ElementKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    pub key: String,
    /// Accepted values. Empty means "any value".
    #[serde(default)]
    pub values: Vec<String>,
}

impl TagFilter {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: Vec::new(),
        }
    }

    pub fn key_values<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementFilter {
    pub kind: ElementKind,
    pub tags: Vec<TagFilter>,
}

impl ElementFilter {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            tags: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.tags.push(TagFilter::key(key));
        self
    }

    pub fn with_values<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.push(TagFilter::key_values(key, values));
        self
    }
}
