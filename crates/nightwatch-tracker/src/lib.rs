//! Nightwatch Change Tracker
//!
//! Answers "which watched relations does this changeset touch?" without
//! re-reading the container.
//!
//! ## How It Works
//!
//! Registering a relation records reverse edges for its member ways and their
//! nodes:
//!
//! ```text
//! node ──► ways ──► relations
//!          way  ──► relations
//! ```
//!
//! A changed node reaches relations through its ways, a changed way reaches
//! them directly, and a changed relation counts only if it is tracked.
//!
//! The graph only grows. It is persisted as a little-endian snapshot; see
//! [`snapshot`] for the layout.
//!
//! ## Usage Example
//!
//! ```ignore
//! use nightwatch_core::{Changeset, Way};
//! use nightwatch_tracker::RelationChangesTracker;
//!
//! let tracker = RelationChangesTracker::new();
//! tracker.add_relation(9_001, &[Way::new(70, vec![1, 2, 3])])?;
//!
//! let changed = tracker.changed_relations(&Changeset::default().with_nodes([2]));
//! assert!(changed.contains(&9_001));
//!
//! tracker.save("relations.snapshot").await?;
//! ```

pub mod error;
pub mod snapshot;
pub mod tracker;

pub use error::{Error, Result};
pub use tracker::RelationChangesTracker;
