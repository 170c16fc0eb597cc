pub mod binary;
pub mod changeset;
pub mod element;
pub mod error;
pub mod filter;
pub mod varint;
pub mod wire;

pub use changeset::Changeset;
pub use element::{ElementKind, Member, Relation, Tags, Way};
pub use error::{Error, Result};
pub use filter::{ElementFilter, TagFilter};
