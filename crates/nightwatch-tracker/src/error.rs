//! Tracker Error Types
//!
//! - `Decode`: a core error, including `IdOutOfRange` for ids that do not fit
//!   the 32-bit way/relation fields and `Truncated` for short snapshots
//! - `Io`: reading or writing a snapshot file
//! - `InvalidSnapshot`: a snapshot that parses but is inconsistent

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] nightwatch_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid tracker snapshot: {0}")]
    InvalidSnapshot(String),
}
