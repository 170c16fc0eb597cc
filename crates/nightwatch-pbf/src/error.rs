//! PBF Layer Error Types
//!
//! ## Error Categories
//!
//! ### Decode Errors
//! - `Decode`: anything raised by `nightwatch_core` while walking blob bytes
//!   (truncation, schema violations, size mismatches). Always fatal.
//!
//! ### I/O Errors
//! - `Io`: opening, seeking or reading the container or the cache file
//!
//! ### Cache Errors
//! - `InvalidCache`: a persisted offset index that is short, unsorted or has trailing bytes
//!
//! ### Task Errors
//! - `Task`: a decode worker panicked or was cancelled
//! - `GateClosed`: work was dispatched after an earlier decode task failed
//!
//! ## Usage
//!
//! Everything in this crate returns `Result<T>` aliased to `Result<T, Error>`,
//! so core decode errors flow through `?` unchanged.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] nightwatch_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid index cache {path}: {reason}")]
    InvalidCache { path: PathBuf, reason: String },

    #[error("Invalid file offset: {0}")]
    InvalidOffset(i64),

    #[error("Decode task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Decode gate closed")]
    GateClosed,
}
