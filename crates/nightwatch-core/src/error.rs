//! Error Types for Nightwatch
//!
//! This module defines the errors raised while decoding a PBF container.
//!
//! ## Error Categories
//!
//! ### Truncation
//! - `Truncated`: fewer bytes remain than a declared length or fixed-width read demands
//! - `VarintOverflow`: a varint ran past ten bytes or does not fit in 64 bits
//!
//! ### Schema Violations
//! - `UnexpectedField`: a field tag/wire type outside the subset this decoder understands
//! - `Schema`: structural problems (mismatched parallel arrays, dangling string indexes, ...)
//! - `UnexpectedBlobType`: a blob header that is neither `OSMHeader` nor `OSMData` where expected
//! - `InvalidUtf8`: a string-table entry that is not UTF-8
//!
//! ### Payload Corruption
//! - `SizeMismatch`: the decompressed length disagrees with the declared `raw_size`
//! - `Decompression`: the inflater rejected the payload
//!
//! ### Identifier Range
//! - `IdOutOfRange`: an id that does not fit a 32-bit persisted field
//!
//! None of these are retried. Decoding assumes a static, trustworthy container, so the
//! first error aborts the whole build or load.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Truncated input: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Varint longer than 10 bytes")]
    VarintOverflow,

    #[error("Unexpected field {field} (wire type {wire_type}) in {context}")]
    UnexpectedField {
        context: &'static str,
        field: u32,
        wire_type: u8,
    },

    #[error("Schema violation: {0}")]
    Schema(String),

    #[error("Decompressed size mismatch: declared {declared}, got {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Unexpected blob type: expected {expected}, found {found}")]
    UnexpectedBlobType { expected: &'static str, found: String },

    #[error("Invalid UTF-8 in string table")]
    InvalidUtf8,

    #[error("Id {0} does not fit in 32 bits")]
    IdOutOfRange(i64),
}

pub type Result<T> = std::result::Result<T, Error>;
