//! The error taxonomy shared by every component of the crate.
//!
//! Several of these kinds are not fatal: the reference tools this crate
//! reimplements are best-effort recovery tools, and most malformed input
//! conditions are handled by clamping or falling back rather than aborting.
//! Those kinds are surfaced as *warnings* alongside a best-effort result
//! (see [`crate::envelope`], [`crate::marshal`], [`crate::archive`]) rather
//! than through the `Err` side of a `Result`. The kinds that genuinely abort
//! an operation (`InvalidMagic`, `InvalidTag`) are returned as `Err`.

use std::io;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("archive header did not start with the expected magic bytes")]
    InvalidMagic,

    #[error("unknown marshal tag {tag:#04x} at offset {offset}")]
    InvalidTag { tag: u8, offset: usize },

    #[error("declared length exceeded the remaining buffer and was clamped")]
    ShortRead,

    #[error("envelope header matched no known variant")]
    UnrecognizedEnvelope,

    #[error("zlib stream could not be inflated")]
    Zlib,

    #[error("contents.json referenced a path with no matching archive entry: {0}")]
    MissingEntry(String),

    #[error("failed to decode archive entry, writing raw bytes instead: {0}")]
    DecodeFailure(String),

    #[error("input directory does not exist or is not a directory")]
    InvalidInputDirectory,

    #[error("output path was empty")]
    EmptyOutputPath,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

/// A best-effort result paired with any non-fatal warnings encountered while
/// producing it. Used by decoders that recover from malformed input by
/// clamping or falling back rather than aborting, per the policy column of
/// the error taxonomy.
#[derive(Debug)]
pub struct Report<T> {
    pub value: T,
    pub warnings: Vec<Error>,
}

impl<T> Report<T> {
    #[must_use]
    pub fn ok(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn new(value: T, warnings: Vec<Error>) -> Self {
        Self { value, warnings }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
