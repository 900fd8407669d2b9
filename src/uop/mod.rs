//! UOP: the hash-indexed block-chain container
//!
//! A UOP archive starts with a small header pointing at the first directory
//! block. Each block holds a record count, the offset of the next block, and
//! that many 34-byte records. Records carry no names; instead each one is keyed
//! by [`create_hash`] of a synthetic file name such as
//! `build/gumpartlegacymul/00001234.tga`, which is rebuilt from a
//! [`NamePattern`] whenever an id is looked up.
//!
//! # Reading
//! ```rust,no_run
//! use std::path::Path;
//! use uofile::uop::{Archive, ArchiveOptions, NamePattern};
//!
//! fn example() -> Option<()> {
//!     let options = ArchiveOptions::builder()
//!         .pattern(NamePattern::new("build/gumpartlegacymul/", 8, ".tga"))
//!         .has_extra(true)
//!         .build();
//!     let archive = Archive::open(Path::new("path/to/ultima/gumpartLegacyMUL.uop"), options).ok()?;
//!     let entry = archive.resolve(0x0802);
//!     let bytes = archive.read(&entry).ok()?;
//!     println!("{} bytes, {}x{}", bytes.len(), entry.width, entry.height);
//!     Some(())
//! }
//! ```

mod archive;
mod hashing;

pub use self::{
    archive::{Archive, Header, Options as ArchiveOptions, OptionsBuilder as ArchiveOptionsBuilder},
    hashing::create_hash,
};

use crate::io::OutOfRange;
use core::num::TryFromIntError;
use std::io;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid magic read from archive header: {0:#010x}")]
    BadFormat(u32),

    #[error("buffer failed to decompress to the expected size... expected {expected} bytes, but got {actual} bytes")]
    DecompressionSizeMismatch { expected: usize, actual: usize },

    #[error("an operation on an integer would have truncated and corrupted data")]
    IntegralTruncation,

    #[error("unsupported compression flag: {0}")]
    UnsupportedCompression(i16),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    OutOfRange(#[from] OutOfRange),
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Self::IntegralTruncation
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Rebuilds the synthetic name an archive stores for a numeric id.
///
/// ```rust
/// use uofile::uop::NamePattern;
///
/// let pattern = NamePattern::new("build/map0legacymul/", 8, ".dat");
/// assert_eq!(pattern.format(1), "build/map0legacymul/00000001.dat");
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NamePattern {
    prefix: String,
    digits: usize,
    extension: String,
}

impl NamePattern {
    /// Names are hashed lowercase, so both parts are lowercased here.
    #[must_use]
    pub fn new(prefix: &str, digits: usize, extension: &str) -> Self {
        Self {
            prefix: prefix.to_ascii_lowercase(),
            digits,
            extension: extension.to_ascii_lowercase(),
        }
    }

    #[must_use]
    pub fn format(&self, id: usize) -> String {
        format!(
            "{}{id:0width$}{}",
            self.prefix,
            self.extension,
            width = self.digits
        )
    }

    #[must_use]
    pub fn hash(&self, id: usize) -> u64 {
        create_hash(self.format(id).as_bytes())
    }
}
