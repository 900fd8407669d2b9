//! MUL/IDX: the legacy flat container
//!
//! A data file holds raw blobs back to back, and a separate index file holds one
//! 12-byte record per id: `u32 offset, i32 length, i32 extra`. Records are
//! addressed by their position in the index, and no compression is involved.
//!
//! # Reading
//! ```rust,no_run
//! use std::path::Path;
//! use uofile::mul::Archive;
//!
//! fn example() -> Option<()> {
//!     let archive = Archive::open(
//!         Path::new("path/to/ultima/gumpart.mul"),
//!         Path::new("path/to/ultima/gumpidx.mul"),
//!     )
//!     .ok()?;
//!     let entry = archive.resolve(0x0802);
//!     let bytes = entry.as_bytes()?;
//!     println!("{} bytes, {}x{}", bytes.len(), entry.width, entry.height);
//!     Some(())
//! }
//! ```

mod archive;

pub use self::archive::{build_index, Archive, RECORD_SIZE};

use crate::io::OutOfRange;
use std::io;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    OutOfRange(#[from] OutOfRange),
}

pub type Result<T> = core::result::Result<T, Error>;
