//! Readers for the asset containers of Ultima Online clients, plus the live map protocol that rewrites map files at runtime.
//!
//! Assets are shipped in two container flavors: the legacy [`mul`] pairs of data and index files, and the newer hash-indexed [`uop`] archives. Either one resolves ids to an [`ArchiveEntry`], which can then be overridden by the patches in [`verdata`]. Maps get their own block tables in [`map`], and [`live`] keeps a writable copy of them in sync with a server.

#![warn(
    clippy::pedantic,
    clippy::single_char_lifetime_names,
    clippy::std_instead_of_core
)]
#![allow(
    unknown_lints,
    clippy::enum_glob_use,
    clippy::missing_errors_doc,
    clippy::struct_field_names
)]

mod containers;
mod entry;
mod io;
pub mod live;
pub mod map;
pub mod mul;
mod protocols;
pub mod uop;
pub mod verdata;

pub use self::{
    containers::Mapping,
    entry::{ArchiveEntry, INVALID_OFFSET},
    io::{BorrowedSource, Endian, MappedArchive, OutOfRange, Sink, Source},
};

pub use bstr::{BStr, BString, ByteSlice, ByteVec};
