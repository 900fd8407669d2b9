//! Verdata: load-time patches for the other archives
//!
//! `verdata.mul` starts with an `i32` record count followed by that many
//! 20-byte records: `u32 file_id, u32 block_id, u32 position, u32 length,
//! u32 extra`. Each record points at a payload stored elsewhere in the same
//! file, which replaces one block, entry, or table row of the archive named
//! by `file_id`.
//!
//! # Patching
//! ```rust,no_run
//! use std::path::Path;
//! use uofile::verdata::{Options, PatchTargets, Verdata};
//!
//! fn example(gumps: &mut [uofile::ArchiveEntry]) -> Option<()> {
//!     let verdata = Verdata::open(Path::new("path/to/ultima/verdata.mul")).ok()?;
//!     let options = Options::builder().legacy_client(true).build();
//!     let mut targets = PatchTargets {
//!         gumps: Some(gumps),
//!         ..Default::default()
//!     };
//!     let report = verdata.apply(&mut targets, &options);
//!     println!("{} applied, {} ignored", report.applied, report.ignored.len());
//!     Some(())
//! }
//! ```

mod apply;
mod tables;

pub use self::{
    apply::{IgnoreReason, PatchIgnored, PatchReport, PatchTargets},
    tables::{
        ArtTables, HueEntry, HueGroup, LandTile, SkillEntry, StaticTile, TileData, TileFlags,
    },
};

use crate::{
    containers::Mapping,
    entry::ArchiveEntry,
    io::{Endian, MappedArchive, OutOfRange, Source as _},
};
use std::{io, path::Path};
use tracing::info;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    OutOfRange(#[from] OutOfRange),
}

pub type Result<T> = core::result::Result<T, Error>;

/// See also [`Options`].
#[derive(Clone, Copy, Debug, Default)]
#[repr(transparent)]
pub struct OptionsBuilder(Options);

impl OptionsBuilder {
    #[must_use]
    pub fn build(self) -> Options {
        self.0
    }

    #[must_use]
    pub fn forced(mut self, forced: bool) -> Self {
        self.0.forced = forced;
        self
    }

    #[must_use]
    pub fn legacy_client(mut self, legacy_client: bool) -> Self {
        self.0.legacy_client = legacy_client;
        self
    }

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn wide_tile_flags(mut self, wide_tile_flags: bool) -> Self {
        self.0.wide_tile_flags = wide_tile_flags;
        self
    }
}

/// When verdata is applied, and how its tile data is laid out.
///
/// ```rust
/// use uofile::verdata::Options;
///
/// // clients older than 5.0.0a always apply verdata
/// let _ = Options::builder().legacy_client(true).build();
///
/// // clients from 7.0.9.0 on store tile flags as 64-bit values
/// let _ = Options::builder().forced(true).wide_tile_flags(true).build();
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    forced: bool,
    legacy_client: bool,
    wide_tile_flags: bool,
}

impl Options {
    #[must_use]
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::new()
    }

    /// Whether `verdata` should be applied at all.
    #[must_use]
    pub fn enabled(&self, verdata: &Verdata) -> bool {
        self.forced || self.legacy_client || !verdata.is_empty()
    }

    #[must_use]
    pub fn forced(&self) -> bool {
        self.forced
    }

    #[must_use]
    pub fn legacy_client(&self) -> bool {
        self.legacy_client
    }

    #[must_use]
    pub fn wide_tile_flags(&self) -> bool {
        self.wide_tile_flags
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PatchRecord {
    pub file_id: u32,
    pub block_id: u32,
    pub position: u32,
    pub length: u32,
    pub extra: u32,
}

/// A parsed `verdata.mul`.
#[derive(Clone, Debug, Default)]
pub struct Verdata {
    mapping: Mapping,
    patches: Vec<PatchRecord>,
}

impl Verdata {
    pub fn open(path: &Path) -> Result<Self> {
        let verdata = Self::from_mapping(Mapping::open(path)?)?;
        info!(
            "loaded {} verdata records from {}",
            verdata.len(),
            path.display()
        );
        Ok(verdata)
    }

    pub fn from_mapping(mapping: Mapping) -> Result<Self> {
        if mapping.is_empty() {
            return Ok(Self::default());
        }

        let mut source = MappedArchive::new(mapping.clone());
        let count = usize::try_from(source.read_i32()?).unwrap_or(0);
        let mut patches = Vec::with_capacity(count.min(source.remaining() / 20));
        for _ in 0..count {
            let (file_id, block_id, position, length, extra) = source.read(Endian::Little)?;
            patches.push(PatchRecord {
                file_id,
                block_id,
                position,
                length,
                extra,
            });
        }

        Ok(Self { mapping, patches })
    }

    /// An entry over the payload of `record`; invalid if it leaves the file.
    #[must_use]
    pub fn entry(&self, record: &PatchRecord) -> ArchiveEntry {
        match i32::try_from(record.length) {
            Ok(length) => ArchiveEntry::new(&self.mapping, record.position.into(), length, 0),
            Err(_) => ArchiveEntry::invalid(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    #[must_use]
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    #[must_use]
    pub fn patches(&self) -> &[PatchRecord] {
        &self.patches
    }
}
