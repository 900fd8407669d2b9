//! Per-map block tables
//!
//! A map is stored as a grid of 8x8-tile blocks in column-major order, so block
//! `x * height + y` covers tiles `(x * 8.., y * 8..)`. Each block owns a fixed
//! 196-byte land slot (a 4-byte header followed by 64 three-byte cells) in
//! `map{N}.mul`, and a variable number of 7-byte static records in
//! `statics{N}.mul` located through the 12-byte records of `staidx{N}.mul`.
//!
//! Newer installations ship the land file as `map{N}LegacyMUL.uop`, where each
//! UOP entry holds 4096 consecutive blocks.
//!
//! Flat installations may also carry server-selected diffs: `mapdifl{N}.mul`
//! lists the blocks replaced by the 196-byte slots of `mapdif{N}.mul`, and
//! `stadifl{N}.mul` lists the blocks whose `staidx` records in
//! `stadifi{N}.mul` point into `stadif{N}.mul`. The server tells the client
//! how many of each to apply, see [`apply_map_diffs`].

use crate::{
    containers::Mapping,
    entry::ArchiveEntry,
    io::{BorrowedSource, Endian, OutOfRange, Source as _},
    uop::{self, NamePattern},
};
use std::{
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Size in bytes of one block in the land file.
pub const BLOCK_SIZE: usize = 0xC4;

/// Bytes in front of the land cells of a block.
pub const BLOCK_HEADER_SIZE: usize = 0x4;

/// Size in bytes of the land cells of a block.
pub const LAND_SIZE: usize = BLOCK_SIZE - BLOCK_HEADER_SIZE;

/// Size in bytes of one static record.
pub const STATIC_SIZE: usize = 0x7;

/// Size in bytes of one `staidx` record.
pub const STAIDX_SIZE: usize = 0xC;

/// The most statics a single block may reference.
pub const MAX_STATICS: u32 = 1024;

/// Blocks stored per entry of a hashed map file.
pub const BLOCKS_PER_UOP_ENTRY: usize = 4096;

/// Marks a `staidx` record without statics.
pub const EMPTY_LOOKUP: u32 = 0xFFFF_FFFF;

/// Physical map sizes in tiles, indexed by map id.
pub const DEFAULT_SIZES: [(u16, u16); 6] = [
    (7168, 4096),
    (7168, 4096),
    (2304, 1600),
    (2560, 2048),
    (1448, 1448),
    (1280, 4096),
];

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no map file found at {0}")]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    OutOfRange(#[from] OutOfRange),

    #[error(transparent)]
    Uop(#[from] uop::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

/// How many land and statics diffs of one map the server wants applied.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PatchCounts {
    pub map: u32,
    pub statics: u32,
}

impl PatchCounts {
    /// Reads a big-endian map count followed by that many `(map, statics)` pairs.
    ///
    /// Negative counts read as zero; counts past the known maps are dropped.
    pub fn parse(bytes: &[u8]) -> Result<Vec<Self>> {
        let mut source = BorrowedSource::from(bytes);
        let maps: i32 = source.read(Endian::Big)?;
        let maps = usize::try_from(maps).unwrap_or(0).min(DEFAULT_SIZES.len());
        let mut counts = Vec::with_capacity(maps);
        for _ in 0..maps {
            let (map, statics): (u32, u32) = source.read(Endian::Big)?;
            counts.push(Self { map, statics });
        }
        Ok(counts)
    }
}

/// Resets every table to its unpatched blocks, then applies `counts[i]` diffs to `tables[i]`.
///
/// Returns whether any block was replaced.
pub fn apply_map_diffs(tables: &mut [MapBlockTable], counts: &[PatchCounts]) -> bool {
    for table in tables.iter_mut() {
        table.reset_patches();
    }

    let mut applied = false;
    for (table, &counts) in tables.iter_mut().zip(counts) {
        applied |= table.apply_diffs(counts);
    }
    applied
}

/// The physical size in tiles of `map`, falling back to map 0 for unknown ids.
#[must_use]
pub fn default_size(map: usize) -> (u16, u16) {
    DEFAULT_SIZES.get(map).copied().unwrap_or(DEFAULT_SIZES[0])
}

/// The names a hashed land file uses for its entries.
#[must_use]
pub fn uop_pattern(map: usize) -> NamePattern {
    NamePattern::new(&format!("build/map{map}legacymul/"), 8, ".dat")
}

/// Reads the `staidx` record for `block`, returning the statics it points at.
///
/// Records that are missing, empty, or point outside of `statics` produce an
/// invalid entry and a count of zero.
#[must_use]
pub fn read_static_index(staidx: &Mapping, statics: &Mapping, block: usize) -> (ArchiveEntry, u32) {
    let record = block
        .checked_mul(STAIDX_SIZE)
        .and_then(|pos| staidx.slice(pos, 8));
    let Some(record) = record else {
        return (ArchiveEntry::invalid(), 0);
    };

    let mut source = BorrowedSource::from(record);
    let (lookup, length): (u32, u32) = match source.read(Endian::Little) {
        Ok(x) => x,
        Err(_) => return (ArchiveEntry::invalid(), 0),
    };
    if lookup == EMPTY_LOOKUP || length == 0 {
        return (ArchiveEntry::invalid(), 0);
    }

    let Ok(length) = i32::try_from(length) else {
        return (ArchiveEntry::invalid(), 0);
    };
    let entry = ArchiveEntry::new(statics, lookup.into(), length, 0);
    if entry.is_valid() {
        let count = static_count(entry.length);
        (entry, count)
    } else {
        (ArchiveEntry::invalid(), 0)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn static_count(length: i32) -> u32 {
    let count = u32::try_from(length).unwrap_or(0) / STATIC_SIZE as u32;
    count.min(MAX_STATICS)
}

/// Where the land slots of a map come from.
#[derive(Clone, Debug)]
pub enum MapSource {
    Flat(Mapping),
    Hashed(uop::Archive),
}

impl MapSource {
    /// Opens `map{N}LegacyMUL.uop` if present, else `map{N}.mul`.
    pub fn open(directory: &Path, map: usize) -> Result<Self> {
        let hashed = directory.join(format!("map{map}LegacyMUL.uop"));
        if hashed.is_file() {
            let options = uop::ArchiveOptions::builder()
                .pattern(uop_pattern(map))
                .build();
            return Ok(Self::Hashed(uop::Archive::open(&hashed, options)?));
        }

        let flat = directory.join(format!("map{map}.mul"));
        if flat.is_file() {
            return Ok(Self::Flat(Mapping::open(&flat)?));
        }

        Err(Error::FileNotFound(flat))
    }

    /// The land slot of `block`, or an invalid entry if the source does not hold it.
    #[must_use]
    pub fn land(&self, block: usize) -> ArchiveEntry {
        let (file, slot) = self.locate(block);
        Self::land_at(self.base(file), slot)
    }

    /// The mapping and starting offset of the land file holding file number `file`.
    fn base(&self, file: usize) -> Option<(&Mapping, i64)> {
        match self {
            Self::Flat(mapping) => Some((mapping, 0)),
            Self::Hashed(archive) => {
                let entry = archive.resolve(file);
                entry.is_valid().then(|| (archive.mapping(), entry.offset))
            }
        }
    }

    fn land_at(base: Option<(&Mapping, i64)>, slot: usize) -> ArchiveEntry {
        let Some((mapping, base)) = base else {
            return ArchiveEntry::invalid();
        };
        match i64::try_from(slot * BLOCK_SIZE) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            Ok(offset) => ArchiveEntry::new(mapping, base + offset, BLOCK_SIZE as i32, 0),
            Err(_) => ArchiveEntry::invalid(),
        }
    }

    fn locate(&self, block: usize) -> (usize, usize) {
        match self {
            Self::Flat(_) => (0, block),
            Self::Hashed(_) => (block / BLOCKS_PER_UOP_ENTRY, block % BLOCKS_PER_UOP_ENTRY),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockIndex {
    pub land: ArchiveEntry,
    pub statics: ArchiveEntry,
    pub static_count: u32,
}

impl BlockIndex {
    /// The 64 land cells of the block, without the header.
    #[must_use]
    pub fn land_cells(&self) -> Option<&[u8]> {
        self.land.as_bytes()?.get(BLOCK_HEADER_SIZE..BLOCK_SIZE)
    }

    /// The raw static records of the block.
    #[must_use]
    pub fn static_bytes(&self) -> Option<&[u8]> {
        let bytes = self.statics.as_bytes()?;
        bytes.get(..self.static_count as usize * STATIC_SIZE)
    }
}

/// The diff files of one map.
#[derive(Clone, Debug, Default)]
pub struct MapDiff {
    pub map_list: Mapping,
    pub map: Mapping,
    pub statics_list: Mapping,
    pub statics_index: Mapping,
    pub statics: Mapping,
}

impl MapDiff {
    /// Opens the diffs of `map`, or `None` if `mapdifl{N}.mul` is missing.
    pub fn open(directory: &Path, map: usize) -> Result<Option<Self>> {
        let map_list = directory.join(format!("mapdifl{map}.mul"));
        if !map_list.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            map_list: Mapping::open(&map_list)?,
            map: open_optional(&directory.join(format!("mapdif{map}.mul")))?,
            statics_list: open_optional(&directory.join(format!("stadifl{map}.mul")))?,
            statics_index: open_optional(&directory.join(format!("stadifi{map}.mul")))?,
            statics: open_optional(&directory.join(format!("stadif{map}.mul")))?,
        }))
    }

    /// The `i`th block id of a diff list.
    fn listed(list: &Mapping, i: usize) -> Option<usize> {
        let bytes = list.slice(i * 4, 4)?;
        let id = BorrowedSource::from(bytes).read_u32().ok()?;
        usize::try_from(id).ok()
    }
}

/// The land and statics location of every block of one map.
#[derive(Clone, Debug, Default)]
pub struct MapBlockTable {
    blocks: Vec<BlockIndex>,
    original: Vec<BlockIndex>,
    diff: Option<MapDiff>,
    width: usize,
    height: usize,
}

impl MapBlockTable {
    /// Builds the table for `size` (in tiles) from already opened files.
    #[must_use]
    pub fn new(source: &MapSource, staidx: &Mapping, statics: &Mapping, size: (u16, u16)) -> Self {
        let width = usize::from(size.0 >> 3);
        let height = usize::from(size.1 >> 3);
        let mut cache = None;
        let mut blocks = Vec::with_capacity(width * height);
        for block in 0..width * height {
            let (file, slot) = source.locate(block);
            let base = match cache {
                Some((cached, base)) if cached == file => base,
                _ => {
                    let base = source.base(file);
                    cache = Some((file, base));
                    base
                }
            };
            let (statics, static_count) = read_static_index(staidx, statics, block);
            blocks.push(BlockIndex {
                land: MapSource::land_at(base, slot),
                statics,
                static_count,
            });
        }

        Self {
            original: blocks.clone(),
            blocks,
            diff: None,
            width,
            height,
        }
    }

    #[must_use]
    pub fn with_diff(mut self, diff: MapDiff) -> Self {
        self.diff = Some(diff);
        self
    }

    /// Loads map `map` from an installation directory.
    ///
    /// Missing `staidx`/`statics` files leave every block without statics.
    pub fn open(directory: &Path, map: usize, size: (u16, u16)) -> Result<Self> {
        let source = MapSource::open(directory, map)?;
        let staidx = open_optional(&directory.join(format!("staidx{map}.mul")))?;
        let statics = open_optional(&directory.join(format!("statics{map}.mul")))?;
        let mut table = Self::new(&source, &staidx, &statics, size);
        if let MapSource::Flat(_) = source {
            table.diff = MapDiff::open(directory, map)?;
        }
        info!(
            "loaded map {map}: {}x{} blocks from {}",
            table.width,
            table.height,
            directory.display()
        );
        Ok(table)
    }

    /// Points the first `counts.map` listed land slots and the first
    /// `counts.statics` listed statics at their diffs. Returns whether any
    /// block was replaced.
    ///
    /// Diffs stack on top of the current blocks; see [`apply_map_diffs`] for
    /// the reset that normally comes first.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn apply_diffs(&mut self, counts: PatchCounts) -> bool {
        let Some(diff) = &self.diff else {
            return false;
        };
        let mut applied = false;

        if counts.map != 0 && !diff.map_list.is_empty() && !diff.map.is_empty() {
            let listed = diff.map_list.len() / 4;
            for i in 0..listed.min(counts.map as usize) {
                let Some(slot) = MapDiff::listed(&diff.map_list, i)
                    .and_then(|block| self.blocks.get_mut(block))
                else {
                    continue;
                };
                slot.land = ArchiveEntry::new(&diff.map, (i * BLOCK_SIZE) as i64, BLOCK_SIZE as i32, 0);
                applied = true;
            }
        }

        if counts.statics != 0
            && !diff.statics_list.is_empty()
            && !diff.statics_index.is_empty()
            && !diff.statics.is_empty()
        {
            let listed = diff.statics_list.len() / 4;
            for i in 0..listed.min(counts.statics as usize) {
                if diff.statics_index.slice(i * STAIDX_SIZE, STAIDX_SIZE).is_none() {
                    break;
                }
                let Some(slot) = MapDiff::listed(&diff.statics_list, i)
                    .and_then(|block| self.blocks.get_mut(block))
                else {
                    continue;
                };
                let (statics, static_count) =
                    read_static_index(&diff.statics_index, &diff.statics, i);
                slot.statics = statics;
                slot.static_count = static_count;
                applied = true;
            }
        }

        debug!("applied map diffs {counts:?}: {applied}");
        applied
    }

    #[must_use]
    pub fn block(&self, block: usize) -> Option<&BlockIndex> {
        self.blocks.get(block)
    }

    #[must_use]
    pub fn blocks(&self) -> &[BlockIndex] {
        &self.blocks
    }

    #[must_use]
    pub fn height_in_blocks(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Points the land slot of `block` at `land`. Returns `false` if `block` is out of range.
    ///
    /// The patch becomes part of the unpatched state that [`Self::reset_patches`] restores.
    pub fn patch_map_block(&mut self, block: usize, land: ArchiveEntry) -> bool {
        let (Some(slot), Some(original)) =
            (self.blocks.get_mut(block), self.original.get_mut(block))
        else {
            return false;
        };
        original.land = land.clone();
        slot.land = land;
        true
    }

    /// Points the statics of `block` at `statics`, deriving the record count from its length.
    ///
    /// Like [`Self::patch_map_block`], this survives [`Self::reset_patches`].
    pub fn patch_static_block(&mut self, block: usize, statics: ArchiveEntry) -> bool {
        let (Some(slot), Some(original)) =
            (self.blocks.get_mut(block), self.original.get_mut(block))
        else {
            return false;
        };
        let static_count = if statics.is_valid() {
            static_count(statics.length)
        } else {
            0
        };
        *original = BlockIndex {
            land: original.land.clone(),
            statics: statics.clone(),
            static_count,
        };
        slot.statics = statics;
        slot.static_count = static_count;
        true
    }

    /// Drops every applied diff.
    pub fn reset_patches(&mut self) {
        self.blocks.clone_from(&self.original);
    }

    #[must_use]
    pub fn width_in_blocks(&self) -> usize {
        self.width
    }
}

fn open_optional(path: &Path) -> Result<Mapping> {
    if path.is_file() {
        Ok(Mapping::open(path)?)
    } else {
        debug!("{} is missing, treating it as empty", path.display());
        Ok(Mapping::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Sink;
    use std::fs;

    fn land_file(blocks: usize) -> Vec<u8> {
        (0..blocks)
            .flat_map(|block| {
                let mut bytes = vec![block as u8; BLOCK_SIZE];
                bytes[..BLOCK_HEADER_SIZE].fill(0);
                bytes
            })
            .collect()
    }

    fn staidx(records: &[(u32, u32)]) -> anyhow::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut sink = Sink::new(&mut out);
        for &(lookup, length) in records {
            sink.write(&(lookup, length, 0u32), Endian::Little)?;
        }
        Ok(out)
    }

    #[test]
    fn default_state() {
        let table = MapBlockTable::default();
        assert!(table.is_empty());
        assert!(table.block(0).is_none());
        assert_eq!(default_size(3), (2560, 2048));
        assert_eq!(default_size(100), default_size(0));
    }

    #[test]
    fn flat_maps_index_blocks_column_major() -> anyhow::Result<()> {
        let source = MapSource::Flat(Mapping::from_owned(land_file(4)));
        let statics = Mapping::from_owned(vec![0x11; STATIC_SIZE * 3]);
        let index = Mapping::from_owned(staidx(&[
            (0, (STATIC_SIZE * 2) as u32),
            (EMPTY_LOOKUP, 7),
            (STATIC_SIZE as u32 * 2, STATIC_SIZE as u32),
            (100, 7),
        ])?);

        let table = MapBlockTable::new(&source, &index, &statics, (16, 16));
        assert_eq!((table.width_in_blocks(), table.height_in_blocks()), (2, 2));
        assert_eq!(table.len(), 4);

        for (id, block) in table.blocks().iter().enumerate() {
            assert_eq!(block.land.offset, (id * BLOCK_SIZE) as i64);
            assert_eq!(block.land_cells(), Some(&vec![id as u8; LAND_SIZE][..]));
        }

        let counts: Vec<_> = table.blocks().iter().map(|x| x.static_count).collect();
        assert_eq!(counts, [2, 0, 1, 0]);
        assert_eq!(table.blocks()[0].static_bytes().map(<[u8]>::len), Some(14));
        assert!(!table.blocks()[3].statics.is_valid());
        Ok(())
    }

    #[test]
    fn static_counts_are_capped() -> anyhow::Result<()> {
        let len = (MAX_STATICS as usize + 1) * STATIC_SIZE;
        let statics = Mapping::from_owned(vec![0; len]);
        let index = Mapping::from_owned(staidx(&[(0, len as u32)])?);
        let (entry, count) = read_static_index(&index, &statics, 0);
        assert!(entry.is_valid());
        assert_eq!(count, MAX_STATICS);
        assert_eq!(read_static_index(&index, &statics, 1), (ArchiveEntry::invalid(), 0));
        Ok(())
    }

    #[test]
    fn hashed_maps_offset_into_entries() -> anyhow::Result<()> {
        const HEADER_SIZE: i64 = 0x1C;
        let payload = land_file(2);
        let mut bytes = Vec::new();
        let mut sink = Sink::new(&mut bytes);
        let block_offset = HEADER_SIZE + payload.len() as i64;
        sink.write(
            &(u32::from_le_bytes(*b"MYP\0"), 5u32, 0u32, block_offset, 1u32, 1i32),
            Endian::Little,
        )?;
        sink.write_bytes(&payload)?;
        sink.write(&(1i32, 0i64), Endian::Little)?;
        sink.write(
            &(
                HEADER_SIZE,
                0i32,
                payload.len() as i32,
                payload.len() as i32,
                uop_pattern(0).hash(0),
                0u32,
                0i16,
            ),
            Endian::Little,
        )?;

        let options = uop::ArchiveOptions::builder().pattern(uop_pattern(0)).build();
        let archive = uop::Archive::from_mapping(Mapping::from_owned(bytes), options)?;
        let source = MapSource::Hashed(archive);

        let table = MapBlockTable::new(&source, &Mapping::default(), &Mapping::default(), (8, 24));
        assert_eq!(table.len(), 3);
        assert_eq!(table.blocks()[0].land.offset, HEADER_SIZE);
        assert_eq!(table.blocks()[1].land_cells(), Some(&[1u8; LAND_SIZE][..]));
        assert!(!table.blocks()[2].land.is_valid());
        assert!(!source.land(BLOCKS_PER_UOP_ENTRY).is_valid());
        Ok(())
    }

    #[test]
    fn patches_replace_slots() -> anyhow::Result<()> {
        let source = MapSource::Flat(Mapping::from_owned(land_file(1)));
        let mut table = MapBlockTable::new(&source, &Mapping::default(), &Mapping::default(), (8, 8));
        let patch = Mapping::from_owned(vec![0x22; BLOCK_SIZE + STATIC_SIZE * 2]);

        assert!(table.patch_map_block(0, ArchiveEntry::new(&patch, 0, BLOCK_SIZE as i32, 0)));
        assert_eq!(table.blocks()[0].land_cells(), Some(&[0x22; LAND_SIZE][..]));
        assert!(table.patch_static_block(
            0,
            ArchiveEntry::new(&patch, BLOCK_SIZE as i64, (STATIC_SIZE * 2) as i32, 0)
        ));
        assert_eq!(table.blocks()[0].static_count, 2);

        assert!(!table.patch_map_block(1, ArchiveEntry::invalid()));
        assert!(!table.patch_static_block(1, ArchiveEntry::invalid()));
        Ok(())
    }

    fn id_list(ids: &[u32]) -> Vec<u8> {
        ids.iter().flat_map(|x| x.to_le_bytes()).collect()
    }

    fn diffed_table() -> anyhow::Result<MapBlockTable> {
        let source = MapSource::Flat(Mapping::from_owned(land_file(4)));
        let statics = Mapping::from_owned(vec![0x11; STATIC_SIZE]);
        let index = Mapping::from_owned(staidx(&[(0, STATIC_SIZE as u32)])?);
        let mut dif = land_file(3);
        for (i, slot) in dif.chunks_exact_mut(BLOCK_SIZE).enumerate() {
            slot[BLOCK_HEADER_SIZE..].fill(0xA0 + i as u8);
        }

        let diff = MapDiff {
            map_list: Mapping::from_owned(id_list(&[2, 9, 1])),
            map: Mapping::from_owned(dif),
            statics_list: Mapping::from_owned(id_list(&[3, 0])),
            statics_index: Mapping::from_owned(staidx(&[
                (0, (STATIC_SIZE * 2) as u32),
                (EMPTY_LOOKUP, 0),
            ])?),
            statics: Mapping::from_owned(vec![0x55; STATIC_SIZE * 2]),
        };
        Ok(MapBlockTable::new(&source, &index, &statics, (16, 16)).with_diff(diff))
    }

    #[test]
    fn diffs_replace_listed_blocks() -> anyhow::Result<()> {
        let mut table = diffed_table()?;
        let applied = apply_map_diffs(
            std::slice::from_mut(&mut table),
            &[PatchCounts { map: 2, statics: 5 }],
        );
        assert!(applied);

        let blocks = table.blocks();
        assert_eq!(blocks[2].land_cells(), Some(&[0xA0; LAND_SIZE][..]));
        assert_eq!(blocks[1].land_cells(), Some(&[1; LAND_SIZE][..]));
        assert_eq!(blocks[3].static_count, 2);
        assert_eq!(blocks[3].static_bytes(), Some(&[0x55; STATIC_SIZE * 2][..]));
        assert_eq!(blocks[0].static_count, 0);
        assert!(!blocks[0].statics.is_valid());
        Ok(())
    }

    #[test]
    fn diffs_reset_to_the_unpatched_blocks() -> anyhow::Result<()> {
        let mut table = diffed_table()?;
        let patch = Mapping::from_owned(vec![0x22; BLOCK_SIZE]);
        assert!(table.patch_map_block(1, ArchiveEntry::new(&patch, 0, BLOCK_SIZE as i32, 0)));
        assert!(table.apply_diffs(PatchCounts { map: 3, statics: 2 }));
        assert_eq!(table.blocks()[1].land_cells(), Some(&[0xA2; LAND_SIZE][..]));

        let mut tables = [table];
        assert!(!apply_map_diffs(&mut tables, &[PatchCounts::default()]));
        let blocks = tables[0].blocks();
        assert_eq!(blocks[1].land_cells(), Some(&[0x22; LAND_SIZE][..]));
        assert_eq!(blocks[2].land_cells(), Some(&[2; LAND_SIZE][..]));
        assert_eq!(blocks[0].static_count, 1);
        assert_eq!(blocks[3].static_count, 0);

        assert!(!MapBlockTable::default().apply_diffs(PatchCounts { map: 1, statics: 1 }));
        Ok(())
    }

    #[test]
    fn patch_counts() -> anyhow::Result<()> {
        let mut bytes = Vec::new();
        for value in [2u32, 3, 4, 0, 1] {
            bytes.extend(value.to_be_bytes());
        }
        assert_eq!(
            PatchCounts::parse(&bytes)?,
            [
                PatchCounts { map: 3, statics: 4 },
                PatchCounts { map: 0, statics: 1 },
            ]
        );
        assert!(PatchCounts::parse(&(-1i32).to_be_bytes())?.is_empty());

        let mut many = 9u32.to_be_bytes().to_vec();
        many.resize(4 + 9 * 8, 0);
        assert_eq!(PatchCounts::parse(&many)?.len(), DEFAULT_SIZES.len());

        match PatchCounts::parse(&bytes[..12]) {
            Err(Error::OutOfRange(_)) => Ok(()),
            other => anyhow::bail!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn opens_diff_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(MapDiff::open(dir.path(), 0)?.is_none());

        fs::write(dir.path().join("map0.mul"), land_file(2))?;
        fs::write(dir.path().join("mapdifl0.mul"), id_list(&[1]))?;
        fs::write(dir.path().join("mapdif0.mul"), vec![0x33; BLOCK_SIZE])?;
        let diff = MapDiff::open(dir.path(), 0)?;
        assert!(diff.is_some_and(|x| x.statics.is_empty() && x.map.len() == BLOCK_SIZE));

        let mut table = MapBlockTable::open(dir.path(), 0, (8, 16))?;
        assert!(table.apply_diffs(PatchCounts { map: 1, statics: 1 }));
        assert_eq!(table.blocks()[1].land_cells(), Some(&[0x33; LAND_SIZE][..]));
        Ok(())
    }

    #[test]
    fn opens_installation_directories() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        match MapBlockTable::open(dir.path(), 2, (8, 8)) {
            Err(Error::FileNotFound(path)) => assert!(path.ends_with("map2.mul")),
            other => anyhow::bail!("unexpected result: {other:?}"),
        }

        fs::write(dir.path().join("map2.mul"), land_file(2))?;
        fs::write(dir.path().join("staidx2.mul"), staidx(&[(0, 7)])?)?;
        fs::write(dir.path().join("statics2.mul"), [0u8; 7])?;
        let table = MapBlockTable::open(dir.path(), 2, (8, 16))?;
        assert_eq!(table.len(), 2);
        assert_eq!(table.blocks()[0].static_count, 1);
        assert_eq!(table.blocks()[1].static_count, 0);
        Ok(())
    }
}
