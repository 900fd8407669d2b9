//! Shard directories: naming, bootstrapping and mapping the per-map files.

use crate::{
    entry::ArchiveEntry,
    live::{Error, MapSizing, Result},
    map::{self, BLOCK_HEADER_SIZE, BLOCK_SIZE, EMPTY_LOOKUP, STAIDX_SIZE},
    uop,
};
use bstr::ByteSlice as _;
use memmap2::MmapMut;
use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Read as _, Write as _},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// The land cell a synthesized map is paved with: tile `0x0244`, altitude 0.
const BLANK_CELL: [u8; 3] = [0x44, 0x02, 0x00];

/// Checks that `name` can be used as a single directory component.
pub fn validate_shard_name(name: &[u8]) -> Result<&str> {
    let name = name.to_str().map_err(|_| Error::InvalidShardName)?;
    let valid = name.is_ascii()
        && !name.trim().is_empty()
        && !name.contains(|x| x == '/' || x == '\\')
        && name != "."
        && name != "..";
    if valid {
        Ok(name)
    } else {
        Err(Error::InvalidShardName)
    }
}

pub(crate) fn map_path(directory: &Path, map: u8) -> PathBuf {
    directory.join(format!("map{map}.mul"))
}

pub(crate) fn staidx_path(directory: &Path, map: u8) -> PathBuf {
    directory.join(format!("staidx{map}.mul"))
}

pub(crate) fn statics_path(directory: &Path, map: u8) -> PathBuf {
    directory.join(format!("statics{map}.mul"))
}

/// Makes sure `shard` holds the files of `map`, deriving them from `base` where needed.
pub(crate) fn bootstrap(base: &Path, shard: &Path, map: u8, sizing: &MapSizing) -> Result<()> {
    let target = map_path(shard, map);
    if !target.is_file() {
        let hashed = base.join(format!("map{map}LegacyMUL.uop"));
        let flat = map_path(base, map);
        if hashed.is_file() {
            convert_hashed_map(&hashed, &target, map)?;
        } else if flat.is_file() {
            copy_if_missing(&flat, &target)?;
        } else {
            create_blank_map(shard, map, sizing)?;
        }
    }

    copy_if_missing(&statics_path(base, map), &statics_path(shard, map))?;
    copy_if_missing(&staidx_path(base, map), &staidx_path(shard, map))?;
    Ok(())
}

fn convert_hashed_map(source: &Path, target: &Path, map: u8) -> Result<()> {
    info!("converting {} to {}", source.display(), target.display());
    let options = uop::ArchiveOptions::builder()
        .pattern(map::uop_pattern(map.into()))
        .build();
    let archive = uop::Archive::open(source, options)?;
    let mut entries = vec![ArchiveEntry::invalid(); archive.total_entries()];
    archive.fill_entries(&mut entries);

    let mut out = BufWriter::new(File::create(target)?);
    for entry in entries.iter().filter(|x| x.is_valid()) {
        out.write_all(&archive.read(entry)?)?;
    }
    out.flush()?;
    Ok(())
}

fn copy_if_missing(source: &Path, target: &Path) -> Result<()> {
    let missing = fs::metadata(target).map_or(true, |x| x.len() == 0);
    if missing && source.is_file() {
        info!("copying {} to {}", source.display(), target.display());
        fs::copy(source, target)?;
    }
    Ok(())
}

fn create_blank_map(shard: &Path, map: u8, sizing: &MapSizing) -> Result<()> {
    let blocks = sizing.block_count() as usize;
    info!(
        "creating a blank map {map} of {}x{} blocks in {}",
        sizing.width_in_blocks(),
        sizing.height_in_blocks(),
        shard.display()
    );

    let mut block = [0u8; BLOCK_SIZE];
    for cell in block[BLOCK_HEADER_SIZE..].chunks_exact_mut(BLANK_CELL.len()) {
        cell.copy_from_slice(&BLANK_CELL);
    }
    let mut out = BufWriter::new(File::create(map_path(shard, map))?);
    for _ in 0..blocks {
        out.write_all(&block)?;
    }
    out.flush()?;

    let mut record = [0u8; STAIDX_SIZE];
    record[..4].copy_from_slice(&EMPTY_LOOKUP.to_le_bytes());
    let mut out = BufWriter::new(File::create(staidx_path(shard, map))?);
    for _ in 0..blocks {
        out.write_all(&record)?;
    }
    out.flush()?;

    File::create(statics_path(shard, map))?;
    Ok(())
}

/// The writable views of one map's files.
pub(crate) struct MapFiles {
    pub(crate) land: MmapMut,
    pub(crate) staidx: MmapMut,

    /// An anonymous copy of the statics file, at least `eof` bytes long.
    pub(crate) statics: MmapMut,

    /// The logical end of the statics file.
    pub(crate) eof: u32,
}

impl MapFiles {
    /// Maps the files of `map`, returning the statics file for the writer to own.
    pub(crate) fn open(shard: &Path, map: u8, statics_capacity: usize) -> Result<(Self, File)> {
        let land = map_writable(&map_path(shard, map))?;
        let staidx = map_writable(&staidx_path(shard, map))?;

        let path = statics_path(shard, map);
        let mut file = open_existing(&path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let eof = u32::try_from(bytes.len())?;
        let mut statics = MmapMut::map_anon(bytes.len().max(statics_capacity).max(1))?;
        statics[..bytes.len()].copy_from_slice(&bytes);

        debug!(
            "mapped map {map}: {} land bytes, {} index bytes, {eof} statics bytes",
            land.len(),
            staidx.len()
        );
        Ok((
            Self {
                land,
                staidx,
                statics,
                eof,
            },
            file,
        ))
    }

    /// Grows the statics view so that it holds at least `len` bytes.
    pub(crate) fn reserve_statics(&mut self, len: usize) -> Result<()> {
        if len <= self.statics.len() {
            return Ok(());
        }

        let capacity = len.max(self.statics.len() * 2);
        let mut statics = MmapMut::map_anon(capacity)?;
        statics[..self.statics.len()].copy_from_slice(&self.statics);
        debug!("grew statics view from {} to {capacity} bytes", self.statics.len());
        self.statics = statics;
        Ok(())
    }
}

fn open_existing(path: &Path) -> Result<File> {
    if !path.is_file() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    Ok(OpenOptions::new().read(true).write(true).open(path)?)
}

fn map_writable(path: &Path) -> Result<MmapMut> {
    let file = open_existing(path)?;
    if file.metadata()?.len() == 0 {
        return Err(Error::EmptyFile(path.to_path_buf()));
    }

    // SAFETY: shard files belong to this session, nothing else resizes them while mapped
    let mmap = unsafe { MmapMut::map_mut(&file)? };
    Ok(mmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{Endian, Sink};

    fn sizing() -> MapSizing {
        MapSizing::new(0, (16, 24), (16, 24))
    }

    #[test]
    fn shard_names() {
        assert_eq!(validate_shard_name(b"My Shard").ok(), Some("My Shard"));
        let invalid = [
            &b""[..],
            &b"  "[..],
            &b"a/b"[..],
            &b"a\\b"[..],
            &b".."[..],
            &b"."[..],
            &b"\xFF"[..],
        ];
        for name in invalid {
            assert!(matches!(validate_shard_name(name), Err(Error::InvalidShardName)));
        }
    }

    #[test]
    fn synthesizes_blank_maps() -> anyhow::Result<()> {
        let base = tempfile::tempdir()?;
        let shard = tempfile::tempdir()?;
        bootstrap(base.path(), shard.path(), 0, &sizing())?;

        let land = fs::read(map_path(shard.path(), 0))?;
        assert_eq!(land.len(), 6 * BLOCK_SIZE);
        assert_eq!(land[..7], [0, 0, 0, 0, 0x44, 0x02, 0x00]);
        assert_eq!(land[BLOCK_SIZE - 3..BLOCK_SIZE], BLANK_CELL);

        let staidx = fs::read(staidx_path(shard.path(), 0))?;
        assert_eq!(staidx.len(), 6 * STAIDX_SIZE);
        assert!(staidx
            .chunks_exact(STAIDX_SIZE)
            .all(|x| x == [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0, 0, 0, 0, 0]));
        assert!(fs::read(statics_path(shard.path(), 0))?.is_empty());

        let (files, _) = MapFiles::open(shard.path(), 0, 16)?;
        assert_eq!(files.eof, 0);
        assert_eq!(files.statics.len(), 16);
        Ok(())
    }

    #[test]
    fn copies_flat_maps() -> anyhow::Result<()> {
        let base = tempfile::tempdir()?;
        let shard = tempfile::tempdir()?;
        fs::write(map_path(base.path(), 1), [1u8; BLOCK_SIZE])?;
        fs::write(staidx_path(base.path(), 1), [2u8; STAIDX_SIZE])?;
        fs::write(statics_path(base.path(), 1), [3u8; 7])?;
        fs::write(statics_path(shard.path(), 1), b"")?;

        bootstrap(base.path(), shard.path(), 1, &sizing())?;
        assert_eq!(fs::read(map_path(shard.path(), 1))?, [1u8; BLOCK_SIZE]);
        assert_eq!(fs::read(staidx_path(shard.path(), 1))?, [2u8; STAIDX_SIZE]);
        assert_eq!(fs::read(statics_path(shard.path(), 1))?, [3u8; 7]);

        fs::write(map_path(base.path(), 1), [9u8; BLOCK_SIZE])?;
        bootstrap(base.path(), shard.path(), 1, &sizing())?;
        assert_eq!(fs::read(map_path(shard.path(), 1))?, [1u8; BLOCK_SIZE]);

        let (files, _) = MapFiles::open(shard.path(), 1, 0)?;
        assert_eq!(files.eof, 7);
        assert_eq!(files.statics[..], [3u8; 7]);
        Ok(())
    }

    #[test]
    fn converts_hashed_maps_in_entry_order() -> anyhow::Result<()> {
        const HEADER_SIZE: i64 = 0x1C;
        let base = tempfile::tempdir()?;
        let shard = tempfile::tempdir()?;

        let first = [0xAAu8; BLOCK_SIZE];
        let second = [0xBBu8; BLOCK_SIZE];
        let block_offset = HEADER_SIZE + 2 * BLOCK_SIZE as i64;
        let mut bytes = Vec::new();
        let mut sink = Sink::new(&mut bytes);
        sink.write(
            &(u32::from_le_bytes(*b"MYP\0"), 5u32, 0u32, block_offset, 2u32, 2i32),
            Endian::Little,
        )?;
        sink.write_bytes(&second)?;
        sink.write_bytes(&first)?;
        sink.write(&(2i32, 0i64), Endian::Little)?;
        let pattern = map::uop_pattern(0);
        for (offset, id) in [(HEADER_SIZE, 1), (HEADER_SIZE + BLOCK_SIZE as i64, 0)] {
            let len = BLOCK_SIZE as i32;
            sink.write(
                &(offset, 0i32, len, len, pattern.hash(id), 0u32, 0i16),
                Endian::Little,
            )?;
        }
        fs::write(base.path().join("map0LegacyMUL.uop"), bytes)?;
        fs::write(staidx_path(base.path(), 0), [0xFFu8; STAIDX_SIZE])?;
        fs::write(statics_path(base.path(), 0), b"")?;

        bootstrap(base.path(), shard.path(), 0, &sizing())?;
        let land = fs::read(map_path(shard.path(), 0))?;
        assert_eq!(land.len(), 2 * BLOCK_SIZE);
        assert_eq!(land[..BLOCK_SIZE], first);
        assert_eq!(land[BLOCK_SIZE..], second);
        Ok(())
    }

    #[test]
    fn missing_files_are_reported() -> anyhow::Result<()> {
        let base = tempfile::tempdir()?;
        let shard = tempfile::tempdir()?;
        fs::write(map_path(base.path(), 0), [1u8; BLOCK_SIZE])?;
        bootstrap(base.path(), shard.path(), 0, &sizing())?;

        match MapFiles::open(shard.path(), 0, 0) {
            Err(Error::FileNotFound(path)) => assert!(path.ends_with("staidx0.mul")),
            Err(err) => return Err(err.into()),
            Ok(_) => anyhow::bail!("open should have failed"),
        }
        Ok(())
    }

    #[test]
    fn statics_views_grow() -> anyhow::Result<()> {
        let shard = tempfile::tempdir()?;
        create_blank_map(shard.path(), 0, &sizing())?;
        let (mut files, _) = MapFiles::open(shard.path(), 0, 4)?;
        files.statics[..4].copy_from_slice(b"abcd");

        files.reserve_statics(4)?;
        assert_eq!(files.statics.len(), 4);
        files.reserve_statics(5)?;
        assert_eq!(files.statics.len(), 8);
        files.reserve_statics(100)?;
        assert_eq!(files.statics.len(), 100);
        assert_eq!(&files.statics[..4], b"abcd");
        Ok(())
    }
}
