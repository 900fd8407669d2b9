use crate::{
    containers::Mapping,
    entry::ArchiveEntry,
    io::{Endian, MappedArchive, Source},
    uop::{Error, NamePattern, Result},
};
use flate2::write::ZlibDecoder;
use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    io::Write,
    path::Path,
};
use tracing::{debug, info, warn};

mod constants {
    pub(crate) const MAGIC: u32 = u32::from_le_bytes(*b"MYP\0");

    pub(crate) const EXTRA_SIZE: i32 = 0x8;

    pub(crate) const FLAG_STORED: i16 = 0;
    pub(crate) const FLAG_ZLIB: i16 = 1;
}

/// The fixed fields at the start of every UOP archive.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Header {
    pub version: u32,
    pub timestamp: u32,
    pub first_block_offset: i64,
    pub block_size: u32,
    pub entry_count: i32,
}

/// See also [`ArchiveOptions`](Options).
#[derive(Clone, Debug, Default)]
#[repr(transparent)]
pub struct OptionsBuilder(Options);

impl OptionsBuilder {
    #[must_use]
    pub fn build(self) -> Options {
        self.0
    }

    #[must_use]
    pub fn has_extra(mut self, has_extra: bool) -> Self {
        self.0.has_extra = has_extra;
        self
    }

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pattern(mut self, pattern: NamePattern) -> Self {
        self.0.pattern = pattern;
        self
    }
}

/// How ids map onto names, and whether entries carry a size prefix.
///
/// ```rust
/// use uofile::uop::{ArchiveOptions, NamePattern};
///
/// // gumps store an 8-byte width/height prefix in front of their pixels
/// let _ = ArchiveOptions::builder()
///     .pattern(NamePattern::new("build/gumpartlegacymul/", 8, ".tga"))
///     .has_extra(true)
///     .build();
///
/// let _ = ArchiveOptions::builder()
///     .pattern(NamePattern::new("build/map0legacymul/", 8, ".dat"))
///     .build();
/// ```
#[derive(Clone, Debug, Default)]
pub struct Options {
    pattern: NamePattern,
    has_extra: bool,
}

impl Options {
    #[must_use]
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::new()
    }

    #[must_use]
    pub fn has_extra(&self) -> bool {
        self.has_extra
    }

    #[must_use]
    pub fn pattern(&self) -> &NamePattern {
        &self.pattern
    }
}

#[derive(Clone, Debug, Default)]
pub struct Archive {
    mapping: Mapping,
    header: Header,
    hashes: HashMap<u64, ArchiveEntry>,
    // effective offset -> flag, for records stored with a codec we can not inflate
    unsupported: HashMap<i64, i16>,
    total_entries: usize,
    options: Options,
}

impl Archive {
    pub fn open(path: &Path, options: Options) -> Result<Self> {
        let mapping = Mapping::open(path)?;
        let archive = Self::from_mapping(mapping, options)?;
        info!(
            "loaded {} entries from {}",
            archive.total_entries,
            path.display()
        );
        Ok(archive)
    }

    pub fn from_mapping(mapping: Mapping, options: Options) -> Result<Self> {
        let mut source = MappedArchive::new(mapping.clone());
        let header = Self::read_header(&mut source)?;
        let mut archive = Self {
            mapping,
            header,
            options,
            ..Default::default()
        };

        let mut visited = HashSet::new();
        let mut next = header.first_block_offset;
        while next != 0 {
            if !visited.insert(next) {
                warn!("directory chain loops back to the block at {next:#x}");
                break;
            }
            source.seek(usize::try_from(next)?)?;
            next = archive.read_block(&mut source)?;
        }

        Ok(archive)
    }

    /// Drops the hash table, keeping only the header and the mapping.
    pub fn clear_hashes(&mut self) {
        self.hashes = HashMap::new();
        self.unsupported = HashMap::new();
    }

    /// Resolves every slot of `entries` by index, leaving misses untouched.
    pub fn fill_entries(&self, entries: &mut [ArchiveEntry]) {
        for (id, slot) in entries.iter_mut().enumerate() {
            if let Some(entry) = self.get(self.options.pattern.hash(id)) {
                *slot = entry.clone();
            }
        }
    }

    #[must_use]
    pub fn get(&self, hash: u64) -> Option<&ArchiveEntry> {
        self.hashes.get(&hash)
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    #[must_use]
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Returns the bytes of `entry`, inflating them if they were stored compressed.
    pub fn read<'entry>(&self, entry: &'entry ArchiveEntry) -> Result<Cow<'entry, [u8]>> {
        let Some(bytes) = entry.as_bytes() else {
            return Ok(Cow::Borrowed(&[]));
        };
        if let Some(&flag) = self.unsupported.get(&entry.offset) {
            return Err(Error::UnsupportedCompression(flag));
        }
        if !entry.is_compressed() {
            return Ok(Cow::Borrowed(bytes));
        }

        let expected: usize = entry.decompressed_length.try_into()?;
        let mut d = ZlibDecoder::new(Vec::with_capacity(expected));
        d.write_all(bytes)?;
        let out = d.finish()?;
        if out.len() == expected {
            Ok(Cow::Owned(out))
        } else {
            Err(Error::DecompressionSizeMismatch {
                expected,
                actual: out.len(),
            })
        }
    }

    /// Looks `id` up through the archive's name pattern.
    #[must_use]
    pub fn resolve(&self, id: usize) -> ArchiveEntry {
        self.get(self.options.pattern.hash(id))
            .filter(|entry| entry.is_valid())
            .cloned()
            .unwrap_or_default()
    }

    /// The number of live records seen while walking the directory.
    #[must_use]
    pub fn total_entries(&self) -> usize {
        self.total_entries
    }

    fn read_block(&mut self, source: &mut MappedArchive) -> Result<i64> {
        let (file_count, next_block): (i32, i64) = source.read(Endian::Little)?;
        for _ in 0..file_count {
            self.read_record(source)?;
        }
        Ok(next_block)
    }

    fn read_header(source: &mut MappedArchive) -> Result<Header> {
        let (magic, version, timestamp, first_block_offset, block_size, entry_count) =
            source.read(Endian::Little)?;
        if magic != constants::MAGIC {
            return Err(Error::BadFormat(magic));
        }

        Ok(Header {
            version,
            timestamp,
            first_block_offset,
            block_size,
            entry_count,
        })
    }

    fn read_record(&mut self, source: &mut MappedArchive) -> Result<()> {
        let (offset, header_length, compressed, decompressed, hash, _data_hash, flag): (
            i64,
            i32,
            i32,
            i32,
            u64,
            u32,
            i16,
        ) = source.read(Endian::Little)?;
        if offset == 0 {
            return Ok(());
        }

        self.total_entries += 1;
        let start = offset + i64::from(header_length);
        let (length, decompressed_length) = if flag == constants::FLAG_ZLIB {
            (compressed, decompressed)
        } else {
            (decompressed, decompressed)
        };

        let entry = if self.options.has_extra {
            let (width, height) = source.save_restore_position(|source| -> Result<(i32, i32)> {
                source.seek(start.try_into()?)?;
                Ok(source.read(Endian::Little)?)
            })?;
            let start = start + i64::from(constants::EXTRA_SIZE);
            let length = length - constants::EXTRA_SIZE;
            let decompressed_length = if flag == constants::FLAG_ZLIB {
                decompressed_length
            } else {
                length
            };
            #[allow(clippy::cast_possible_truncation)]
            let (width, height) = (width as i16, height as i16);
            ArchiveEntry::new(&self.mapping, start, length, decompressed_length)
                .with_size(width, height)
        } else {
            ArchiveEntry::new(&self.mapping, start, length, decompressed_length)
        };

        if flag != constants::FLAG_STORED && flag != constants::FLAG_ZLIB {
            debug!("record {hash:#018x} uses unsupported compression flag {flag}");
            self.unsupported.insert(entry.offset, flag);
        }
        if self.hashes.insert(hash, entry).is_some() {
            debug!("duplicate record for hash {hash:#018x}, keeping the last one");
        }

        Ok(())
    }
}
