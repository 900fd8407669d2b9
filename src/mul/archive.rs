use crate::{
    containers::Mapping,
    entry::ArchiveEntry,
    io::{Endian, MappedArchive, Source},
    mul::Result,
};
use std::path::Path;
use tracing::debug;

/// Size in bytes of one index record.
pub const RECORD_SIZE: usize = 0xC;

/// Builds the entry table for `data` from the 12-byte records in `index`.
///
/// A trailing partial record is ignored. Records with a zero or negative length
/// are kept as-is and simply resolve to "no data".
pub fn build_index(index: &Mapping, data: &Mapping) -> Result<Vec<ArchiveEntry>> {
    let count = index.len() / RECORD_SIZE;
    let mut source = MappedArchive::new(index.clone());
    let mut entries = Vec::with_capacity(count);

    for _ in 0..count {
        let (offset, length, size): (u32, i32, i32) = source.read(Endian::Little)?;
        let mut entry = ArchiveEntry::new(data, offset.into(), length, 0);
        if size > 0 {
            #[allow(clippy::cast_possible_truncation)]
            {
                entry.width = (size >> 16) as i16;
                entry.height = (size & 0xFFFF) as i16;
            }
        }
        entries.push(entry);
    }

    Ok(entries)
}

/// A data file paired with its index.
#[derive(Clone, Debug, Default)]
pub struct Archive {
    data: Mapping,
    entries: Vec<ArchiveEntry>,
}

impl Archive {
    pub fn open(data_path: &Path, index_path: &Path) -> Result<Self> {
        let data = Mapping::open(data_path)?;
        let index = Mapping::open(index_path)?;
        let result = Self::from_mappings(data, &index)?;
        debug!(
            "loaded {} index records from {}",
            result.len(),
            index_path.display()
        );
        Ok(result)
    }

    pub fn from_mappings(data: Mapping, index: &Mapping) -> Result<Self> {
        let entries = build_index(index, &data)?;
        Ok(Self { data, entries })
    }

    #[must_use]
    pub fn data(&self) -> &Mapping {
        &self.data
    }

    #[must_use]
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    #[must_use]
    pub fn entries_mut(&mut self) -> &mut [ArchiveEntry] {
        &mut self.entries
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<ArchiveEntry> {
        self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The bytes of entry `idx`, if it has any.
    #[must_use]
    pub fn read(&self, idx: usize) -> Option<&[u8]> {
        self.entries
            .get(idx)
            .filter(|x| x.is_valid())
            .and_then(ArchiveEntry::as_bytes)
    }

    /// Returns the entry at `idx`, or the invalid sentinel for unknown or empty slots.
    #[must_use]
    pub fn resolve(&self, idx: usize) -> ArchiveEntry {
        match self.entries.get(idx) {
            Some(entry) if entry.is_valid() => entry.clone(),
            _ => ArchiveEntry::invalid(),
        }
    }
}
