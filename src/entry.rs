use crate::containers::Mapping;

/// Marks an index record whose data was never written.
pub const INVALID_OFFSET: i64 = 0xFFFF_FFFF;

/// A single retrievable blob inside an archive.
///
/// Entries hold a shared handle to the mapping they point into rather than a raw
/// address, so the bytes stay alive for as long as any entry referencing them
/// does. An entry whose range did not fit its mapping when it was created
/// keeps the literal `offset`/`length` it was read with, but has no source and
/// is reported as invalid.
#[derive(Clone, Debug, Default)]
pub struct ArchiveEntry {
    source: Option<Mapping>,
    pub offset: i64,
    pub length: i32,
    pub decompressed_length: i32,
    pub width: i16,
    pub height: i16,
    pub hue: u16,
    pub anim_offset: i8,
}

impl ArchiveEntry {
    /// Builds an entry over `source`, dropping the source if the range does not fit.
    #[must_use]
    pub fn new(source: &Mapping, offset: i64, length: i32, decompressed_length: i32) -> Self {
        let fits = Self::range(offset, length)
            .and_then(|(start, len)| source.slice(start, len))
            .is_some();
        Self {
            source: fits.then(|| source.clone()),
            offset,
            length,
            decompressed_length,
            ..Default::default()
        }
    }

    /// The "no data" sentinel.
    #[must_use]
    pub fn invalid() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_size(mut self, width: i16, height: i16) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.source.is_some() && self.offset != INVALID_OFFSET && self.length > 0
    }

    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.decompressed_length > 0 && self.decompressed_length != self.length
    }

    /// The raw (possibly compressed) bytes of the entry.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if !self.is_valid() {
            return None;
        }
        let (start, len) = Self::range(self.offset, self.length)?;
        self.source.as_ref()?.slice(start, len)
    }

    #[must_use]
    pub fn source(&self) -> Option<&Mapping> {
        self.source.as_ref()
    }

    fn range(offset: i64, length: i32) -> Option<(usize, usize)> {
        let start = usize::try_from(offset).ok()?;
        let len = usize::try_from(length).ok()?;
        Some((start, len))
    }
}

impl PartialEq for ArchiveEntry {
    fn eq(&self, other: &Self) -> bool {
        let same_source = match (&self.source, &other.source) {
            (Some(lhs), Some(rhs)) => lhs.ptr_eq(rhs),
            (None, None) => true,
            _ => false,
        };
        same_source
            && self.offset == other.offset
            && self.length == other.length
            && self.decompressed_length == other.decompressed_length
            && self.width == other.width
            && self.height == other.height
            && self.hue == other.hue
            && self.anim_offset == other.anim_offset
    }
}

impl Eq for ArchiveEntry {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state() {
        let e = ArchiveEntry::default();
        assert!(!e.is_valid());
        assert!(e.as_bytes().is_none());
        assert_eq!(e, ArchiveEntry::invalid());
    }

    #[test]
    fn ranges_outside_the_mapping_are_invalid() {
        let m = Mapping::from_owned((0..16).collect());
        let ok = ArchiveEntry::new(&m, 4, 4, 0);
        assert!(ok.is_valid());
        assert_eq!(ok.as_bytes(), Some(&[4u8, 5, 6, 7][..]));

        let past = ArchiveEntry::new(&m, 12, 8, 0);
        assert!(!past.is_valid());
        assert_eq!((past.offset, past.length), (12, 8));

        let negative = ArchiveEntry::new(&m, 0, -1, 0);
        assert!(!negative.is_valid());

        let sentinel = ArchiveEntry::new(&m, INVALID_OFFSET, 0, 0);
        assert!(!sentinel.is_valid());
    }

    #[test]
    fn equality_tracks_the_source() {
        let lhs = Mapping::from_owned(vec![0; 8]);
        let rhs = Mapping::from_owned(vec![0; 8]);
        assert_eq!(ArchiveEntry::new(&lhs, 0, 4, 0), ArchiveEntry::new(&lhs, 0, 4, 0));
        assert_ne!(ArchiveEntry::new(&lhs, 0, 4, 0), ArchiveEntry::new(&rhs, 0, 4, 0));
    }
}
