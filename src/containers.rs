use memmap2::Mmap;
use std::{fs, io, path::Path, sync::Arc};

enum Backing {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

/// A shared, immutable view of an archive's bytes.
///
/// Cloning is cheap; every clone keeps the underlying mapping alive, so an
/// [`ArchiveEntry`](crate::ArchiveEntry) can never outlive the bytes it points into.
#[derive(Clone)]
pub struct Mapping {
    backing: Arc<Backing>,
}

impl Mapping {
    /// Maps the file at `path` read-only.
    pub fn open(path: &Path) -> io::Result<Self> {
        let fd = fs::File::open(path)?;
        Self::map(&fd)
    }

    /// Maps an already opened file read-only.
    pub fn map(fd: &fs::File) -> io::Result<Self> {
        // empty files can not be mapped on every platform
        if fd.metadata()?.len() == 0 {
            return Ok(Self::from_owned(Vec::new()));
        }

        // SAFETY: archives are treated as read-only for the lifetime of the process
        let mmap = unsafe { Mmap::map(fd)? };
        Ok(Self {
            backing: Arc::new(Backing::Mapped(mmap)),
        })
    }

    #[must_use]
    pub fn from_owned(bytes: Vec<u8>) -> Self {
        Self {
            backing: Arc::new(Backing::Owned(bytes)),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match &*self.backing {
            Backing::Owned(x) => x,
            Backing::Mapped(x) => x,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns `len` bytes starting at `pos`, or `None` if the range leaves the mapping.
    #[must_use]
    pub fn slice(&self, pos: usize, len: usize) -> Option<&[u8]> {
        let end = pos.checked_add(len)?;
        self.as_bytes().get(pos..end)
    }

    /// Returns `true` if both handles share the same underlying bytes.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.backing, &other.backing)
    }
}

impl core::fmt::Debug for Mapping {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let kind = match &*self.backing {
            Backing::Owned(_) => "owned",
            Backing::Mapped(_) => "mapped",
        };
        f.debug_struct("Mapping")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

impl Default for Mapping {
    fn default() -> Self {
        Self::from_owned(Vec::new())
    }
}

impl From<Vec<u8>> for Mapping {
    fn from(value: Vec<u8>) -> Self {
        Self::from_owned(value)
    }
}
