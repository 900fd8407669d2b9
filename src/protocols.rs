use crate::io::{BinaryReadable, BinaryWriteable, Endian, Result, Sink, Source};
use bstr::{BStr, BString, ByteSlice as _};
use std::io::{self, Write};

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("a string is too large to be written without data loss")]
    StringTooLarge,
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        Self::new(io::ErrorKind::InvalidData, value)
    }
}

/// Cuts `bytes` at the first NUL, if any.
pub(crate) fn truncate_at_nul(bytes: &[u8]) -> &[u8] {
    bytes.find_byte(b'\0').map_or(bytes, |len| &bytes[..len])
}

/// A name stored in exactly `N` bytes, padded with NULs.
pub(crate) struct FixedString<const N: usize>;

impl<const N: usize> BinaryReadable for FixedString<N> {
    type Item = BString;

    fn from_stream<In>(stream: &mut In, _: Endian) -> Result<Self::Item>
    where
        In: ?Sized + Source,
    {
        let bytes = stream.read_bytes(N)?;
        Ok(truncate_at_nul(bytes).into())
    }
}

impl<const N: usize> BinaryWriteable for FixedString<N> {
    type Item = BStr;

    fn to_stream<Out>(stream: &mut Sink<Out>, item: &Self::Item, _: Endian) -> io::Result<()>
    where
        Out: ?Sized + Write,
    {
        let Some(padding) = N.checked_sub(item.len()) else {
            return Err(Error::StringTooLarge.into());
        };
        stream.write_bytes(item)?;
        for _ in 0..padding {
            stream.write_bytes(b"\0")?;
        }
        Ok(())
    }
}
