use crate::containers::Mapping;
use core::mem;
use std::{
    io::{self, Write},
    path::Path,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// A read walked off the end of the underlying buffer.
///
/// Well-formed files never trigger this; seeing it means the file is malformed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("read of {requested} bytes at position {position} is outside of a buffer of {len} bytes")]
pub struct OutOfRange {
    pub position: usize,
    pub requested: usize,
    pub len: usize,
}

pub type Result<T> = core::result::Result<T, OutOfRange>;

pub trait BinaryReadable {
    type Item;

    fn from_stream<In>(stream: &mut In, endian: Endian) -> Result<Self::Item>
    where
        In: ?Sized + Source;
}

pub trait BinaryWriteable {
    type Item: ?Sized;

    fn to_stream<Out>(stream: &mut Sink<Out>, item: &Self::Item, endian: Endian) -> io::Result<()>
    where
        Out: ?Sized + Write;
}

macro_rules! make_binary_streamable {
    ($t:ty) => {
        impl BinaryReadable for $t {
            type Item = $t;

            fn from_stream<In>(stream: &mut In, endian: Endian) -> Result<Self::Item>
            where
                In: ?Sized + Source,
            {
                let mut bytes = [0u8; mem::size_of::<Self::Item>()];
                bytes.copy_from_slice(stream.read_bytes(mem::size_of::<Self::Item>())?);
                Ok(match endian {
                    Endian::Little => Self::from_le_bytes(bytes),
                    Endian::Big => Self::from_be_bytes(bytes),
                })
            }
        }

        impl BinaryWriteable for $t {
            type Item = $t;

            fn to_stream<Out>(
                stream: &mut Sink<Out>,
                item: &Self::Item,
                endian: Endian,
            ) -> io::Result<()>
            where
                Out: ?Sized + Write,
            {
                let bytes = match endian {
                    Endian::Little => item.to_le_bytes(),
                    Endian::Big => item.to_be_bytes(),
                };
                stream.write_bytes(&bytes)
            }
        }
    };
}

make_binary_streamable!(u8);
make_binary_streamable!(u16);
make_binary_streamable!(u32);
make_binary_streamable!(u64);

make_binary_streamable!(i8);
make_binary_streamable!(i16);
make_binary_streamable!(i32);
make_binary_streamable!(i64);

macro_rules! make_binary_streamable_tuple {
    ($($idx:tt $t:ident),+) => {
        impl<$($t,)+> BinaryReadable for ($($t,)+)
        where
            $($t: BinaryReadable,)+
        {
            type Item = ($($t::Item,)+);

            fn from_stream<In>(stream: &mut In, endian: Endian) -> Result<Self::Item>
            where
                In: ?Sized + Source,
            {
                Ok(($(
                    $t::from_stream(stream, endian)?,
                )+))
            }
        }

        impl<$($t,)+> BinaryWriteable for ($($t,)+)
        where
            $($t: BinaryWriteable, $t::Item: Sized,)+
        {
            type Item = ($($t::Item,)+);

            fn to_stream<Out>(
                stream: &mut Sink<Out>,
                item: &Self::Item,
                endian: Endian,
            ) -> io::Result<()>
            where
                Out: ?Sized + Write,
            {
                $(
                    $t::to_stream(stream, &item.$idx, endian)?;
                )+
                Ok(())
            }
        }
    };
}

make_binary_streamable_tuple!(0 T0);
make_binary_streamable_tuple!(0 T0, 1 T1);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4, 5 T5);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4, 5 T5, 6 T6);

/// A byte cursor over an in-memory buffer.
pub trait Source {
    #[must_use]
    fn as_bytes(&self) -> &[u8];

    #[must_use]
    fn stream_position(&self) -> usize;

    #[doc(hidden)]
    fn set_stream_position(&mut self, pos: usize);

    #[must_use]
    fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[must_use]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    fn remaining(&self) -> usize {
        self.len().saturating_sub(self.stream_position())
    }

    fn seek_absolute(&mut self, pos: usize) -> Result<()> {
        if pos <= self.len() {
            self.set_stream_position(pos);
            Ok(())
        } else {
            Err(OutOfRange {
                position: pos,
                requested: 0,
                len: self.len(),
            })
        }
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        let position = self.stream_position();
        match position.checked_add(len) {
            Some(pos) => self.seek_absolute(pos),
            None => Err(OutOfRange {
                position,
                requested: len,
                len: self.len(),
            }),
        }
    }

    fn read_bytes(&mut self, len: usize) -> Result<&[u8]> {
        let start = self.stream_position();
        let stop = start
            .checked_add(len)
            .filter(|&stop| stop <= self.len())
            .ok_or(OutOfRange {
                position: start,
                requested: len,
                len: self.len(),
            })?;
        self.set_stream_position(stop);
        Ok(&self.as_bytes()[start..stop])
    }

    fn read<T>(&mut self, endian: Endian) -> Result<T>
    where
        T: BinaryReadable<Item = T>,
    {
        T::from_stream(self, endian)
    }

    fn read_protocol<T>(&mut self, endian: Endian) -> Result<T::Item>
    where
        T: BinaryReadable,
    {
        T::from_stream(self, endian)
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.read(Endian::Little)
    }

    fn read_u16(&mut self) -> Result<u16> {
        self.read(Endian::Little)
    }

    fn read_u32(&mut self) -> Result<u32> {
        self.read(Endian::Little)
    }

    fn read_u64(&mut self) -> Result<u64> {
        self.read(Endian::Little)
    }

    fn read_i8(&mut self) -> Result<i8> {
        self.read(Endian::Little)
    }

    fn read_i16(&mut self) -> Result<i16> {
        self.read(Endian::Little)
    }

    fn read_i32(&mut self) -> Result<i32> {
        self.read(Endian::Little)
    }

    fn read_i64(&mut self) -> Result<i64> {
        self.read(Endian::Little)
    }

    fn save_restore_position<F, T>(&mut self, f: F) -> T
    where
        F: FnOnce(&mut Self) -> T,
    {
        let position = self.stream_position();
        let result = f(self);
        self.set_stream_position(position);
        result
    }
}

/// A read-only mapped file plus a cursor into it.
#[derive(Clone, Debug, Default)]
pub struct MappedArchive {
    mapping: Mapping,
    pos: usize,
}

impl MappedArchive {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(Mapping::open(path)?))
    }

    #[must_use]
    pub fn new(mapping: Mapping) -> Self {
        Self { mapping, pos: 0 }
    }

    #[must_use]
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    #[must_use]
    pub fn into_mapping(self) -> Mapping {
        self.mapping
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        self.seek_absolute(pos)
    }
}

impl Source for MappedArchive {
    fn as_bytes(&self) -> &[u8] {
        self.mapping.as_bytes()
    }

    fn stream_position(&self) -> usize {
        self.pos
    }

    fn set_stream_position(&mut self, pos: usize) {
        self.pos = pos;
    }
}

pub struct BorrowedSource<'bytes> {
    bytes: &'bytes [u8],
    pos: usize,
}

impl<'bytes> Source for BorrowedSource<'bytes> {
    fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    fn stream_position(&self) -> usize {
        self.pos
    }

    fn set_stream_position(&mut self, pos: usize) {
        self.pos = pos;
    }
}

impl<'bytes> From<&'bytes [u8]> for BorrowedSource<'bytes> {
    fn from(bytes: &'bytes [u8]) -> Self {
        Self { bytes, pos: 0 }
    }
}

pub struct Sink<'stream, Out>
where
    Out: ?Sized + Write,
{
    stream: &'stream mut Out,
}

impl<'stream, Out> Sink<'stream, Out>
where
    Out: ?Sized + Write,
{
    pub fn new(stream: &'stream mut Out) -> Self {
        Self { stream }
    }

    pub fn write<T>(&mut self, item: &T, endian: Endian) -> io::Result<()>
    where
        T: BinaryWriteable<Item = T>,
    {
        T::to_stream(self, item, endian)
    }

    pub fn write_protocol<T>(&mut self, item: &T::Item, endian: Endian) -> io::Result<()>
    where
        T: BinaryWriteable,
    {
        T::to_stream(self, item, endian)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)
    }
}
