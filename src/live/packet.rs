use crate::{
    io::{BorrowedSource, Endian, OutOfRange, Source as _},
    live::{Error, Result, WINDOW_LEN},
    map::LAND_SIZE,
    protocols,
};
use bstr::BString;
use std::io::{self, Write};

mod constants {
    pub(crate) const LIVE_PACKET: u8 = 0x3F;
    pub(crate) const TERRAIN_PACKET: u8 = 0x40;

    pub(crate) const HASH_QUERY: u8 = 0xFF;
    pub(crate) const STATICS_UPDATE: u8 = 0x00;
    pub(crate) const MAP_DEFINITIONS: u8 = 0x01;
    pub(crate) const LOGIN_CONFIRMATION: u8 = 0x02;

    pub(crate) const BLOCK_OFFSET: usize = 3;
    pub(crate) const COUNT_OFFSET: usize = 7;
    pub(crate) const COMMAND_OFFSET: usize = 13;
    pub(crate) const MAP_OFFSET: usize = 14;
    pub(crate) const PAYLOAD_OFFSET: usize = 15;

    pub(crate) const TERRAIN_BLOCK_OFFSET: usize = 1;
    pub(crate) const TERRAIN_LAND_OFFSET: usize = 5;
    pub(crate) const TERRAIN_MAP_OFFSET: usize = 200;

    pub(crate) const LOGIN_LEN: usize = 43;
    pub(crate) const MAP_DEFINITION_SIZE: u64 = 9;
    pub(crate) const HASH_RESPONSE_LEN: u16 = 65;
}

/// One map as declared by the server.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MapDefinition {
    pub map: u8,
    pub width: u16,
    pub height: u16,
    pub wrap_width: u16,
    pub wrap_height: u16,
}

/// A decoded live packet. Payloads borrow from the packet buffer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Packet<'bytes> {
    HashQuery {
        block: u32,
        map: u8,
    },
    StaticsUpdate {
        block: u32,
        map: u8,
        statics: &'bytes [u8],
    },
    MapDefinitions(Vec<MapDefinition>),
    LoginConfirmation {
        shard: BString,
    },
    TerrainUpdate {
        block: u32,
        map: u8,
        land: &'bytes [u8],
    },
}

impl<'bytes> Packet<'bytes> {
    pub fn parse(bytes: &'bytes [u8]) -> Result<Self> {
        let mut source = BorrowedSource::from(bytes);
        match source.read_u8()? {
            constants::LIVE_PACKET => Self::parse_live(bytes, &mut source),
            constants::TERRAIN_PACKET => Self::parse_terrain(bytes, &mut source),
            id => Err(Error::UnknownPacket(id)),
        }
    }

    fn parse_live(bytes: &'bytes [u8], source: &mut BorrowedSource<'_>) -> Result<Self> {
        if bytes.len() < constants::PAYLOAD_OFFSET {
            return Err(Error::MalformedPacket);
        }

        source.seek_absolute(constants::COMMAND_OFFSET)?;
        let (command, map): (u8, u8) = source.read(Endian::Big)?;
        source.seek_absolute(constants::BLOCK_OFFSET)?;
        let (block, count): (u32, u32) = source.read(Endian::Big)?;

        match command {
            constants::HASH_QUERY => Ok(Self::HashQuery { block, map }),
            constants::STATICS_UPDATE => {
                let len = usize::try_from(u64::from(count) * 7).map_err(|_| Error::MalformedPacket)?;
                let statics = slice(bytes, constants::PAYLOAD_OFFSET, len)?;
                Ok(Self::StaticsUpdate {
                    block,
                    map,
                    statics,
                })
            }
            constants::MAP_DEFINITIONS => {
                let count = u64::from(count) * 7 / constants::MAP_DEFINITION_SIZE;
                let needed = count * constants::MAP_DEFINITION_SIZE + constants::PAYLOAD_OFFSET as u64;
                if (bytes.len() as u64) < needed {
                    return Err(Error::MalformedPacket);
                }

                source.seek_absolute(constants::PAYLOAD_OFFSET)?;
                let mut definitions = Vec::new();
                for _ in 0..count {
                    let (map, width, height, wrap_width, wrap_height): (u8, u16, u16, u16, u16) =
                        source.read(Endian::Big)?;
                    definitions.push(MapDefinition {
                        map,
                        width,
                        height,
                        wrap_width,
                        wrap_height,
                    });
                }
                Ok(Self::MapDefinitions(definitions))
            }
            constants::LOGIN_CONFIRMATION => {
                if bytes.len() < constants::LOGIN_LEN {
                    return Err(Error::MalformedPacket);
                }
                let name = protocols::truncate_at_nul(&bytes[constants::PAYLOAD_OFFSET..]);
                Ok(Self::LoginConfirmation { shard: name.into() })
            }
            command => Err(Error::UnknownCommand(command)),
        }
    }

    /// Terrain packets have a fixed length, so the block follows the packet id directly.
    fn parse_terrain(bytes: &'bytes [u8], source: &mut BorrowedSource<'_>) -> Result<Self> {
        source.seek_absolute(constants::TERRAIN_BLOCK_OFFSET)?;
        let block: u32 = source.read(Endian::Big)?;
        let land = slice(bytes, constants::TERRAIN_LAND_OFFSET, LAND_SIZE)?;
        source.seek_absolute(constants::TERRAIN_MAP_OFFSET)?;
        let map = source.read_u8()?;
        Ok(Self::TerrainUpdate { block, map, land })
    }
}

fn slice(bytes: &[u8], position: usize, len: usize) -> Result<&[u8]> {
    position
        .checked_add(len)
        .and_then(|stop| bytes.get(position..stop))
        .ok_or_else(|| {
            OutOfRange {
                position,
                requested: len,
                len: bytes.len(),
            }
            .into()
        })
}

/// The checksums of the blocks around a queried block.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HashResponse {
    pub block: u32,
    pub map: u8,
    pub checksums: [u16; WINDOW_LEN],
}

impl HashResponse {
    /// Size in bytes of an encoded response.
    pub const LEN: usize = constants::HASH_RESPONSE_LEN as usize;

    pub fn write<Out>(&self, stream: &mut Out) -> io::Result<()>
    where
        Out: ?Sized + Write,
    {
        stream.write_all(&self.to_bytes())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut bytes = [0; Self::LEN];
        bytes[0] = constants::LIVE_PACKET;
        bytes[1..constants::BLOCK_OFFSET].copy_from_slice(&constants::HASH_RESPONSE_LEN.to_be_bytes());
        bytes[constants::BLOCK_OFFSET..constants::COUNT_OFFSET].copy_from_slice(&self.block.to_be_bytes());
        bytes[constants::COMMAND_OFFSET] = constants::HASH_QUERY;
        bytes[constants::MAP_OFFSET] = self.map;
        let checksums = bytes[constants::PAYLOAD_OFFSET..].chunks_exact_mut(2);
        for (chunk, checksum) in checksums.zip(&self.checksums) {
            chunk.copy_from_slice(&checksum.to_be_bytes());
        }
        bytes
    }
}
