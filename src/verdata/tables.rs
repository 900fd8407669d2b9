use crate::{
    entry::ArchiveEntry,
    io::{Endian, Result, Source},
    protocols::FixedString,
};
use bstr::BString;

bitflags::bitflags! {
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct TileFlags: u64 {
        const BACKGROUND = 1 << 0;
        const WEAPON = 1 << 1;
        const TRANSPARENT = 1 << 2;
        const TRANSLUCENT = 1 << 3;
        const WALL = 1 << 4;
        const DAMAGING = 1 << 5;
        const IMPASSABLE = 1 << 6;
        const WET = 1 << 7;
        const UNKNOWN_1 = 1 << 8;
        const SURFACE = 1 << 9;
        const BRIDGE = 1 << 10;
        const GENERIC = 1 << 11;
        const WINDOW = 1 << 12;
        const NO_SHOOT = 1 << 13;
        const ARTICLE_A = 1 << 14;
        const ARTICLE_AN = 1 << 15;
        const ARTICLE_THE = 1 << 16;
        const FOLIAGE = 1 << 17;
        const PARTIAL_HUE = 1 << 18;
        const NO_HOUSE = 1 << 19;
        const MAP = 1 << 20;
        const CONTAINER = 1 << 21;
        const WEARABLE = 1 << 22;
        const LIGHT_SOURCE = 1 << 23;
        const ANIMATION = 1 << 24;
        const HOVER_OVER = 1 << 25;
        const NO_DIAGONAL = 1 << 26;
        const ARMOR = 1 << 27;
        const ROOF = 1 << 28;
        const DOOR = 1 << 29;
        const STAIR_BACK = 1 << 30;
        const STAIR_RIGHT = 1 << 31;
        const ALPHA_BLEND = 1 << 32;
        const USE_NEW_ART = 1 << 33;
        const ART_USED = 1 << 34;
        const NO_SHADOW = 1 << 36;
        const PIXEL_BLEED = 1 << 37;
        const PLAY_ANIM_ONCE = 1 << 38;
        const MULTI_MOVABLE = 1 << 40;
    }
}

impl TileFlags {
    fn read<In>(source: &mut In, wide: bool) -> Result<Self>
    where
        In: ?Sized + Source,
    {
        let bits = if wide {
            source.read_u64()?
        } else {
            source.read_u32()?.into()
        };
        Ok(Self::from_bits_retain(bits))
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LandTile {
    pub flags: TileFlags,
    pub texture: u16,
    pub name: BString,
}

impl LandTile {
    pub(crate) fn read<In>(source: &mut In, wide_flags: bool) -> Result<Self>
    where
        In: ?Sized + Source,
    {
        let flags = TileFlags::read(source, wide_flags)?;
        let texture = source.read_u16()?;
        let name = source.read_protocol::<FixedString<20>>(Endian::Little)?;
        Ok(Self {
            flags,
            texture,
            name,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StaticTile {
    pub flags: TileFlags,
    pub weight: u8,
    pub layer: u8,
    pub count: i32,
    pub anim_id: u16,
    pub hue: u16,
    pub light_index: u16,
    pub height: u8,
    pub name: BString,
}

impl StaticTile {
    pub(crate) fn read<In>(source: &mut In, wide_flags: bool) -> Result<Self>
    where
        In: ?Sized + Source,
    {
        let flags = TileFlags::read(source, wide_flags)?;
        let (weight, layer, count, anim_id, hue, light_index, height) =
            source.read(Endian::Little)?;
        let name = source.read_protocol::<FixedString<20>>(Endian::Little)?;
        Ok(Self {
            flags,
            weight,
            layer,
            count,
            anim_id,
            hue,
            light_index,
            height,
            name,
        })
    }
}

/// The land and static halves of `tiledata.mul`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TileData {
    pub land: Vec<LandTile>,
    pub statics: Vec<StaticTile>,
}

impl TileData {
    #[must_use]
    pub fn with_len(land: usize, statics: usize) -> Self {
        Self {
            land: vec![LandTile::default(); land],
            statics: vec![StaticTile::default(); statics],
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SkillEntry {
    pub has_action: bool,
    pub name: BString,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HueEntry {
    pub color_table: [u16; 32],
    pub table_start: u16,
    pub table_end: u16,
    pub name: BString,
}

impl HueEntry {
    fn read<In>(source: &mut In) -> Result<Self>
    where
        In: ?Sized + Source,
    {
        let mut color_table = [0; 32];
        for color in &mut color_table {
            *color = source.read_u16()?;
        }
        let (table_start, table_end) = source.read(Endian::Little)?;
        let name = source.read_protocol::<FixedString<20>>(Endian::Little)?;
        Ok(Self {
            color_table,
            table_start,
            table_end,
            name,
        })
    }
}

/// Eight hues sharing one header, as stored in `hues.mul`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HueGroup {
    pub header: u32,
    pub entries: [HueEntry; 8],
}

impl HueGroup {
    pub(crate) fn read<In>(source: &mut In) -> Result<Self>
    where
        In: ?Sized + Source,
    {
        let header = source.read_u32()?;
        let mut entries: [HueEntry; 8] = Default::default();
        for entry in &mut entries {
            *entry = HueEntry::read(source)?;
        }
        Ok(Self { header, entries })
    }
}

/// The art index, split into its land (`0..0x4000`) and static halves.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ArtTables {
    pub land: Vec<ArchiveEntry>,
    pub statics: Vec<ArchiveEntry>,
}

impl ArtTables {
    /// Splits a flat art index at the first static id.
    #[must_use]
    pub fn from_entries(mut entries: Vec<ArchiveEntry>, land_count: usize) -> Self {
        let statics = entries.split_off(land_count.min(entries.len()));
        Self {
            land: entries,
            statics,
        }
    }
}
