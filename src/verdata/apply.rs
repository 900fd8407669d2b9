use crate::{
    entry::ArchiveEntry,
    io::{BorrowedSource, Source as _},
    map::MapBlockTable,
    protocols::truncate_at_nul,
    verdata::{
        ArtTables, HueGroup, LandTile, Options, PatchRecord, SkillEntry, StaticTile, TileData,
        Verdata,
    },
};
use tracing::{debug, info, warn};

mod constants {
    pub(crate) const MAP: u32 = 0;
    pub(crate) const STATICS: u32 = 2;
    pub(crate) const ART: u32 = 4;
    pub(crate) const SOUND_INDEX: u32 = 5;
    pub(crate) const SOUND: u32 = 6;
    pub(crate) const GUMP: u32 = 12;
    pub(crate) const MULTI: u32 = 14;
    pub(crate) const SKILL: u32 = 16;
    pub(crate) const TILEDATA: u32 = 30;
    pub(crate) const HUES: u32 = 32;

    pub(crate) const ART_STATIC_OFFSET: usize = 0x4000;

    pub(crate) const TILEDATA_LAND_BLOCK: u32 = 836;
    pub(crate) const TILEDATA_STATIC_BLOCK: u32 = 1188;
    pub(crate) const TILEDATA_STATIC_OFFSET: usize = 0x200;
    pub(crate) const TILES_PER_BLOCK: usize = 32;
}

/// Why a record was not applied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IgnoreReason {
    /// The record targets a file this crate does not patch.
    Unused,
    /// Sound records, which are dropped without a warning.
    Skipped,
    /// No table was supplied for the record's file.
    NoTarget,
    /// The block id lies outside of the target table.
    BlockOutOfRange,
    /// The payload lies outside of the verdata file or has an unexpected size.
    Malformed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PatchIgnored {
    pub record: PatchRecord,
    pub reason: IgnoreReason,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PatchReport {
    pub applied: usize,
    pub ignored: Vec<PatchIgnored>,
}

/// The tables a verdata file may patch. Absent tables reject their records.
#[derive(Debug, Default)]
pub struct PatchTargets<'a> {
    pub map: Option<&'a mut MapBlockTable>,
    pub art: Option<&'a mut ArtTables>,
    pub gumps: Option<&'a mut [ArchiveEntry]>,
    pub multis: Option<&'a mut [ArchiveEntry]>,
    pub skills: Option<&'a mut [SkillEntry]>,
    pub tiledata: Option<&'a mut TileData>,
    pub hues: Option<&'a mut [HueGroup]>,
}

type Outcome = core::result::Result<(), IgnoreReason>;

impl Verdata {
    /// Applies every record to `targets`, if `options` enable verdata.
    ///
    /// Records overwrite their targets wholesale, so applying the same file
    /// twice leaves the tables as applying it once does.
    pub fn apply(&self, targets: &mut PatchTargets<'_>, options: &Options) -> PatchReport {
        let mut report = PatchReport::default();
        if !options.enabled(self) {
            debug!("verdata is disabled");
            return report;
        }

        info!("patching with {} verdata records", self.len());
        for record in self.patches() {
            match self.apply_one(record, targets, options) {
                Ok(()) => {
                    debug!(
                        "patched file {} block {}",
                        record.file_id, record.block_id
                    );
                    report.applied += 1;
                }
                Err(reason) => {
                    if reason != IgnoreReason::Skipped {
                        warn!(
                            "ignored verdata record for file {} block {}: {reason:?}",
                            record.file_id, record.block_id
                        );
                    }
                    report.ignored.push(PatchIgnored {
                        record: *record,
                        reason,
                    });
                }
            }
        }

        report
    }

    fn apply_one(
        &self,
        record: &PatchRecord,
        targets: &mut PatchTargets<'_>,
        options: &Options,
    ) -> Outcome {
        let block = usize::try_from(record.block_id).map_err(|_| IgnoreReason::BlockOutOfRange)?;
        match record.file_id {
            constants::MAP => {
                let map = targets.map.as_deref_mut().ok_or(IgnoreReason::NoTarget)?;
                let entry = self.valid_entry(record)?;
                map.patch_map_block(block, entry)
                    .then_some(())
                    .ok_or(IgnoreReason::BlockOutOfRange)
            }
            constants::STATICS => {
                let map = targets.map.as_deref_mut().ok_or(IgnoreReason::NoTarget)?;
                let entry = self.valid_entry(record)?;
                map.patch_static_block(block, entry)
                    .then_some(())
                    .ok_or(IgnoreReason::BlockOutOfRange)
            }
            constants::ART => {
                let art = targets.art.as_deref_mut().ok_or(IgnoreReason::NoTarget)?;
                let slot = if block < constants::ART_STATIC_OFFSET {
                    art.land.get_mut(block)
                } else {
                    art.statics.get_mut(block - constants::ART_STATIC_OFFSET)
                };
                Self::replace(slot, self.entry(record))
            }
            constants::GUMP => {
                let gumps = targets.gumps.as_deref_mut().ok_or(IgnoreReason::NoTarget)?;
                #[allow(clippy::cast_possible_truncation)]
                let (width, height) = ((record.extra >> 16) as i16, (record.extra & 0xFFFF) as i16);
                Self::replace(gumps.get_mut(block), self.entry(record).with_size(width, height))
            }
            constants::MULTI => {
                let multis = targets.multis.as_deref_mut().ok_or(IgnoreReason::NoTarget)?;
                Self::replace(multis.get_mut(block), self.entry(record))
            }
            constants::SKILL => {
                let skills = targets.skills.as_deref_mut().ok_or(IgnoreReason::NoTarget)?;
                let skill = skills.get_mut(block).ok_or(IgnoreReason::BlockOutOfRange)?;
                *skill = self.read_skill(record)?;
                Ok(())
            }
            constants::TILEDATA => {
                let tiledata = targets.tiledata.as_deref_mut().ok_or(IgnoreReason::NoTarget)?;
                self.patch_tiledata(record, tiledata, options.wide_tile_flags())
            }
            constants::HUES => {
                let hues = targets.hues.as_deref_mut().ok_or(IgnoreReason::NoTarget)?;
                let hue = hues.get_mut(block).ok_or(IgnoreReason::BlockOutOfRange)?;
                let group = self
                    .payload(record)
                    .and_then(|mut source| HueGroup::read(&mut source).ok())
                    .ok_or(IgnoreReason::Malformed)?;
                hue.header = group.header;
                for (dst, src) in hue.entries.iter_mut().zip(&group.entries) {
                    dst.color_table = src.color_table;
                }
                Ok(())
            }
            constants::SOUND_INDEX | constants::SOUND => Err(IgnoreReason::Skipped),
            _ => Err(IgnoreReason::Unused),
        }
    }

    fn patch_tiledata(&self, record: &PatchRecord, tiledata: &mut TileData, wide: bool) -> Outcome {
        let block = record.block_id as usize;
        let mut source = self.payload(record).ok_or(IgnoreReason::Malformed)?;
        let (table_len, first) = match record.length {
            constants::TILEDATA_LAND_BLOCK => (tiledata.land.len(), Some(block)),
            constants::TILEDATA_STATIC_BLOCK => (
                tiledata.statics.len(),
                block.checked_sub(constants::TILEDATA_STATIC_OFFSET),
            ),
            _ => return Err(IgnoreReason::Malformed),
        };
        let start = first
            .and_then(|x| x.checked_mul(constants::TILES_PER_BLOCK))
            .filter(|&x| x + constants::TILES_PER_BLOCK <= table_len)
            .ok_or(IgnoreReason::BlockOutOfRange)?;
        let range = start..start + constants::TILES_PER_BLOCK;

        source.skip(4).map_err(|_| IgnoreReason::Malformed)?;
        if record.length == constants::TILEDATA_LAND_BLOCK {
            let tiles = (0..constants::TILES_PER_BLOCK)
                .map(|_| LandTile::read(&mut source, wide))
                .collect::<crate::io::Result<Vec<_>>>()
                .map_err(|_| IgnoreReason::Malformed)?;
            for (dst, src) in tiledata.land[range].iter_mut().zip(tiles) {
                *dst = src;
            }
        } else {
            let tiles = (0..constants::TILES_PER_BLOCK)
                .map(|_| StaticTile::read(&mut source, wide))
                .collect::<crate::io::Result<Vec<_>>>()
                .map_err(|_| IgnoreReason::Malformed)?;
            for (dst, src) in tiledata.statics[range].iter_mut().zip(tiles) {
                *dst = src;
            }
        }

        Ok(())
    }

    /// A cursor over the verdata file, positioned at the payload of `record`.
    fn payload(&self, record: &PatchRecord) -> Option<BorrowedSource<'_>> {
        let mut source = BorrowedSource::from(self.mapping().as_bytes());
        source.seek_absolute(record.position as usize).ok()?;
        Some(source)
    }

    fn read_skill(&self, record: &PatchRecord) -> Result<SkillEntry, IgnoreReason> {
        let len = (record.length as usize)
            .checked_sub(1)
            .ok_or(IgnoreReason::Malformed)?;
        let mut source = self.payload(record).ok_or(IgnoreReason::Malformed)?;
        let has_action = source.read_u8().map_err(|_| IgnoreReason::Malformed)? != 0;
        let name = source.read_bytes(len).map_err(|_| IgnoreReason::Malformed)?;
        Ok(SkillEntry {
            has_action,
            name: truncate_at_nul(name).into(),
        })
    }

    fn replace(slot: Option<&mut ArchiveEntry>, entry: ArchiveEntry) -> Outcome {
        let slot = slot.ok_or(IgnoreReason::BlockOutOfRange)?;
        *slot = entry;
        Ok(())
    }

    fn valid_entry(&self, record: &PatchRecord) -> Result<ArchiveEntry, IgnoreReason> {
        let entry = self.entry(record);
        if entry.is_valid() {
            Ok(entry)
        } else {
            Err(IgnoreReason::Malformed)
        }
    }
}
