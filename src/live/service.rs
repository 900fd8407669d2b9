use crate::{
    io::{BorrowedSource, Endian, OutOfRange, Sink, Source as _},
    live::{
        storage::{self, MapFiles},
        writer::{WriteRequest, Writer},
        BlockObserver, Error, Fletcher16, HashResponse, MapDefinition, MapSizing, NoopObserver,
        Options, Packet, Result, State, WINDOW_LEN,
    },
    map::{BLOCK_HEADER_SIZE, BLOCK_SIZE, EMPTY_LOOKUP, LAND_SIZE, STAIDX_SIZE},
};
use core::ops::Range;
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, trace, warn};

/// Marks a checksum that has to be recomputed on the next query.
const UNSET_CHECKSUM: u16 = 0xFFFF;

/// A copy of one block as the live session currently sees it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LiveBlock {
    /// The 64 land cells, without the block header.
    pub land: Vec<u8>,

    /// Where the statics of the block start in the statics file.
    pub lookup: u32,

    pub statics: Vec<u8>,
}

struct LiveMap {
    sizing: MapSizing,
    files: MapFiles,
    checksums: Vec<u16>,
}

impl LiveMap {
    fn new(sizing: MapSizing, files: MapFiles) -> Self {
        Self {
            checksums: vec![UNSET_CHECKSUM; sizing.block_count() as usize],
            sizing,
            files,
        }
    }

    fn check(&self, map: u8, block: u32) -> Result<usize> {
        if self.sizing.contains(block) {
            Ok(block as usize)
        } else {
            Err(Error::BlockOutOfRange { map, block })
        }
    }

    fn checksum(&mut self, block: usize) -> u16 {
        if self.checksums[block] == UNSET_CHECKSUM {
            self.checksums[block] = self.compute_checksum(block);
        }
        self.checksums[block]
    }

    /// Land cells followed by the statics blob, zero filled where the files end early.
    fn compute_checksum(&self, block: usize) -> u16 {
        let mut checksum = Fletcher16::new();
        let land = self.land(block).unwrap_or_default();
        checksum.update(land).pad(LAND_SIZE - land.len());

        let (lookup, length) = self.index_record(block);
        // lengths past `i32::MAX` count as empty
        let length = if i32::try_from(length).is_ok() {
            length as usize
        } else {
            0
        };
        let statics = if lookup == EMPTY_LOOKUP {
            &[][..]
        } else {
            self.statics_at(lookup, length)
        };
        checksum.update(statics).pad(length - statics.len());
        checksum.finish()
    }

    fn index_range(&self, block: usize) -> Result<Range<usize>> {
        let start = block * STAIDX_SIZE;
        let stop = start + 8;
        if stop <= self.files.staidx.len() {
            Ok(start..stop)
        } else {
            Err(OutOfRange {
                position: start,
                requested: 8,
                len: self.files.staidx.len(),
            }
            .into())
        }
    }

    fn index_record(&self, block: usize) -> (u32, u32) {
        self.index_range(block)
            .ok()
            .and_then(|range| {
                BorrowedSource::from(&self.files.staidx[range])
                    .read(Endian::Little)
                    .ok()
            })
            .unwrap_or((EMPTY_LOOKUP, 0))
    }

    fn land(&self, block: usize) -> Option<&[u8]> {
        let start = block * BLOCK_SIZE + BLOCK_HEADER_SIZE;
        self.files.land.get(start..start + LAND_SIZE)
    }

    /// Neighbouring blocks of `block` in each direction, itself included.
    fn neighbours(&self, block: u32) -> Vec<u32> {
        let width = self.sizing.width_in_blocks();
        let height = self.sizing.height_in_blocks();
        let (x, y) = (block / height, block % height);
        let mut neighbours = Vec::with_capacity(9);
        for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                neighbours.push(nx * height + ny);
            }
        }
        neighbours
    }

    fn statics(&self, block: usize) -> (u32, &[u8]) {
        match self.index_record(block) {
            (EMPTY_LOOKUP, _) | (_, 0) => (EMPTY_LOOKUP, &[][..]),
            (lookup, length) => (lookup, self.statics_at(lookup, length as usize)),
        }
    }

    /// The part of `lookup..lookup + length` that lies before the end of the statics file.
    fn statics_at(&self, lookup: u32, length: usize) -> &[u8] {
        let eof = self.files.eof as usize;
        let start = lookup as usize;
        if start >= eof {
            return &[];
        }
        let stop = start.saturating_add(length).min(eof);
        &self.files.statics[start..stop]
    }

    fn write_index_record(&mut self, range: Range<usize>, lookup: u32, length: u32) -> Result<()> {
        let mut record = &mut self.files.staidx[range];
        Sink::new(&mut record).write(&(lookup, length), Endian::Little)?;
        Ok(())
    }

    fn write_land(&mut self, block: usize, land: &[u8]) -> Result<()> {
        let start = block * BLOCK_SIZE + BLOCK_HEADER_SIZE;
        let len = self.files.land.len();
        let cells = self
            .files
            .land
            .get_mut(start..start + LAND_SIZE)
            .ok_or(OutOfRange {
                position: start,
                requested: LAND_SIZE,
                len,
            })?;
        cells.copy_from_slice(land);
        self.checksums[block] = UNSET_CHECKSUM;
        Ok(())
    }

    /// Places `statics` for `block`, returning the disk write it still needs.
    fn write_statics(&mut self, map: u8, block: usize, statics: &[u8]) -> Result<Option<WriteRequest>> {
        let range = self.index_range(block)?;
        let length = u32::try_from(statics.len())?;
        if length == 0 {
            debug!("clearing statics of block {block} on map {map}");
            self.write_index_record(range, EMPTY_LOOKUP, 0)?;
            self.checksums[block] = UNSET_CHECKSUM;
            return Ok(None);
        }

        let (existing, existing_length) = self.index_record(block);
        let lookup = if existing != EMPTY_LOOKUP && existing_length >= length {
            trace!("writing {length} statics bytes of block {block} in place at 0x{existing:08X}");
            existing
        } else {
            trace!(
                "writing {length} statics bytes of block {block} at the end, 0x{:08X}",
                self.files.eof
            );
            self.files.eof
        };
        let end = lookup.checked_add(length).ok_or(Error::IntegralTruncation)?;

        self.files.reserve_statics(end as usize)?;
        self.files.statics[lookup as usize..end as usize].copy_from_slice(statics);
        self.files.eof = self.files.eof.max(end);
        self.write_index_record(range, lookup, length)?;
        self.checksums[block] = UNSET_CHECKSUM;

        Ok(Some(WriteRequest {
            map,
            offset: lookup.into(),
            payload: statics.to_vec(),
        }))
    }
}

#[derive(Default)]
struct Session {
    state: State,
    shard: Option<(String, PathBuf)>,
    maps: BTreeMap<u8, RwLock<LiveMap>>,
    writer: Option<Writer>,
}

impl Session {
    fn map(&self, map: u8) -> Result<&RwLock<LiveMap>> {
        if self.state != State::Active {
            return Err(Error::NotActive);
        }
        self.maps.get(&map).ok_or(Error::UnknownMap(map))
    }
}

/// Answers live map packets against a private copy of the shard's map files.
///
/// All operations take `&self`; the service can be shared with the threads
/// that read blocks while packets are being applied.
pub struct LiveMapService<O = NoopObserver> {
    options: Options,
    observer: O,
    session: RwLock<Session>,
}

impl LiveMapService {
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self::with_observer(options, NoopObserver)
    }
}

impl<O> LiveMapService<O>
where
    O: BlockObserver,
{
    #[must_use]
    pub fn with_observer(options: Options, observer: O) -> Self {
        Self {
            options,
            observer,
            session: RwLock::new(Session::default()),
        }
    }

    /// A copy of the current land and statics of `block`.
    #[must_use]
    pub fn block(&self, map: u8, block: u32) -> Option<LiveBlock> {
        let session = self.session.read();
        let live = session.map(map).ok()?.read();
        let block = live.check(map, block).ok()?;
        let (lookup, statics) = live.statics(block);
        Some(LiveBlock {
            land: live.land(block)?.to_vec(),
            lookup,
            statics: statics.to_vec(),
        })
    }

    /// Starts a session for shard `name`, replacing any session for another shard.
    ///
    /// An invalid name disables the service.
    pub fn confirm_login(&self, name: &[u8]) -> Result<()> {
        let mut session = self.session.write();
        let name = match storage::validate_shard_name(name) {
            Ok(name) => name,
            Err(err) => {
                *session = Session::default();
                return Err(err);
            }
        };

        if session.state != State::Disabled
            && session.shard.as_ref().is_some_and(|(x, _)| x == name)
        {
            debug!("live session for shard {name} is already running");
            return Ok(());
        }

        let directory = self.options.storage_root.join(name);
        info!("starting live session for shard {name} in {}", directory.display());
        *session = Session {
            state: State::AwaitingHandshake,
            shard: Some((name.to_owned(), directory)),
            ..Default::default()
        };
        Ok(())
    }

    /// Prepares the files of every defined map and activates the session.
    ///
    /// Any failure disables the service.
    pub fn define_maps(&self, definitions: &[MapDefinition]) -> Result<()> {
        let mut session = self.session.write();
        let Some((_, directory)) = session.shard.clone() else {
            return Err(Error::NotActive);
        };

        session.maps.clear();
        session.writer = None;
        match self.open_maps(&directory, definitions) {
            Ok((maps, writer)) => {
                info!("live session active with {} maps", maps.len());
                session.maps = maps;
                session.writer = Some(writer);
                session.state = State::Active;
                Ok(())
            }
            Err(err) => {
                error!("failed to prepare live maps in {}: {err}", directory.display());
                *session = Session::default();
                Err(err)
            }
        }
    }

    /// Decodes and applies one packet, returning the reply it calls for.
    ///
    /// Packets that can not be applied are logged and reported as errors; the
    /// session stays as it was unless the packet itself ends it.
    pub fn handle_packet(&self, bytes: &[u8]) -> Result<Option<HashResponse>> {
        let result = Packet::parse(bytes).and_then(|packet| self.apply(packet));
        if let Err(err) = &result {
            warn!("dropped live packet: {err}");
        }
        result
    }

    /// Checksums of the blocks around `block`.
    pub fn hash_query(&self, map: u8, block: u32) -> Result<HashResponse> {
        let session = self.session.read();
        let mut live = session.map(map)?.write();
        live.check(map, block)?;

        let mut checksums = [0; WINDOW_LEN];
        let window = live.sizing.window(block);
        for (checksum, id) in checksums.iter_mut().zip(window) {
            if let Some(id) = id {
                *checksum = live.checksum(id as usize);
            }
        }
        Ok(HashResponse {
            block,
            map,
            checksums,
        })
    }

    #[must_use]
    pub fn observer(&self) -> &O {
        &self.observer
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    #[must_use]
    pub fn shard_directory(&self) -> Option<PathBuf> {
        let session = self.session.read();
        session.shard.as_ref().map(|(_, directory)| directory.clone())
    }

    /// Ends the session, waiting for pending writes.
    pub fn shutdown(&self) {
        let mut session = self.session.write();
        if session.state != State::Disabled {
            info!("stopping live session");
        }
        *session = Session::default();
    }

    #[must_use]
    pub fn sizing(&self, map: u8) -> Option<MapSizing> {
        let session = self.session.read();
        let live = session.map(map).ok()?.read();
        Some(live.sizing)
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.session.read().state
    }

    /// Replaces the statics of `block` with `statics`, a run of 7-byte records.
    pub fn update_statics(&self, map: u8, block: u32, statics: &[u8]) -> Result<()> {
        {
            let session = self.session.read();
            session.map(map)?.read().check(map, block)?;
        }
        self.observer.evict_dynamic(map, block);

        {
            let session = self.session.read();
            let mut live = session.map(map)?.write();
            let index = live.check(map, block)?;
            if let Some(request) = live.write_statics(map, index, statics)? {
                if let Some(writer) = &session.writer {
                    writer.enqueue(request);
                }
            }
        }

        self.observer.reload_block(map, block);
        Ok(())
    }

    /// Replaces the 64 land cells of `block`.
    pub fn update_terrain(&self, map: u8, block: u32, land: &[u8]) -> Result<()> {
        if land.len() != LAND_SIZE {
            return Err(Error::MalformedPacket);
        }

        let neighbours = {
            let session = self.session.read();
            let live = session.map(map)?.read();
            live.check(map, block)?;
            live.neighbours(block)
        };
        for &neighbour in &neighbours {
            self.observer.evict_dynamic(map, neighbour);
        }

        {
            let session = self.session.read();
            let mut live = session.map(map)?.write();
            let index = live.check(map, block)?;
            live.write_land(index, land)?;
        }

        trace!("reloading {} blocks around block {block}", neighbours.len());
        for neighbour in neighbours {
            self.observer.reload_block(map, neighbour);
        }
        Ok(())
    }

    fn apply(&self, packet: Packet<'_>) -> Result<Option<HashResponse>> {
        match packet {
            Packet::HashQuery { block, map } => self.hash_query(map, block).map(Some),
            Packet::StaticsUpdate {
                block,
                map,
                statics,
            } => self.update_statics(map, block, statics).map(|()| None),
            Packet::MapDefinitions(definitions) => self.define_maps(&definitions).map(|()| None),
            Packet::LoginConfirmation { shard } => self.confirm_login(&shard).map(|()| None),
            Packet::TerrainUpdate { block, map, land } => {
                self.update_terrain(map, block, land).map(|()| None)
            }
        }
    }

    fn open_maps(
        &self,
        directory: &Path,
        definitions: &[MapDefinition],
    ) -> Result<(BTreeMap<u8, RwLock<LiveMap>>, Writer)> {
        fs::create_dir_all(directory)?;
        let mut maps = BTreeMap::new();
        let mut files = HashMap::new();
        for definition in definitions {
            let sizing = MapSizing::from_definition(definition);
            storage::bootstrap(
                &self.options.base_directory,
                directory,
                definition.map,
                &sizing,
            )?;
            let (map_files, statics) =
                MapFiles::open(directory, definition.map, self.options.statics_capacity)?;
            maps.insert(definition.map, RwLock::new(LiveMap::new(sizing, map_files)));
            files.insert(definition.map, statics);
        }

        let writer = Writer::spawn(
            files,
            self.options.poll_interval,
            self.options.shutdown_timeout,
        )?;
        Ok((maps, writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::fletcher16;
    use parking_lot::Mutex;
    use std::{
        sync::{Arc, OnceLock, Weak},
        time::Duration,
    };

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(&'static str, u8, u32)>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<(&'static str, u8, u32)> {
            core::mem::take(&mut *self.events.lock())
        }
    }

    impl BlockObserver for Recorder {
        fn evict_dynamic(&self, map: u8, block: u32) {
            self.events.lock().push(("evict", map, block));
        }

        fn reload_block(&self, map: u8, block: u32) {
            self.events.lock().push(("reload", map, block));
        }
    }

    fn options(root: &Path) -> Options {
        Options::builder()
            .storage_root(root.join("shards"))
            .base_directory(root.join("client"))
            .statics_capacity(32)
            .poll_interval(Duration::from_millis(1))
            .shutdown_timeout(Duration::from_secs(10))
            .build()
    }

    fn definition(map: u8, size: u16) -> MapDefinition {
        MapDefinition {
            map,
            width: size,
            height: size,
            wrap_width: size,
            wrap_height: size,
        }
    }

    fn active(root: &Path) -> anyhow::Result<LiveMapService<Recorder>> {
        let service = LiveMapService::with_observer(options(root), Recorder::default());
        service.confirm_login(b"test")?;
        service.define_maps(&[definition(0, 16)])?;
        Ok(service)
    }

    fn blank_land() -> Vec<u8> {
        [0x44, 0x02, 0x00].repeat(64)
    }

    #[test]
    fn inactive_services_reject_requests() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let service = LiveMapService::new(options(dir.path()));
        assert_eq!(service.state(), State::Disabled);
        assert!(matches!(service.hash_query(0, 0), Err(Error::NotActive)));
        assert!(matches!(service.update_statics(0, 0, &[]), Err(Error::NotActive)));
        assert!(matches!(
            service.define_maps(&[definition(0, 16)]),
            Err(Error::NotActive)
        ));
        assert!(service.block(0, 0).is_none());
        assert!(service.shard_directory().is_none());
        Ok(())
    }

    #[test]
    fn login_confirmation() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let service = LiveMapService::new(options(dir.path()));
        for name in [&b""[..], &b"a/b"[..], &b"a\\b"[..]] {
            assert!(matches!(service.confirm_login(name), Err(Error::InvalidShardName)));
            assert_eq!(service.state(), State::Disabled);
        }

        service.confirm_login(b"test")?;
        assert_eq!(service.state(), State::AwaitingHandshake);
        assert_eq!(
            service.shard_directory(),
            Some(dir.path().join("shards").join("test"))
        );

        service.define_maps(&[definition(0, 16)])?;
        assert_eq!(service.state(), State::Active);
        service.confirm_login(b"test")?;
        assert_eq!(service.state(), State::Active);

        service.confirm_login(b"other")?;
        assert_eq!(service.state(), State::AwaitingHandshake);
        assert!(service.confirm_login(b"../escape").is_err());
        assert_eq!(service.state(), State::Disabled);
        Ok(())
    }

    #[test]
    fn map_definitions_bootstrap_the_shard() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let service = active(dir.path())?;
        let shard = dir.path().join("shards").join("test");
        assert_eq!(fs::metadata(shard.join("map0.mul"))?.len(), 4 * BLOCK_SIZE as u64);
        assert_eq!(fs::metadata(shard.join("staidx0.mul"))?.len(), 4 * STAIDX_SIZE as u64);
        assert_eq!(fs::metadata(shard.join("statics0.mul"))?.len(), 0);

        assert_eq!(service.sizing(0), Some(MapSizing::new(0, (16, 16), (16, 16))));
        assert!(service.sizing(1).is_none());
        let block = service.block(0, 3).unwrap_or_default();
        assert_eq!(block.land, blank_land());
        assert_eq!(block.lookup, EMPTY_LOOKUP);
        assert!(block.statics.is_empty());
        Ok(())
    }

    #[test]
    fn failed_definitions_disable_the_service() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let client = dir.path().join("client");
        fs::create_dir_all(&client)?;
        fs::write(client.join("map0.mul"), [0u8; BLOCK_SIZE])?;

        let service = LiveMapService::new(options(dir.path()));
        service.confirm_login(b"test")?;
        match service.define_maps(&[definition(0, 16)]) {
            Err(Error::FileNotFound(path)) => assert!(path.ends_with("staidx0.mul")),
            Err(err) => return Err(err.into()),
            Ok(()) => anyhow::bail!("map definitions should have failed"),
        }
        assert_eq!(service.state(), State::Disabled);
        Ok(())
    }

    #[test]
    fn hash_queries_cover_the_window() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let service = active(dir.path())?;
        let response = service.hash_query(0, 0)?;
        assert_eq!((response.block, response.map), (0, 0));
        assert_eq!(response.checksums, [fletcher16(&blank_land()); WINDOW_LEN]);

        assert!(matches!(service.hash_query(3, 0), Err(Error::UnknownMap(3))));
        assert!(matches!(
            service.hash_query(0, 4),
            Err(Error::BlockOutOfRange { map: 0, block: 4 })
        ));
        Ok(())
    }

    #[test]
    fn hash_queries_inside_the_wrap_use_its_height() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let service = LiveMapService::new(options(dir.path()));
        service.confirm_login(b"test")?;
        service.define_maps(&[MapDefinition {
            map: 0,
            width: 64,
            height: 64,
            wrap_width: 32,
            wrap_height: 32,
        }])?;

        let statics = [1u8, 2, 3, 4, 5, 6, 7];
        service.update_statics(0, 5, &statics)?;
        let mut block = blank_land();
        block.extend(statics);

        let response = service.hash_query(0, 0)?;
        let blank = fletcher16(&blank_land());
        for (slot, checksum) in response.checksums.iter().enumerate() {
            let expected = if slot == 3 * 5 + 3 { fletcher16(&block) } else { blank };
            assert_eq!(*checksum, expected, "slot {slot}");
        }
        Ok(())
    }

    #[test]
    fn statics_updates_append_reuse_and_relocate() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let service = active(dir.path())?;
        let first: Vec<u8> = (0..14).collect();
        let second = [0x20u8; 7];
        let third = [0x30u8; 7];
        let fourth = [0x40u8; 14];
        let fifth = [0x50u8; 70];

        service.update_statics(0, 1, &first)?;
        assert_eq!(service.block(0, 1).map(|x| (x.lookup, x.statics)), Some((0, first.clone())));

        service.update_statics(0, 2, &second)?;
        assert_eq!(service.block(0, 2).map(|x| x.lookup), Some(14));

        service.update_statics(0, 1, &third)?;
        assert_eq!(service.block(0, 1).map(|x| (x.lookup, x.statics)), Some((0, third.to_vec())));

        service.update_statics(0, 2, &fourth)?;
        assert_eq!(service.block(0, 2).map(|x| x.lookup), Some(21));

        service.update_statics(0, 3, &fifth)?;
        assert_eq!(service.block(0, 3).map(|x| (x.lookup, x.statics)), Some((35, fifth.to_vec())));

        service.update_statics(0, 1, &[])?;
        assert_eq!(service.block(0, 1).map(|x| (x.lookup, x.statics)), Some((EMPTY_LOOKUP, Vec::new())));

        let events = service.observer().take();
        assert_eq!(events.len(), 12);
        assert_eq!(events[..2], [("evict", 0, 1), ("reload", 0, 1)]);

        service.shutdown();
        let shard = dir.path().join("shards").join("test");
        let mut expected = third.to_vec();
        expected.extend(&first[7..]);
        expected.extend(second);
        expected.extend(fourth);
        expected.extend(fifth);
        assert_eq!(fs::read(shard.join("statics0.mul"))?, expected);

        let staidx = fs::read(shard.join("staidx0.mul"))?;
        assert_eq!(staidx[12..20], [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);
        assert_eq!(staidx[24..32], [21, 0, 0, 0, 14, 0, 0, 0]);
        assert_eq!(staidx[36..44], [35, 0, 0, 0, 70, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn statics_updates_invalidate_checksums() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let service = active(dir.path())?;
        let before = service.hash_query(0, 0)?;

        let statics = [1u8, 2, 3, 4, 5, 6, 7];
        service.update_statics(0, 0, &statics)?;
        let after = service.hash_query(0, 0)?;

        let mut block = blank_land();
        block.extend(statics);
        assert_eq!(after.checksums[12], fletcher16(&block));
        assert_ne!(after.checksums[12], before.checksums[12]);
        assert_eq!(after.checksums[13], before.checksums[13]);
        Ok(())
    }

    #[test]
    fn checksums_pad_statics_past_the_end_of_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let service = active(dir.path())?;
        service.update_statics(0, 0, &[9; 7])?;
        {
            let session = service.session.read();
            let mut live = session.map(0)?.write();
            let range = live.index_range(0)?;
            live.write_index_record(range, 0, 10)?;
            live.checksums[0] = UNSET_CHECKSUM;
        }

        let mut block = blank_land();
        block.extend([9, 9, 9, 9, 9, 9, 9, 0, 0, 0]);
        assert_eq!(service.hash_query(0, 0)?.checksums[12], fletcher16(&block));
        Ok(())
    }

    #[test]
    fn terrain_updates_reload_the_neighbourhood() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let service = active(dir.path())?;
        let before = service.hash_query(0, 3)?;

        service.update_terrain(0, 3, &[7; LAND_SIZE])?;
        assert_eq!(service.block(0, 3).map(|x| x.land), Some(vec![7; LAND_SIZE]));
        let after = service.hash_query(0, 3)?;
        assert_eq!(after.checksums[12], fletcher16(&[7; LAND_SIZE]));
        assert_ne!(after.checksums[12], before.checksums[12]);

        let mut reloaded: Vec<_> = service
            .observer()
            .take()
            .into_iter()
            .filter(|x| x.0 == "reload")
            .map(|x| x.2)
            .collect();
        reloaded.sort_unstable();
        assert_eq!(reloaded, [0, 1, 2, 3]);

        assert!(matches!(
            service.update_terrain(0, 3, &[7; 10]),
            Err(Error::MalformedPacket)
        ));

        service.shutdown();
        let land = fs::read(dir.path().join("shards/test/map0.mul"))?;
        let start = 3 * BLOCK_SIZE + BLOCK_HEADER_SIZE;
        assert_eq!(land[start..start + LAND_SIZE], [7; LAND_SIZE]);
        Ok(())
    }

    #[derive(Default)]
    struct Snapshots {
        service: OnceLock<Weak<LiveMapService<Snapshots>>>,
        seen: Mutex<Vec<(&'static str, LiveBlock)>>,
    }

    impl Snapshots {
        fn record(&self, event: &'static str, map: u8, block: u32) {
            let service = self.service.get().and_then(Weak::upgrade);
            if let Some(block) = service.and_then(|x| x.block(map, block)) {
                self.seen.lock().push((event, block));
            }
        }
    }

    impl BlockObserver for Snapshots {
        fn evict_dynamic(&self, map: u8, block: u32) {
            self.record("evict", map, block);
        }

        fn reload_block(&self, map: u8, block: u32) {
            self.record("reload", map, block);
        }
    }

    #[test]
    fn eviction_sees_the_old_block() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let service = Arc::new(LiveMapService::with_observer(
            options(dir.path()),
            Snapshots::default(),
        ));
        let _ = service.observer().service.set(Arc::downgrade(&service));
        service.confirm_login(b"test")?;
        service.define_maps(&[definition(0, 16)])?;

        service.update_statics(0, 2, &[5; 7])?;
        let seen = core::mem::take(&mut *service.observer().seen.lock());
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "evict");
        assert!(seen[0].1.statics.is_empty());
        assert_eq!(seen[1].0, "reload");
        assert_eq!(seen[1].1.statics, [5; 7]);

        service.update_terrain(0, 0, &[9; LAND_SIZE])?;
        let seen = core::mem::take(&mut *service.observer().seen.lock());
        let old = seen.iter().filter(|x| x.0 == "evict").map(|x| &x.1);
        assert!(old.clone().count() == 4 && old.clone().all(|x| x.land == blank_land()));
        let reloaded: Vec<_> = seen.iter().filter(|x| x.0 == "reload").collect();
        assert_eq!(reloaded.len(), 4);
        assert!(reloaded.iter().any(|x| x.1.land == [9; LAND_SIZE]));

        service.shutdown();
        Ok(())
    }

    #[test]
    fn packets_drive_the_session() -> anyhow::Result<()> {
        fn live_packet(command: u8, block: u32, count: u32, payload: &[u8]) -> Vec<u8> {
            let mut bytes = vec![0x3F, 0, 0];
            bytes.extend(block.to_be_bytes());
            bytes.extend(count.to_be_bytes());
            bytes.extend([0, 0, command, 0]);
            bytes.extend(payload);
            bytes
        }

        let dir = tempfile::tempdir()?;
        let service = LiveMapService::new(options(dir.path()));

        let mut name = b"test".to_vec();
        name.resize(28, 0);
        assert!(service.handle_packet(&live_packet(0x02, 0, 0, &name))?.is_none());
        assert_eq!(service.state(), State::AwaitingHandshake);

        let mut definitions = vec![0];
        for value in [16u16, 16, 16, 16] {
            definitions.extend(value.to_be_bytes());
        }
        service.handle_packet(&live_packet(0x01, 0, 2, &definitions))?;
        assert_eq!(service.state(), State::Active);

        service.handle_packet(&live_packet(0x00, 2, 1, &[1, 2, 3, 4, 5, 6, 7]))?;
        assert_eq!(service.block(0, 2).map(|x| x.statics), Some(vec![1, 2, 3, 4, 5, 6, 7]));

        let mut terrain = vec![0x40];
        terrain.extend(1u32.to_be_bytes());
        terrain.extend([3; LAND_SIZE]);
        terrain.extend([0, 0, 0, 0]);
        service.handle_packet(&terrain)?;
        assert_eq!(service.block(0, 1).map(|x| x.land), Some(vec![3; LAND_SIZE]));

        let Some(response) = service.handle_packet(&live_packet(0xFF, 1, 0, &[]))? else {
            anyhow::bail!("hash queries should be answered");
        };
        assert_eq!(response.checksums[12], fletcher16(&[3; LAND_SIZE]));
        assert_eq!(response.to_bytes().len(), HashResponse::LEN);

        assert!(service.handle_packet(&[0x3F, 0, 3]).is_err());
        assert!(service.handle_packet(&live_packet(0xFF, 1, 0, &[])[..14]).is_err());
        assert_eq!(service.state(), State::Active);
        Ok(())
    }
}
