//! Live map editing
//!
//! A server speaking the live map protocol can rewrite the terrain and
//! statics of a running client. The client keeps a private copy of the
//! affected map files per shard, answers checksum queries for the blocks
//! around the player, and applies updates to memory immediately while a
//! background thread writes them to disk.
//!
//! A session moves from [`State::Disabled`] to [`State::AwaitingHandshake`]
//! when the server confirms the shard name, and to [`State::Active`] once it
//! has declared which maps exist.
//!
//! # Handling packets
//! ```rust,no_run
//! use std::path::PathBuf;
//! use uofile::live::{LiveMapService, Options};
//!
//! fn example(packets: &[Vec<u8>]) {
//!     let options = Options::builder()
//!         .storage_root(PathBuf::from("path/to/shards"))
//!         .base_directory(PathBuf::from("path/to/ultima"))
//!         .build();
//!     let service = LiveMapService::new(options);
//!     for packet in packets {
//!         if let Ok(Some(response)) = service.handle_packet(packet) {
//!             let _reply = response.to_bytes();
//!         }
//!     }
//! }
//! ```

mod checksum;
mod packet;
mod service;
mod sizing;
mod storage;
mod writer;

pub use self::{
    checksum::{fletcher16, Fletcher16},
    packet::{HashResponse, MapDefinition, Packet},
    service::{LiveBlock, LiveMapService},
    sizing::{MapSizing, WINDOW_LEN},
    storage::validate_shard_name,
};

use crate::{io::OutOfRange, uop};
use core::num::TryFromIntError;
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

/// The statics view reserved up front for each live map.
pub const DEFAULT_STATICS_CAPACITY: usize = 200_000_000;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("block {block} is outside of map {map}")]
    BlockOutOfRange { map: u8, block: u32 },

    #[error("map file is empty: {0}")]
    EmptyFile(PathBuf),

    #[error("no map file found at {0}")]
    FileNotFound(PathBuf),

    #[error("an operation resulted in integral truncation")]
    IntegralTruncation,

    #[error("shard name can not be used as a directory name")]
    InvalidShardName,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("packet is malformed")]
    MalformedPacket,

    #[error("no live session is active")]
    NotActive,

    #[error(transparent)]
    OutOfRange(#[from] OutOfRange),

    #[error("unknown live command 0x{0:02X}")]
    UnknownCommand(u8),

    #[error("map {0} has not been defined by the server")]
    UnknownMap(u8),

    #[error("unknown live packet 0x{0:02X}")]
    UnknownPacket(u8),

    #[error(transparent)]
    Uop(#[from] uop::Error),
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Self::IntegralTruncation
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum State {
    #[default]
    Disabled,
    AwaitingHandshake,
    Active,
}

/// Hooks for whoever renders the map.
///
/// Neither call holds the service's locks, so an observer may read the block
/// through [`LiveMapService::block`]: `evict_dynamic` still sees the old
/// contents, `reload_block` the new ones.
pub trait BlockObserver: Send + Sync {
    /// Items and mobiles standing on `block` should be detached; it is about to change.
    fn evict_dynamic(&self, map: u8, block: u32) {
        let _ = (map, block);
    }

    /// The land or statics of `block` changed.
    fn reload_block(&self, map: u8, block: u32) {
        let _ = (map, block);
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl BlockObserver for NoopObserver {}

/// See also [`Options`].
#[derive(Clone, Debug, Default)]
#[repr(transparent)]
pub struct OptionsBuilder(Options);

impl OptionsBuilder {
    #[must_use]
    pub fn base_directory(mut self, base_directory: PathBuf) -> Self {
        self.0.base_directory = base_directory;
        self
    }

    #[must_use]
    pub fn build(self) -> Options {
        self.0
    }

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.0.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.0.shutdown_timeout = shutdown_timeout;
        self
    }

    #[must_use]
    pub fn statics_capacity(mut self, statics_capacity: usize) -> Self {
        self.0.statics_capacity = statics_capacity;
        self
    }

    #[must_use]
    pub fn storage_root(mut self, storage_root: PathBuf) -> Self {
        self.0.storage_root = storage_root;
        self
    }
}

/// Where shard copies live, and how the writer behaves.
///
/// ```rust
/// use std::{path::PathBuf, time::Duration};
/// use uofile::live::Options;
///
/// let options = Options::builder()
///     .storage_root(PathBuf::from("shards"))
///     .base_directory(PathBuf::from("ultima"))
///     .poll_interval(Duration::from_millis(5))
///     .build();
/// assert_eq!(options.statics_capacity(), uofile::live::DEFAULT_STATICS_CAPACITY);
/// ```
#[derive(Clone, Debug)]
pub struct Options {
    base_directory: PathBuf,
    poll_interval: Duration,
    shutdown_timeout: Duration,
    statics_capacity: usize,
    storage_root: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::new(),
            poll_interval: Duration::from_millis(10),
            shutdown_timeout: Duration::from_secs(5),
            statics_capacity: DEFAULT_STATICS_CAPACITY,
            storage_root: PathBuf::new(),
        }
    }
}

impl Options {
    #[must_use]
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::new()
    }

    /// The client installation that shard copies are made from.
    #[must_use]
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// How long the writer sleeps when its queue is empty.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// How long dropping a session waits for pending writes.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    #[must_use]
    pub fn statics_capacity(&self) -> usize {
        self.statics_capacity
    }

    /// The directory holding one subdirectory per shard.
    #[must_use]
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }
}
