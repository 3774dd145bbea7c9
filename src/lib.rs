//! Tornado damage survey core
//!
//! Tracks tornadoes reported by an external weather simulation, collects
//! physical damage evidence from the voxel world as they pass (or later,
//! when terrain that was not resident gets loaded), and runs the
//! client/server survey workflow that turns that evidence into a published
//! Enhanced Fujita rating.
//!
//! Hosts wire a [`weather::WeatherFeed`] and a [`world::WorldAccess`] into a
//! [`session::StormSession`] and forward their tick, chunk-load,
//! block-change and network events to it.

pub mod config;
pub mod constants;
pub mod damage;
pub mod error;
pub mod network;
pub mod persistence;
pub mod session;
pub mod survey;
pub mod time;
pub mod tracking;
pub mod weather;
pub mod world;

pub use config::{ConfigError, SurveyConfig};
pub use damage::{
    windspeed_to_ef_rating, ChunkDamageData, DamageDetector, DamageRecord, EfRating, EvidenceLedger,
    RetroactiveDamageInfo, RetroactiveScheduler, ScouringLevel,
};
pub use error::{StormError, StormResult};
pub use network::{ClientPacket, Packet, ServerPacket, SurveyUpdateKind};
pub use persistence::{PersistenceError, SurveyDataStore};
pub use session::{StormSession, TickReport};
pub use survey::{SurveyClient, SurveyRejection, SurveyServer};
pub use time::{now_millis, Timestamp};
pub use tracking::{PositionSample, TornadoTrack, TornadoTracker, TrackSummary};
pub use weather::{
    DisabledFeed, FeedMonitor, SharedFeed, StormId, StormSnapshot, StormType, WeatherFeed, WindField,
};
pub use world::{BlockId, BlockRegistry, ChunkPos, MemoryWorld, VoxelPos, WorldAccess};
