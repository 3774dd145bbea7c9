//! World model seen by the damage engine
//!
//! Positions, block identities and properties, and the [`WorldAccess`] port
//! through which the host game exposes terrain.

mod block;
mod memory_world;
mod position;
mod registry;
mod world_interface;

pub use block::{BlockCategory, BlockId, BlockProperties};
pub use memory_world::{ChunkColumn, MemoryWorld};
pub use position::{ChunkPos, VoxelPos};
pub use registry::BlockRegistry;
pub use world_interface::WorldAccess;
