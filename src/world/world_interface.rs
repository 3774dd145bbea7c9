//! Host world port
//!
//! The damage detector and the candidate filter only see the world through
//! this trait. Implementations must be callable from both the tick loop and
//! the chunk-load callback.

use super::{BlockId, BlockRegistry, ChunkPos, VoxelPos};

pub trait WorldAccess: Send + Sync {
    /// Block at a position; air for unloaded or out-of-range positions
    fn get_block(&self, pos: VoxelPos) -> BlockId;

    /// Replace a block. Returns false when the position is not resident or
    /// the host does not allow writes from this side.
    fn set_block(&self, pos: VoxelPos, block: BlockId) -> bool;

    fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool;

    /// Request that a chunk be loaded and kept resident. Server-authoritative;
    /// the chunk data may only materialise some time after this returns.
    fn force_load_chunk(&self, chunk: ChunkPos) -> bool;

    fn unforce_load_chunk(&self, chunk: ChunkPos);

    /// Y of the highest non-air block in a column, if the column is loaded
    fn surface_height(&self, x: i32, z: i32) -> Option<i32>;

    /// Block properties known to this world
    fn registry(&self) -> &BlockRegistry;
}
