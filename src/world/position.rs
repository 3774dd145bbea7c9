use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::constants::world::{CHUNK_SIZE, CHUNK_SIZE_F32};

/// Position of a chunk column in the world (chunk coordinates)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing the given block column
    pub fn from_block_coords(block_x: i32, block_z: i32) -> Self {
        Self::new(block_x.div_euclid(CHUNK_SIZE), block_z.div_euclid(CHUNK_SIZE))
    }

    /// Chunk containing a world-space point
    pub fn from_world_pos(pos: Vec3) -> Self {
        Self::from_block_coords(pos.x.floor() as i32, pos.z.floor() as i32)
    }

    /// Smallest block x/z inside this chunk
    pub fn min_block(&self) -> (i32, i32) {
        (self.x * CHUNK_SIZE, self.z * CHUNK_SIZE)
    }

    /// Horizontal centre of the chunk in world space
    pub fn center(&self) -> Vec2 {
        Vec2::new(
            self.x as f32 * CHUNK_SIZE_F32 + CHUNK_SIZE_F32 / 2.0,
            self.z as f32 * CHUNK_SIZE_F32 + CHUNK_SIZE_F32 / 2.0,
        )
    }

    /// Horizontal distance from the chunk centre to a world-space point
    pub fn center_distance_to(&self, pos: Vec3) -> f32 {
        self.center().distance(Vec2::new(pos.x, pos.z))
    }

    /// Create a new chunk position offset by the given amounts
    pub fn offset(&self, dx: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }

    /// All chunks whose centre lies within `radius` blocks of `pos`
    pub fn within_radius(pos: Vec3, radius: f32) -> Vec<ChunkPos> {
        let origin = ChunkPos::from_world_pos(pos);
        let reach = (radius / CHUNK_SIZE_F32).ceil() as i32 + 1;
        let mut chunks = Vec::new();
        for dx in -reach..=reach {
            for dz in -reach..=reach {
                let chunk = origin.offset(dx, dz);
                if chunk.center_distance_to(pos) <= radius {
                    chunks.push(chunk);
                }
            }
        }
        chunks
    }
}

impl std::fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

/// Position of a block in the world (world coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Get the chunk this block belongs to
    pub fn chunk(&self) -> ChunkPos {
        ChunkPos::from_block_coords(self.x, self.z)
    }

    /// Get local (x, z) position within the chunk
    pub fn to_local(&self) -> (usize, usize) {
        (
            self.x.rem_euclid(CHUNK_SIZE) as usize,
            self.z.rem_euclid(CHUNK_SIZE) as usize,
        )
    }

    /// World-space centre of the block
    pub fn center(&self) -> Vec3 {
        Vec3::new(self.x as f32 + 0.5, self.y as f32 + 0.5, self.z as f32 + 0.5)
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}
