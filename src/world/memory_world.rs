//! In-memory chunk store implementing [`WorldAccess`]
//!
//! Chunks are either resident (visible through the port) or stored (known but
//! unloaded). Loading a stored chunk publishes a load event on a channel so a
//! host loop can forward it to `StormSession::on_chunk_loaded`.

use std::collections::HashSet;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use super::{BlockId, BlockRegistry, ChunkPos, VoxelPos, WorldAccess};
use crate::constants::world::CHUNK_SIZE;

const COLUMN_AREA: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize;

/// One 16 x height x 16 column of blocks
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkColumn {
    height: i32,
    blocks: Vec<BlockId>,
}

impl ChunkColumn {
    /// Column filled with air
    pub fn empty(height: i32) -> Self {
        let height = height.max(1);
        Self {
            height,
            blocks: vec![BlockId::AIR; COLUMN_AREA * height as usize],
        }
    }

    /// Flat terrain: stone below, dirt layers, `top` at `surface_y`
    pub fn flat(height: i32, surface_y: i32, top: BlockId) -> Self {
        let mut column = Self::empty(height);
        for x in 0..CHUNK_SIZE as usize {
            for z in 0..CHUNK_SIZE as usize {
                for y in 0..=surface_y.min(column.height - 1) {
                    let block = if y == surface_y {
                        top
                    } else if y >= surface_y - 3 {
                        BlockId::DIRT
                    } else {
                        BlockId::STONE
                    };
                    column.set(x, y, z, block);
                }
            }
        }
        column
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    fn index(&self, x: usize, y: i32, z: usize) -> Option<usize> {
        if y < 0 || y >= self.height || x >= CHUNK_SIZE as usize || z >= CHUNK_SIZE as usize {
            return None;
        }
        Some((y as usize * CHUNK_SIZE as usize + z) * CHUNK_SIZE as usize + x)
    }

    pub fn get(&self, x: usize, y: i32, z: usize) -> BlockId {
        self.index(x, y, z)
            .map(|i| self.blocks[i])
            .unwrap_or(BlockId::AIR)
    }

    pub fn set(&mut self, x: usize, y: i32, z: usize, block: BlockId) -> bool {
        match self.index(x, y, z) {
            Some(i) => {
                self.blocks[i] = block;
                true
            }
            None => false,
        }
    }

    /// Highest non-air block in a local column
    pub fn surface_height(&self, x: usize, z: usize) -> Option<i32> {
        (0..self.height).rev().find(|&y| !self.get(x, y, z).is_air())
    }
}

/// Thread-safe chunk store for tests and headless hosts
pub struct MemoryWorld {
    resident: Arc<DashMap<ChunkPos, Arc<RwLock<ChunkColumn>>>>,
    stored: DashMap<ChunkPos, ChunkColumn>,
    forced: Mutex<HashSet<ChunkPos>>,
    /// Chunks requested by force-load that have not materialised yet
    pending_materialize: Mutex<Vec<ChunkPos>>,
    deferred_force_load: bool,
    registry: BlockRegistry,
    load_sender: Sender<ChunkPos>,
    load_receiver: Receiver<ChunkPos>,
}

impl MemoryWorld {
    pub fn new(registry: BlockRegistry) -> Self {
        let (load_sender, load_receiver) = unbounded();
        Self {
            resident: Arc::new(DashMap::new()),
            stored: DashMap::new(),
            forced: Mutex::new(HashSet::new()),
            pending_materialize: Mutex::new(Vec::new()),
            deferred_force_load: false,
            registry,
            load_sender,
            load_receiver,
        }
    }

    /// Force-loaded chunks only become resident on [`Self::materialize_pending`]
    pub fn with_deferred_force_load(mut self) -> Self {
        self.deferred_force_load = true;
        self
    }

    /// Add a chunk, either resident or stored
    pub fn insert_chunk(&self, pos: ChunkPos, column: ChunkColumn, loaded: bool) {
        if loaded {
            self.stored.remove(&pos);
            self.resident.insert(pos, Arc::new(RwLock::new(column)));
        } else {
            self.resident.remove(&pos);
            self.stored.insert(pos, column);
        }
    }

    /// Move a stored chunk into residence and publish a load event
    pub fn load_chunk(&self, pos: ChunkPos) -> bool {
        if self.resident.contains_key(&pos) {
            return true;
        }
        match self.stored.remove(&pos) {
            Some((_, column)) => {
                self.resident.insert(pos, Arc::new(RwLock::new(column)));
                let _ = self.load_sender.send(pos);
                log::trace!("Chunk {} loaded", pos);
                true
            }
            None => false,
        }
    }

    /// Move a resident chunk back to storage
    pub fn unload_chunk(&self, pos: ChunkPos) -> bool {
        match self.resident.remove(&pos) {
            Some((_, column)) => {
                let column = column.read().clone();
                self.stored.insert(pos, column);
                self.forced.lock().remove(&pos);
                true
            }
            None => false,
        }
    }

    /// Complete force-loads queued while deferred loading is enabled
    pub fn materialize_pending(&self) -> usize {
        let pending: Vec<ChunkPos> = std::mem::take(&mut *self.pending_materialize.lock());
        pending.into_iter().filter(|&pos| self.load_chunk(pos)).count()
    }

    /// Drain load events published since the last call
    pub fn drain_load_events(&self) -> Vec<ChunkPos> {
        self.load_receiver.try_iter().collect()
    }

    pub fn is_forced(&self, pos: ChunkPos) -> bool {
        self.forced.lock().contains(&pos)
    }

    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    fn column(&self, pos: VoxelPos) -> Option<Arc<RwLock<ChunkColumn>>> {
        self.resident.get(&pos.chunk()).map(|entry| Arc::clone(&entry))
    }
}

impl WorldAccess for MemoryWorld {
    fn get_block(&self, pos: VoxelPos) -> BlockId {
        let (x, z) = pos.to_local();
        match self.column(pos) {
            Some(column) => column.read().get(x, pos.y, z),
            None => BlockId::AIR,
        }
    }

    fn set_block(&self, pos: VoxelPos, block: BlockId) -> bool {
        let (x, z) = pos.to_local();
        match self.column(pos) {
            Some(column) => column.write().set(x, pos.y, z, block),
            None => false,
        }
    }

    fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool {
        self.resident.contains_key(&chunk)
    }

    fn force_load_chunk(&self, chunk: ChunkPos) -> bool {
        if self.resident.contains_key(&chunk) {
            return true;
        }
        if !self.stored.contains_key(&chunk) {
            return false;
        }
        self.forced.lock().insert(chunk);
        if self.deferred_force_load {
            self.pending_materialize.lock().push(chunk);
            return true;
        }
        self.load_chunk(chunk)
    }

    fn unforce_load_chunk(&self, chunk: ChunkPos) {
        let was_forced = self.forced.lock().remove(&chunk);
        if was_forced {
            self.unload_chunk(chunk);
        }
    }

    fn surface_height(&self, x: i32, z: i32) -> Option<i32> {
        let pos = VoxelPos::new(x, 0, z);
        let (lx, lz) = pos.to_local();
        self.column(pos)?.read().surface_height(lx, lz)
    }

    fn registry(&self) -> &BlockRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_stored_chunk() -> MemoryWorld {
        let world = MemoryWorld::new(BlockRegistry::with_defaults());
        world.insert_chunk(ChunkPos::new(0, 0), ChunkColumn::flat(32, 10, BlockId::GRASS), false);
        world
    }

    #[test]
    fn test_flat_column_surface() {
        let column = ChunkColumn::flat(32, 10, BlockId::GRASS);
        assert_eq!(column.surface_height(3, 3), Some(10));
        assert_eq!(column.get(3, 10, 3), BlockId::GRASS);
        assert_eq!(column.get(3, 8, 3), BlockId::DIRT);
        assert_eq!(column.get(3, 2, 3), BlockId::STONE);
    }

    #[test]
    fn test_load_publishes_event() {
        let world = world_with_stored_chunk();
        assert!(!world.is_chunk_loaded(ChunkPos::new(0, 0)));
        assert!(world.load_chunk(ChunkPos::new(0, 0)));
        assert_eq!(world.drain_load_events(), vec![ChunkPos::new(0, 0)]);
        assert_eq!(world.surface_height(5, 5), Some(10));
    }

    #[test]
    fn test_force_load_and_release() {
        let world = world_with_stored_chunk();
        assert!(world.force_load_chunk(ChunkPos::new(0, 0)));
        assert!(world.is_forced(ChunkPos::new(0, 0)));
        world.unforce_load_chunk(ChunkPos::new(0, 0));
        assert!(!world.is_chunk_loaded(ChunkPos::new(0, 0)));
    }

    #[test]
    fn test_deferred_force_load() {
        let world = world_with_stored_chunk().with_deferred_force_load();
        assert!(world.force_load_chunk(ChunkPos::new(0, 0)));
        assert!(!world.is_chunk_loaded(ChunkPos::new(0, 0)));
        assert_eq!(world.materialize_pending(), 1);
        assert!(world.is_chunk_loaded(ChunkPos::new(0, 0)));
    }

    #[test]
    fn test_writes_to_unloaded_chunk_fail() {
        let world = world_with_stored_chunk();
        assert!(!world.set_block(VoxelPos::new(1, 10, 1), BlockId::DIRT));
        assert_eq!(world.get_block(VoxelPos::new(1, 10, 1)), BlockId::AIR);
    }
}
