//! Pending retroactive analysis
//!
//! When a tornado passes near a chunk that is not resident, the wind
//! parameters at that moment are parked here until the chunk loads.

use dashmap::DashMap;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::time::{elapsed_since, Timestamp};
use crate::weather::{StormId, WindField};
use crate::world::ChunkPos;

/// Wind parameters at the moment a chunk should have been damaged
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetroactiveDamageInfo {
    pub tornado_position: Vec3,
    pub windspeed: f32,
    pub windfield_width: f32,
    pub timestamp: Timestamp,
}

impl RetroactiveDamageInfo {
    pub fn wind_field(&self) -> WindField {
        WindField::new(self.tornado_position, self.windspeed, self.windfield_width)
    }

    /// Wind the vortex produced at the chunk centre
    pub fn speed_at_chunk_center(&self, chunk: ChunkPos) -> f32 {
        let center = chunk.center();
        self.wind_field()
            .speed_at(Vec3::new(center.x, self.tornado_position.y, center.y))
    }

    pub fn is_stale(&self, now: Timestamp, ttl_ms: u64) -> bool {
        elapsed_since(self.timestamp, now) > ttl_ms
    }
}

/// Result of taking an entry out of the scheduler
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrainOutcome {
    Ready(RetroactiveDamageInfo),
    /// Older than the TTL; dropped unprocessed
    Stale,
    Missing,
}

pub struct RetroactiveScheduler {
    pending: DashMap<(StormId, ChunkPos), RetroactiveDamageInfo>,
    ttl_ms: u64,
}

impl RetroactiveScheduler {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            pending: DashMap::new(),
            ttl_ms,
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Park work for a chunk. An existing entry is kept if it saw stronger
    /// wind at the chunk centre; ties go to the newer pass.
    pub fn queue(&self, tornado: StormId, chunk: ChunkPos, info: RetroactiveDamageInfo) {
        let mut replaced = false;
        self.pending
            .entry((tornado, chunk))
            .and_modify(|existing| {
                if info.speed_at_chunk_center(chunk) >= existing.speed_at_chunk_center(chunk) {
                    *existing = info;
                    replaced = true;
                }
            })
            .or_insert_with(|| {
                replaced = true;
                info
            });
        if replaced {
            log::trace!(
                "Queued retroactive analysis for tornado {} chunk {} ({:.0} mph)",
                tornado,
                chunk,
                info.windspeed
            );
        }
    }

    pub fn contains(&self, tornado: StormId, chunk: ChunkPos) -> bool {
        self.pending.contains_key(&(tornado, chunk))
    }

    pub fn peek(&self, tornado: StormId, chunk: ChunkPos) -> Option<RetroactiveDamageInfo> {
        self.pending.get(&(tornado, chunk)).map(|entry| *entry.value())
    }

    /// Remove one entry, reporting whether it is still usable
    pub fn take(&self, tornado: StormId, chunk: ChunkPos, now: Timestamp) -> DrainOutcome {
        match self.pending.remove(&(tornado, chunk)) {
            Some((_, info)) if info.is_stale(now, self.ttl_ms) => {
                log::debug!(
                    "Dropping stale retroactive entry for tornado {} chunk {}",
                    tornado,
                    chunk
                );
                DrainOutcome::Stale
            }
            Some((_, info)) => DrainOutcome::Ready(info),
            None => DrainOutcome::Missing,
        }
    }

    /// Remove every entry for a chunk that just loaded; stale ones are discarded
    pub fn drain_chunk(&self, chunk: ChunkPos, now: Timestamp) -> Vec<(StormId, RetroactiveDamageInfo)> {
        let tornadoes: Vec<StormId> = self
            .pending
            .iter()
            .filter(|entry| entry.key().1 == chunk)
            .map(|entry| entry.key().0)
            .collect();

        let mut ready = Vec::new();
        for tornado in tornadoes {
            if let DrainOutcome::Ready(info) = self.take(tornado, chunk, now) {
                ready.push((tornado, info));
            }
        }
        ready.sort_by_key(|(tornado, _)| *tornado);
        ready
    }

    /// Opportunistic garbage collection of expired entries
    pub fn purge_stale(&self, now: Timestamp) -> usize {
        let before = self.pending.len();
        let ttl = self.ttl_ms;
        self.pending.retain(|_, info| !info.is_stale(now, ttl));
        let purged = before - self.pending.len();
        if purged > 0 {
            log::debug!("Purged {} stale retroactive entries", purged);
        }
        purged
    }

    pub fn remove_tornado(&self, tornado: StormId) {
        self.pending.retain(|key, _| key.0 != tornado);
    }

    pub fn pending_for(&self, tornado: StormId) -> Vec<ChunkPos> {
        let mut chunks: Vec<ChunkPos> = self
            .pending
            .iter()
            .filter(|entry| entry.key().0 == tornado)
            .map(|entry| entry.key().1)
            .collect();
        chunks.sort();
        chunks
    }

    pub fn clear(&self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
