use dashmap::DashMap;

use super::evidence::{ChunkDamageData, DamageRecord, ScouringLevel};
use super::rating::EfRating;
use crate::time::Timestamp;
use crate::weather::StormId;
use crate::world::{ChunkPos, VoxelPos};

/// Evidence ledger keyed by (tornado, chunk).
///
/// Written by the tick loop and by chunk-load callbacks; every mutator
/// touches a single key so interleaved writers never lose evidence.
#[derive(Debug, Default)]
pub struct EvidenceLedger {
    entries: DashMap<(StormId, ChunkPos), ChunkDamageData>,
}

impl EvidenceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate the entry for a pair, creating it on first use
    fn update<R>(
        &self,
        tornado: StormId,
        chunk: ChunkPos,
        f: impl FnOnce(&mut ChunkDamageData) -> R,
    ) -> R {
        let mut entry = self
            .entries
            .entry((tornado, chunk))
            .or_insert_with(|| ChunkDamageData::new(chunk));
        f(entry.value_mut())
    }

    pub fn add_damage(&self, tornado: StormId, pos: VoxelPos, record: DamageRecord) {
        self.update(tornado, pos.chunk(), |data| data.add_damage(pos, record));
    }

    pub fn add_debarking_evidence(&self, tornado: StormId, pos: VoxelPos) {
        self.update(tornado, pos.chunk(), |data| data.add_debarking_evidence(pos));
    }

    pub fn add_scouring_evidence(&self, tornado: StormId, pos: VoxelPos, level: ScouringLevel) {
        self.update(tornado, pos.chunk(), |data| data.add_scouring_evidence(pos, level));
    }

    pub fn mark_surveyed(
        &self,
        tornado: StormId,
        chunk: ChunkPos,
        surveyed_by: &str,
        survey_time: Timestamp,
        rating: EfRating,
        windspeed: f32,
    ) {
        self.update(tornado, chunk, |data| {
            data.mark_surveyed(surveyed_by, survey_time, rating, windspeed)
        });
    }

    /// Snapshot of one chunk's evidence
    pub fn get(&self, tornado: StormId, chunk: ChunkPos) -> Option<ChunkDamageData> {
        self.entries
            .get(&(tornado, chunk))
            .map(|entry| entry.value().clone())
    }

    pub fn has_damage(&self, tornado: StormId, chunk: ChunkPos) -> bool {
        self.entries
            .get(&(tornado, chunk))
            .map(|entry| entry.has_damage())
            .unwrap_or(false)
    }

    /// Rating and windspeed a surveyor would assign, if the chunk has evidence
    pub fn assess(&self, tornado: StormId, chunk: ChunkPos) -> Option<(EfRating, f32)> {
        self.entries
            .get(&(tornado, chunk))
            .filter(|entry| entry.has_damage())
            .map(|entry| entry.survey_assessment())
    }

    /// Chunks of a tornado that hold any evidence, sorted
    pub fn chunks_with_evidence(&self, tornado: StormId) -> Vec<ChunkPos> {
        let mut chunks: Vec<ChunkPos> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == tornado && entry.has_damage())
            .map(|entry| entry.key().1)
            .collect();
        chunks.sort();
        chunks
    }

    /// Every entry of a tornado, sorted by chunk
    pub fn entries_for(&self, tornado: StormId) -> Vec<ChunkDamageData> {
        let mut entries: Vec<ChunkDamageData> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == tornado)
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|data| data.chunk);
        entries
    }

    /// All entries, for persistence
    pub fn snapshot(&self) -> Vec<(StormId, ChunkDamageData)> {
        let mut all: Vec<(StormId, ChunkDamageData)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().0, entry.value().clone()))
            .collect();
        all.sort_by_key(|(id, data)| (*id, data.chunk));
        all
    }

    /// Insert a loaded entry, replacing any existing one
    pub fn insert(&self, tornado: StormId, data: ChunkDamageData) {
        self.entries.insert((tornado, data.chunk), data);
    }

    /// Drop every entry of a tornado (admin reset)
    pub fn remove_tornado(&self, tornado: StormId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.0 != tornado);
        before - self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::BlockId;

    #[test]
    fn test_lazy_creation() {
        let ledger = EvidenceLedger::new();
        assert!(ledger.get(1, ChunkPos::new(0, 0)).is_none());
        ledger.add_debarking_evidence(1, VoxelPos::new(3, 70, 3));
        let data = ledger.get(1, ChunkPos::new(0, 0)).unwrap();
        assert!(data.has_damage());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_evidence_keyed_by_tornado() {
        let ledger = EvidenceLedger::new();
        ledger.add_scouring_evidence(1, VoxelPos::new(3, 64, 3), ScouringLevel::GrassToDirt);
        ledger.add_scouring_evidence(2, VoxelPos::new(20, 64, 3), ScouringLevel::DirtToMedium);
        assert_eq!(ledger.chunks_with_evidence(1), vec![ChunkPos::new(0, 0)]);
        assert_eq!(ledger.chunks_with_evidence(2), vec![ChunkPos::new(1, 0)]);
        assert!(!ledger.has_damage(1, ChunkPos::new(1, 0)));
    }

    #[test]
    fn test_assess_requires_evidence() {
        let ledger = EvidenceLedger::new();
        ledger.mark_surveyed(1, ChunkPos::new(0, 0), "A", 5, EfRating::EF1, 100.0);
        assert!(ledger.assess(1, ChunkPos::new(0, 0)).is_none());

        ledger.add_damage(
            1,
            VoxelPos::new(1, 65, 1),
            DamageRecord {
                original_block: BlockId::GLASS,
                resulting_block: BlockId::AIR,
                strength_threshold: 92.0,
                timestamp: 0,
                tornado_windspeed: 120.0,
            },
        );
        let (rating, windspeed) = ledger.assess(1, ChunkPos::new(0, 0)).unwrap();
        assert_eq!(rating, EfRating::EF2);
        assert_eq!(windspeed, 120.0);
    }

    #[test]
    fn test_remove_tornado() {
        let ledger = EvidenceLedger::new();
        ledger.add_debarking_evidence(1, VoxelPos::new(0, 70, 0));
        ledger.add_debarking_evidence(1, VoxelPos::new(40, 70, 0));
        ledger.add_debarking_evidence(2, VoxelPos::new(0, 70, 0));
        assert_eq!(ledger.remove_tornado(1), 2);
        assert_eq!(ledger.len(), 1);
    }
}
