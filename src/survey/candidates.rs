//! Candidate chunk selection for a survey
//!
//! A tornado's damaged-chunk set is narrowed to chunks that actually hold
//! ledger evidence. Chunks not yet evaluated get a retroactive pass first,
//! force-loading them if needed and waiting a fixed, bounded time for the
//! host to materialise them. Anything still not resident after the wait is
//! treated as having no evidence.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;

use crate::damage::{DamageDetector, DrainOutcome, EvidenceLedger, RetroactiveDamageInfo, RetroactiveScheduler};
use crate::time::{elapsed_since, Timestamp};
use crate::tracking::TornadoTrack;
use crate::weather::StormId;
use crate::world::{ChunkPos, WorldAccess};

/// Chunks this crate force-loaded, with the time each was requested
#[derive(Debug, Default)]
pub struct ForcedChunks {
    forced: Mutex<HashMap<ChunkPos, Timestamp>>,
}

impl ForcedChunks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, chunk: ChunkPos, now: Timestamp) {
        self.forced.lock().insert(chunk, now);
    }

    pub fn contains(&self, chunk: ChunkPos) -> bool {
        self.forced.lock().contains_key(&chunk)
    }

    /// Remove and return chunks forced at least `delay_ms` ago, skipping any
    /// that an in-progress survey still targets
    pub fn take_due(&self, now: Timestamp, delay_ms: u64, in_use: &HashSet<ChunkPos>) -> Vec<ChunkPos> {
        let mut forced = self.forced.lock();
        let mut due: Vec<ChunkPos> = forced
            .iter()
            .filter(|(chunk, since)| elapsed_since(**since, now) >= delay_ms && !in_use.contains(chunk))
            .map(|(chunk, _)| *chunk)
            .collect();
        due.sort();
        for chunk in &due {
            forced.remove(chunk);
        }
        due
    }

    /// Remove and return every tracked chunk
    pub fn take_all(&self) -> Vec<ChunkPos> {
        let mut chunks: Vec<ChunkPos> = self.forced.lock().drain().map(|(chunk, _)| chunk).collect();
        chunks.sort();
        chunks
    }

    pub fn len(&self) -> usize {
        self.forced.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.forced.lock().is_empty()
    }
}

/// Services a filtering pass reads and writes
pub struct FilterContext<'a> {
    pub world: &'a dyn WorldAccess,
    pub ledger: &'a EvidenceLedger,
    pub scheduler: &'a RetroactiveScheduler,
    pub detector: &'a DamageDetector,
}

pub struct CandidateFilter {
    force_load_wait: Duration,
    min_damage_range: f32,
    /// (tornado, chunk) pairs that already had an on-demand evaluation
    evaluated: Mutex<HashSet<(StormId, ChunkPos)>>,
}

impl CandidateFilter {
    pub fn new(force_load_wait_ms: u64, min_damage_range: f32) -> Self {
        Self {
            force_load_wait: Duration::from_millis(force_load_wait_ms),
            min_damage_range,
            evaluated: Mutex::new(HashSet::new()),
        }
    }

    /// Chunks of `track` with ledger evidence, sorted
    pub fn filter(&self, track: &TornadoTrack, ctx: &FilterContext<'_>, forced: &ForcedChunks, now: Timestamp) -> Vec<ChunkPos> {
        let candidates: BTreeSet<ChunkPos> = track
            .damaged_chunks()
            .iter()
            .copied()
            .filter(|chunk| track.chunk_in_damage_range(*chunk, self.min_damage_range))
            .collect();

        let needs_evaluation: Vec<ChunkPos> = candidates
            .iter()
            .copied()
            .filter(|chunk| !ctx.ledger.has_damage(track.id, *chunk))
            .collect();

        let mut newly_forced = 0usize;
        for chunk in &needs_evaluation {
            if ctx.world.is_chunk_loaded(*chunk) {
                continue;
            }
            if ctx.world.force_load_chunk(*chunk) {
                forced.record(*chunk, now);
                newly_forced += 1;
            } else {
                log::debug!("Chunk {} could not be force-loaded", chunk);
            }
        }
        if newly_forced > 0 && !self.force_load_wait.is_zero() {
            log::debug!(
                "Waiting {:?} for {} force-loaded chunks of tornado {}",
                self.force_load_wait,
                newly_forced,
                track.id
            );
            std::thread::sleep(self.force_load_wait);
        }

        for chunk in needs_evaluation {
            if !ctx.world.is_chunk_loaded(chunk) {
                log::debug!("Chunk {} not ready after force-load; treating as no evidence", chunk);
                continue;
            }
            self.evaluate(track, chunk, ctx, now);
        }

        let kept: Vec<ChunkPos> = candidates
            .into_iter()
            .filter(|chunk| ctx.ledger.has_damage(track.id, *chunk))
            .collect();
        log::info!(
            "Tornado {}: {} of {} damaged chunks show evidence",
            track.id,
            kept.len(),
            track.damaged_chunks().len()
        );
        kept
    }

    fn evaluate(&self, track: &TornadoTrack, chunk: ChunkPos, ctx: &FilterContext<'_>, now: Timestamp) {
        match ctx.scheduler.take(track.id, chunk, now) {
            DrainOutcome::Ready(info) => {
                ctx.detector.analyze_retroactive(track.id, chunk, &info, now, ctx.world, ctx.ledger);
                self.evaluated.lock().insert((track.id, chunk));
            }
            DrainOutcome::Stale => {}
            DrainOutcome::Missing => {
                if !self.evaluated.lock().insert((track.id, chunk)) {
                    return;
                }
                // Never queued: reconstruct the pass from the closest recorded position
                let Some(sample) = track.closest_sample(chunk.center()) else {
                    return;
                };
                let info = RetroactiveDamageInfo {
                    tornado_position: sample.position,
                    windspeed: sample.windspeed,
                    windfield_width: sample.width,
                    timestamp: now,
                };
                ctx.detector.analyze_retroactive(track.id, chunk, &info, now, ctx.world, ctx.ledger);
            }
        }
    }

    /// Forget on-demand evaluations of a tornado (admin reset)
    pub fn forget_tornado(&self, tornado: StormId) {
        self.evaluated.lock().retain(|(id, _)| *id != tornado);
    }

    pub fn clear(&self) {
        self.evaluated.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SurveyConfig;
    use crate::weather::StormSnapshot;
    use crate::world::{BlockId, BlockRegistry, ChunkColumn, MemoryWorld};
    use glam::Vec3;

    #[test]
    fn test_take_due_skips_in_use() {
        let forced = ForcedChunks::new();
        forced.record(ChunkPos::new(0, 0), 0);
        forced.record(ChunkPos::new(1, 0), 0);
        forced.record(ChunkPos::new(2, 0), 50_000);

        let in_use: HashSet<ChunkPos> = [ChunkPos::new(1, 0)].into_iter().collect();
        assert_eq!(forced.take_due(60_000, 60_000, &in_use), vec![ChunkPos::new(0, 0)]);
        assert_eq!(forced.len(), 2);
        assert_eq!(forced.take_due(120_000, 60_000, &HashSet::new()).len(), 2);
    }

    #[test]
    fn test_unevaluated_stored_chunk_gets_forced_and_analyzed() {
        let config = SurveyConfig::deterministic(7);
        let world = MemoryWorld::new(BlockRegistry::with_defaults());
        for z in -1..=2 {
            for x in -1..=1 {
                world.insert_chunk(ChunkPos::new(x, z), ChunkColumn::flat(96, 64, BlockId::GRASS), z != 1);
            }
        }
        let ledger = EvidenceLedger::new();
        let scheduler = RetroactiveScheduler::new(config.retroactive_ttl_ms);
        let detector = DamageDetector::new(&config);

        let mut track = TornadoTrack::new(&StormSnapshot::tornado(42, 3, Vec3::new(8.0, 64.0, 16.0), 250, 60.0), 0);
        track.mark_damaged(ChunkPos::new(0, 1));
        track.deactivate(60_000, 0.1, 5_000);

        let ctx = FilterContext {
            world: &world,
            ledger: &ledger,
            scheduler: &scheduler,
            detector: &detector,
        };
        let forced = ForcedChunks::new();
        let filter = CandidateFilter::new(0, config.min_damage_range);
        let kept = filter.filter(&track, &ctx, &forced, 70_000);

        assert_eq!(kept, vec![ChunkPos::new(0, 1)]);
        assert!(forced.contains(ChunkPos::new(0, 1)));
    }

    #[test]
    fn test_unloadable_chunk_excluded() {
        let config = SurveyConfig::deterministic(7);
        let world = MemoryWorld::new(BlockRegistry::with_defaults());
        let ledger = EvidenceLedger::new();
        let scheduler = RetroactiveScheduler::new(config.retroactive_ttl_ms);
        let detector = DamageDetector::new(&config);

        let mut track = TornadoTrack::new(&StormSnapshot::tornado(1, 3, Vec3::new(8.0, 64.0, 8.0), 200, 60.0), 0);
        track.mark_damaged(ChunkPos::new(0, 0));

        let ctx = FilterContext {
            world: &world,
            ledger: &ledger,
            scheduler: &scheduler,
            detector: &detector,
        };
        let filter = CandidateFilter::new(0, config.min_damage_range);
        assert!(filter.filter(&track, &ctx, &ForcedChunks::new(), 0).is_empty());
    }
}
