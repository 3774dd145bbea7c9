//! Damage evidence detection
//!
//! Real-time scans sample resident chunks against a tornado's current wind
//! field. Retroactive analysis replays the parked wind parameters of a pass
//! over a chunk that was not resident at the time; it is best-effort
//! inference, using fewer random samples and probability gates, not a replay
//! of what the weather simulation would have done.

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use super::evidence::{DamageRecord, ScouringLevel};
use super::ledger::EvidenceLedger;
use super::retroactive::RetroactiveDamageInfo;
use crate::config::SurveyConfig;
use crate::constants::evidence::{
    CANOPY_SCAN_DEPTH, DEBARKING_MIN_WINDSPEED, FOREST_MIN_RATIO, FOREST_SAMPLE_RADIUS,
    GRASSLAND_MIN_RATIO, GRASSLAND_SAMPLE_RADIUS,
};
use crate::constants::retroactive::{MIN_INFERENCE_PROBABILITY, WINDSPEED_SAMPLE_DIVISOR};
use crate::constants::tracking::DAMAGE_RANGE_WIDTH_FACTOR;
use crate::constants::world::CHUNK_SIZE;
use crate::time::Timestamp;
use crate::weather::{BlockDestructibility, StormId, WindField};
use crate::world::{BlockCategory, BlockId, ChunkPos, VoxelPos, WorldAccess};

/// Radius around a tornado position inside which chunks are considered
pub fn damage_range(width: f32, min_range: f32) -> f32 {
    (width * DAMAGE_RANGE_WIDTH_FACTOR).max(min_range)
}

/// What a scan of one chunk produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkScanReport {
    pub chunk: ChunkPos,
    pub sampled_columns: u32,
    pub damaged_blocks: u32,
    pub debarked_logs: u32,
    pub scoured_blocks: u32,
}

impl ChunkScanReport {
    fn new(chunk: ChunkPos) -> Self {
        Self {
            chunk,
            ..Self::default()
        }
    }

    pub fn has_evidence(&self) -> bool {
        self.damaged_blocks + self.debarked_logs + self.scoured_blocks > 0
    }
}

/// How confidently a column's evidence is asserted
#[derive(Debug, Clone, Copy, PartialEq)]
enum Inference {
    /// The tornado is over resident terrain right now
    Observed,
    /// Reconstructed after the fact; each finding is gated by chance
    Probabilistic,
}

/// Everything a scan needs about the vortex that caused the damage
#[derive(Debug, Clone, Copy)]
struct ScanContext {
    tornado: StormId,
    field: WindField,
    tornado_windspeed: f32,
    now: Timestamp,
    inference: Inference,
}

pub struct DamageDetector {
    destructibility: RwLock<BlockDestructibility>,
    rng: Mutex<StdRng>,
    sample_stride: i32,
    retroactive_base_samples: u32,
    retroactive_max_samples: u32,
    min_damage_range: f32,
}

impl DamageDetector {
    pub fn new(config: &SurveyConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            destructibility: RwLock::new(BlockDestructibility::new()),
            rng: Mutex::new(rng),
            sample_stride: config.realtime_sample_stride.max(1),
            retroactive_base_samples: config.retroactive_base_samples,
            retroactive_max_samples: config.retroactive_max_samples.max(1),
            min_damage_range: config.min_damage_range,
        }
    }

    /// Replace the block strength overrides supplied by the weather feed
    pub fn set_strength_overrides(&self, destructibility: BlockDestructibility) {
        *self.destructibility.write() = destructibility;
    }

    pub fn min_damage_range(&self) -> f32 {
        self.min_damage_range
    }

    /// Whether a chunk centre is close enough to a tornado position to matter
    pub fn chunk_in_range(&self, chunk: ChunkPos, position: glam::Vec3, width: f32) -> bool {
        chunk.center_distance_to(position) <= damage_range(width, self.min_damage_range)
    }

    /// Sample a resident chunk against the tornado's current parameters
    pub fn scan_loaded_chunk(
        &self,
        tornado: StormId,
        chunk: ChunkPos,
        field: WindField,
        now: Timestamp,
        world: &dyn WorldAccess,
        ledger: &EvidenceLedger,
    ) -> ChunkScanReport {
        let ctx = ScanContext {
            tornado,
            field,
            tornado_windspeed: field.windspeed,
            now,
            inference: Inference::Observed,
        };
        let mut report = ChunkScanReport::new(chunk);
        let (min_x, min_z) = chunk.min_block();
        let offset = self.sample_stride / 2;

        let mut lx = offset;
        while lx < CHUNK_SIZE {
            let mut lz = offset;
            while lz < CHUNK_SIZE {
                self.inspect_column(&ctx, min_x + lx, min_z + lz, world, ledger, &mut report);
                lz += self.sample_stride;
            }
            lx += self.sample_stride;
        }

        if report.has_evidence() {
            log::trace!(
                "Real-time scan of {} for tornado {}: {} damaged, {} debarked, {} scoured",
                chunk,
                tornado,
                report.damaged_blocks,
                report.debarked_logs,
                report.scoured_blocks
            );
        }
        report
    }

    /// Infer evidence for a chunk that was not resident when the tornado passed
    pub fn analyze_retroactive(
        &self,
        tornado: StormId,
        chunk: ChunkPos,
        info: &RetroactiveDamageInfo,
        now: Timestamp,
        world: &dyn WorldAccess,
        ledger: &EvidenceLedger,
    ) -> ChunkScanReport {
        let mut report = ChunkScanReport::new(chunk);
        if !world.is_chunk_loaded(chunk) {
            log::debug!("Retroactive analysis skipped: chunk {} not resident", chunk);
            return report;
        }

        let ctx = ScanContext {
            tornado,
            field: info.wind_field(),
            tornado_windspeed: info.windspeed,
            now,
            inference: Inference::Probabilistic,
        };
        let column_count = (CHUNK_SIZE * CHUNK_SIZE) as usize;
        let samples = (self.retroactive_sample_count(info.windspeed) as usize).min(column_count);
        let (min_x, min_z) = chunk.min_block();
        // Distinct columns only
        let columns: Vec<(i32, i32)> = {
            let mut rng = self.rng.lock();
            index::sample(&mut *rng, column_count, samples)
                .into_iter()
                .map(|i| (i as i32 % CHUNK_SIZE, i as i32 / CHUNK_SIZE))
                .collect()
        };

        for (lx, lz) in columns {
            self.inspect_column(&ctx, min_x + lx, min_z + lz, world, ledger, &mut report);
        }

        log::debug!(
            "Retroactive analysis of {} for tornado {} ({} samples at {:.0} mph): {} damaged, {} debarked, {} scoured",
            chunk,
            tornado,
            samples,
            info.windspeed,
            report.damaged_blocks,
            report.debarked_logs,
            report.scoured_blocks
        );
        report
    }

    /// Fewer samples than a real-time scan, more for stronger tornadoes
    pub fn retroactive_sample_count(&self, windspeed: f32) -> u32 {
        let extra = (windspeed.max(0.0) / WINDSPEED_SAMPLE_DIVISOR) as u32;
        (self.retroactive_base_samples + extra).min(self.retroactive_max_samples)
    }

    /// Record a block change the host observed while a tornado was nearby.
    /// Returns true when the change counted as evidence.
    #[allow(clippy::too_many_arguments)]
    pub fn on_block_changed(
        &self,
        tornado: StormId,
        field: WindField,
        pos: VoxelPos,
        old: BlockId,
        new: BlockId,
        now: Timestamp,
        world: &dyn WorldAccess,
        ledger: &EvidenceLedger,
    ) -> bool {
        if old == new || old.is_air() {
            return false;
        }
        let registry = world.registry();
        let wind = field.speed_at_block(pos);
        let old_category = registry.category(old);
        let new_category = registry.category(new);

        match (old_category, new_category) {
            (BlockCategory::Log, BlockCategory::StrippedLog) if wind >= DEBARKING_MIN_WINDSPEED => {
                ledger.add_debarking_evidence(tornado, pos);
                true
            }
            (BlockCategory::Grass, _)
                if new == BlockId::DIRT && wind >= ScouringLevel::GrassToDirt.min_windspeed() =>
            {
                ledger.add_scouring_evidence(tornado, pos, ScouringLevel::GrassToDirt);
                true
            }
            (_, BlockCategory::Air) => {
                let threshold = self.destructibility.read().threshold(old, registry);
                if wind < threshold {
                    return false;
                }
                ledger.add_damage(
                    tornado,
                    pos,
                    DamageRecord {
                        original_block: old,
                        resulting_block: new,
                        strength_threshold: threshold,
                        timestamp: now,
                        tornado_windspeed: field.windspeed,
                    },
                );
                true
            }
            _ => false,
        }
    }

    fn inspect_column(
        &self,
        ctx: &ScanContext,
        x: i32,
        z: i32,
        world: &dyn WorldAccess,
        ledger: &EvidenceLedger,
        report: &mut ChunkScanReport,
    ) {
        let Some(surface_y) = world.surface_height(x, z) else {
            return;
        };
        report.sampled_columns += 1;

        let surface = VoxelPos::new(x, surface_y, z);
        // The vortex model is horizontal, so one reading covers the column
        let wind = ctx.field.speed_at_block(surface);
        if wind <= 0.0 {
            return;
        }

        let registry = world.registry();
        let top = world.get_block(surface);
        match registry.category(top) {
            BlockCategory::Grass => {
                self.try_scour(ctx, surface, wind, ScouringLevel::GrassToDirt, BlockId::DIRT, world, ledger, report);
            }
            BlockCategory::Ground if top == BlockId::DIRT => {
                if registry.contains(BlockId::MEDIUM_SCOURED) {
                    self.try_scour(
                        ctx,
                        surface,
                        wind,
                        ScouringLevel::DirtToMedium,
                        BlockId::MEDIUM_SCOURED,
                        world,
                        ledger,
                        report,
                    );
                }
            }
            BlockCategory::ScouredGround if top == BlockId::MEDIUM_SCOURED => {
                if registry.contains(BlockId::HEAVY_SCOURED) {
                    self.try_scour(
                        ctx,
                        surface,
                        wind,
                        ScouringLevel::MediumToHeavy,
                        BlockId::HEAVY_SCOURED,
                        world,
                        ledger,
                        report,
                    );
                }
            }
            _ => {}
        }

        if registry.get(top).map(|p| p.is_damage_candidate()).unwrap_or(false) {
            let threshold = self.destructibility.read().threshold(top, registry);
            if wind >= threshold && self.passes_gate(ctx, wind, threshold) {
                ledger.add_damage(
                    ctx.tornado,
                    surface,
                    DamageRecord {
                        original_block: top,
                        resulting_block: BlockId::AIR,
                        strength_threshold: threshold,
                        timestamp: ctx.now,
                        tornado_windspeed: ctx.tornado_windspeed,
                    },
                );
                report.damaged_blocks += 1;
            }
        }

        if wind >= DEBARKING_MIN_WINDSPEED {
            self.scan_trunks(ctx, surface, wind, world, ledger, report);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn try_scour(
        &self,
        ctx: &ScanContext,
        pos: VoxelPos,
        wind: f32,
        level: ScouringLevel,
        replacement: BlockId,
        world: &dyn WorldAccess,
        ledger: &EvidenceLedger,
        report: &mut ChunkScanReport,
    ) {
        if wind < level.min_windspeed() {
            return;
        }
        if level == ScouringLevel::GrassToDirt && !is_natural_grassland(world, pos) {
            return;
        }
        if !self.passes_gate(ctx, wind, level.min_windspeed()) {
            return;
        }
        // Client-side worlds refuse writes; the evidence still stands
        world.set_block(pos, replacement);
        ledger.add_scouring_evidence(ctx.tornado, pos, level);
        report.scoured_blocks += 1;
    }

    fn scan_trunks(
        &self,
        ctx: &ScanContext,
        surface: VoxelPos,
        wind: f32,
        world: &dyn WorldAccess,
        ledger: &EvidenceLedger,
        report: &mut ChunkScanReport,
    ) {
        let registry = world.registry();
        for depth in 0..=CANOPY_SCAN_DEPTH {
            let pos = surface.offset(0, -depth, 0);
            if registry.category(world.get_block(pos)) != BlockCategory::Log {
                continue;
            }
            if !is_natural_forest(world, pos) {
                continue;
            }
            if !self.passes_gate(ctx, wind, DEBARKING_MIN_WINDSPEED) {
                continue;
            }
            world.set_block(pos, BlockId::STRIPPED_LOG);
            ledger.add_debarking_evidence(ctx.tornado, pos);
            report.debarked_logs += 1;
        }
    }

    /// Real-time findings always pass; retroactive ones are drawn with a
    /// probability that grows with how far the wind cleared the threshold
    fn passes_gate(&self, ctx: &ScanContext, wind: f32, threshold: f32) -> bool {
        match ctx.inference {
            Inference::Observed => true,
            Inference::Probabilistic => {
                let margin = if threshold > 0.0 {
                    ((wind - threshold) / threshold) as f64
                } else {
                    1.0
                };
                let p = (MIN_INFERENCE_PROBABILITY + margin).clamp(MIN_INFERENCE_PROBABILITY, 1.0);
                self.rng.lock().gen_bool(p)
            }
        }
    }
}

/// At least a fifth of the surrounding 7x7x7 volume is logs, leaves or grass
fn is_natural_forest(world: &dyn WorldAccess, center: VoxelPos) -> bool {
    let registry = world.registry();
    let r = FOREST_SAMPLE_RADIUS;
    let mut cover = 0u32;
    let mut total = 0u32;
    for dx in -r..=r {
        for dy in -r..=r {
            for dz in -r..=r {
                total += 1;
                let block = world.get_block(center.offset(dx, dy, dz));
                if registry.get(block).map(|p| p.is_forest_cover()).unwrap_or(false) {
                    cover += 1;
                }
            }
        }
    }
    cover as f32 / total as f32 >= FOREST_MIN_RATIO
}

/// At least 40% of the surrounding 7x1x7 layer is grass
fn is_natural_grassland(world: &dyn WorldAccess, center: VoxelPos) -> bool {
    let registry = world.registry();
    let r = GRASSLAND_SAMPLE_RADIUS;
    let mut grass = 0u32;
    let mut total = 0u32;
    for dx in -r..=r {
        for dz in -r..=r {
            total += 1;
            let pos = center.offset(dx, 0, dz);
            let block = world.get_block(pos);
            // Already-scoured neighbours still count as grassland
            if registry.category(block) == BlockCategory::Grass
                || (block == BlockId::DIRT && world.get_block(pos.offset(0, 1, 0)).is_air())
            {
                grass += 1;
            }
        }
    }
    grass as f32 / total as f32 >= GRASSLAND_MIN_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{BlockRegistry, ChunkColumn, MemoryWorld};
    use glam::Vec3;

    fn detector() -> DamageDetector {
        DamageDetector::new(&SurveyConfig::deterministic(42))
    }

    fn grass_world(loaded: bool) -> MemoryWorld {
        let world = MemoryWorld::new(BlockRegistry::with_defaults());
        for x in -1..=1 {
            for z in -1..=2 {
                world.insert_chunk(ChunkPos::new(x, z), ChunkColumn::flat(96, 64, BlockId::GRASS), loaded);
            }
        }
        world
    }

    fn plant_tree(world: &MemoryWorld, x: i32, z: i32) {
        for y in 65..70 {
            world.set_block(VoxelPos::new(x, y, z), BlockId::LOG);
        }
        for dx in -2..=2 {
            for dz in -2..=2 {
                for y in 68..72 {
                    let pos = VoxelPos::new(x + dx, y, z + dz);
                    if world.get_block(pos).is_air() {
                        world.set_block(pos, BlockId::LEAVES);
                    }
                }
            }
        }
    }

    #[test]
    fn test_damage_range_floor() {
        assert_eq!(damage_range(60.0, 80.0), 120.0);
        assert_eq!(damage_range(20.0, 80.0), 80.0);
    }

    #[test]
    fn test_realtime_scouring_on_grass() {
        let world = grass_world(true);
        let ledger = EvidenceLedger::new();
        let field = WindField::new(Vec3::new(8.0, 64.0, 8.0), 150.0, 60.0);

        let report = detector().scan_loaded_chunk(42, ChunkPos::new(0, 0), field, 1_000, &world, &ledger);
        assert!(report.scoured_blocks > 0);
        let data = ledger.get(42, ChunkPos::new(0, 0)).unwrap();
        assert!(data.scouring.values().all(|l| *l == ScouringLevel::GrassToDirt));
        assert_eq!(world.get_block(*data.scouring.keys().next().unwrap()), BlockId::DIRT);
    }

    #[test]
    fn test_weak_tornado_leaves_grass() {
        let world = grass_world(true);
        let ledger = EvidenceLedger::new();
        let field = WindField::new(Vec3::new(8.0, 64.0, 8.0), 90.0, 60.0);

        let report = detector().scan_loaded_chunk(1, ChunkPos::new(0, 0), field, 0, &world, &ledger);
        assert!(!report.has_evidence());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_scouring_tiers_need_markers() {
        let mut registry = BlockRegistry::with_defaults();
        registry.register_scouring_markers();
        let world = MemoryWorld::new(registry);
        world.insert_chunk(ChunkPos::new(0, 0), ChunkColumn::flat(96, 64, BlockId::DIRT), true);
        let ledger = EvidenceLedger::new();
        let field = WindField::new(Vec3::new(8.0, 64.0, 8.0), 220.0, 60.0);

        detector().scan_loaded_chunk(3, ChunkPos::new(0, 0), field, 0, &world, &ledger);
        let data = ledger.get(3, ChunkPos::new(0, 0)).unwrap();
        assert!(data.scouring.values().any(|l| *l == ScouringLevel::DirtToMedium));
        assert!(data.minimum_ef_rating_from_evidence() >= crate::damage::EfRating::EF4);
    }

    #[test]
    fn test_debarking_in_forest() {
        let world = grass_world(true);
        // A ring of trees where the wind is strongest
        for (x, z) in [(0, 7), (14, 7), (7, 0), (7, 14), (2, 2), (12, 12), (2, 12), (12, 2)] {
            plant_tree(&world, x, z);
        }
        let ledger = EvidenceLedger::new();
        let field = WindField::new(Vec3::new(7.0, 64.0, 7.0), 190.0, 60.0);

        let config = SurveyConfig {
            realtime_sample_stride: 1,
            ..SurveyConfig::deterministic(1)
        };
        let report = DamageDetector::new(&config).scan_loaded_chunk(5, ChunkPos::new(0, 0), field, 0, &world, &ledger);
        assert!(report.debarked_logs > 0);
        let data = ledger.get(5, ChunkPos::new(0, 0)).unwrap();
        let stripped = *data.debarked_logs.iter().next().unwrap();
        assert_eq!(world.get_block(stripped), BlockId::STRIPPED_LOG);
    }

    #[test]
    fn test_lone_log_is_not_forest() {
        let world = MemoryWorld::new(BlockRegistry::with_defaults());
        world.insert_chunk(ChunkPos::new(0, 0), ChunkColumn::flat(96, 64, BlockId::STONE), true);
        world.set_block(VoxelPos::new(4, 65, 4), BlockId::LOG);
        assert!(!is_natural_forest(&world, VoxelPos::new(4, 65, 4)));
    }

    #[test]
    fn test_retroactive_requires_resident_chunk() {
        let world = grass_world(false);
        let ledger = EvidenceLedger::new();
        let info = RetroactiveDamageInfo {
            tornado_position: Vec3::new(8.0, 64.0, 24.0),
            windspeed: 150.0,
            windfield_width: 60.0,
            timestamp: 0,
        };
        let report = detector().analyze_retroactive(42, ChunkPos::new(0, 1), &info, 0, &world, &ledger);
        assert_eq!(report.sampled_columns, 0);
    }

    #[test]
    fn test_retroactive_infers_scouring() {
        let world = grass_world(true);
        let ledger = EvidenceLedger::new();
        let info = RetroactiveDamageInfo {
            tornado_position: Vec3::new(8.0, 64.0, 16.0),
            windspeed: 250.0,
            windfield_width: 60.0,
            timestamp: 0,
        };
        let d = detector();
        let report = d.analyze_retroactive(42, ChunkPos::new(0, 1), &info, 0, &world, &ledger);
        assert_eq!(report.sampled_columns, d.retroactive_sample_count(250.0));
        assert!(report.scoured_blocks > 0);
        assert!(ledger.has_damage(42, ChunkPos::new(0, 1)));
    }

    #[test]
    fn test_retroactive_columns_are_distinct() {
        let mut registry = BlockRegistry::with_defaults();
        registry.register_scouring_markers();
        let world = MemoryWorld::new(registry);
        for x in -1..=1 {
            for z in -1..=2 {
                world.insert_chunk(ChunkPos::new(x, z), ChunkColumn::flat(96, 64, BlockId::GRASS), true);
            }
        }
        let ledger = EvidenceLedger::new();
        let info = RetroactiveDamageInfo {
            tornado_position: Vec3::new(8.0, 64.0, 24.0),
            windspeed: 250.0,
            windfield_width: 60.0,
            timestamp: 0,
        };
        let config = SurveyConfig {
            retroactive_base_samples: 400,
            retroactive_max_samples: 400,
            ..SurveyConfig::deterministic(7)
        };
        let report = DamageDetector::new(&config).analyze_retroactive(42, ChunkPos::new(0, 1), &info, 0, &world, &ledger);

        // Every column at most once, so nothing scoured here goes past dirt
        assert_eq!(report.sampled_columns, (CHUNK_SIZE * CHUNK_SIZE) as u32);
        let data = ledger.get(42, ChunkPos::new(0, 1)).unwrap();
        assert!(!data.scouring.is_empty());
        assert!(data.scouring.values().all(|l| *l == ScouringLevel::GrassToDirt));
    }

    #[test]
    fn test_block_change_records_destruction() {
        let world = grass_world(true);
        let ledger = EvidenceLedger::new();
        let field = WindField::new(Vec3::new(8.0, 64.0, 8.0), 150.0, 60.0);
        let pos = VoxelPos::new(15, 65, 8);

        assert!(detector().on_block_changed(9, field, pos, BlockId::GLASS, BlockId::AIR, 10, &world, &ledger));
        let data = ledger.get(9, ChunkPos::new(0, 0)).unwrap();
        assert_eq!(data.damage_records[&pos].original_block, BlockId::GLASS);

        // Obsidian is far stronger than the wind here
        assert!(!detector().on_block_changed(9, field, pos.offset(0, 1, 0), BlockId::OBSIDIAN, BlockId::AIR, 10, &world, &ledger));
    }

    #[test]
    fn test_sample_count_scales_and_caps() {
        let d = detector();
        assert_eq!(d.retroactive_sample_count(0.0), 8);
        assert_eq!(d.retroactive_sample_count(150.0), 23);
        assert_eq!(d.retroactive_sample_count(1000.0), 48);
    }
}
