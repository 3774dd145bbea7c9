//! Per-world storm session
//!
//! [`StormSession`] owns every service for one loaded world and exposes the
//! hooks a host calls: world load/unload, the periodic tick, chunk loads,
//! block changes and survey traffic. Each hook takes the current time so a
//! single clock reading drives a whole step.
//!
//! Threading: `tick` and the survey handlers run on the host's tick thread;
//! `on_chunk_loaded` and `on_block_changed` may arrive from the chunk
//! pipeline at any point between or during ticks. All shared tables are
//! concurrent maps or mutex-guarded, so these may interleave.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec2;
use parking_lot::Mutex;

use crate::config::SurveyConfig;
use crate::damage::{damage_range, DamageDetector, EvidenceLedger, RetroactiveDamageInfo, RetroactiveScheduler};
use crate::error::StormResult;
use crate::network::{ClientPacket, ServerPacket, SurveyUpdateKind};
use crate::persistence::SurveyDataStore;
use crate::survey::{CandidateFilter, FilterContext, ForcedChunks, Outgoing, ServerContext, SurveyRejection, SurveyServer};
use crate::time::Timestamp;
use crate::tracking::{TornadoTracker, TrackerUpdate};
use crate::weather::{BlockDestructibility, FeedMonitor, StormId, StormSnapshot, WeatherFeed, WindField};
use crate::world::{BlockId, ChunkPos, VoxelPos, WorldAccess};

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub update: TrackerUpdate,
    /// Resident chunks scanned in real time
    pub scanned_chunks: usize,
    /// Chunks that produced evidence this tick
    pub evidence_chunks: usize,
    /// Non-resident chunks queued for retroactive analysis
    pub queued_chunks: usize,
    pub purged_entries: usize,
    pub released_chunks: usize,
}

pub struct StormSession {
    config: SurveyConfig,
    feed: Arc<dyn WeatherFeed>,
    monitor: FeedMonitor,
    world: Arc<dyn WorldAccess>,
    tracker: TornadoTracker,
    ledger: EvidenceLedger,
    scheduler: RetroactiveScheduler,
    detector: DamageDetector,
    filter: CandidateFilter,
    forced: ForcedChunks,
    server: SurveyServer,
    store: Option<SurveyDataStore>,
    applied_overrides: Mutex<Option<HashMap<BlockId, f32>>>,
}

impl StormSession {
    pub fn new(config: SurveyConfig, feed: Arc<dyn WeatherFeed>, world: Arc<dyn WorldAccess>) -> Self {
        Self {
            tracker: TornadoTracker::new(&config),
            ledger: EvidenceLedger::new(),
            scheduler: RetroactiveScheduler::new(config.retroactive_ttl_ms),
            detector: DamageDetector::new(&config),
            filter: CandidateFilter::new(config.force_load_wait_ms, config.min_damage_range),
            forced: ForcedChunks::new(),
            server: SurveyServer::new(config.coverage_divisor),
            monitor: FeedMonitor::new(),
            store: None,
            applied_overrides: Mutex::new(None),
            config,
            feed,
            world,
        }
    }

    /// Persist tracks and evidence under `store`
    pub fn with_store(mut self, store: SurveyDataStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &SurveyConfig {
        &self.config
    }

    pub fn tracker(&self) -> &TornadoTracker {
        &self.tracker
    }

    pub fn ledger(&self) -> &EvidenceLedger {
        &self.ledger
    }

    pub fn scheduler(&self) -> &RetroactiveScheduler {
        &self.scheduler
    }

    pub fn server(&self) -> &SurveyServer {
        &self.server
    }

    pub fn world(&self) -> &dyn WorldAccess {
        self.world.as_ref()
    }

    pub fn forced_chunks(&self) -> &ForcedChunks {
        &self.forced
    }

    /// False once the weather feed has reported itself unavailable
    pub fn is_tracking_available(&self) -> bool {
        !self.monitor.is_disabled()
    }

    /// Restore persisted state for a freshly loaded world
    pub fn on_world_load(&self) -> StormResult<()> {
        self.monitor.reset();
        if let Some(store) = &self.store {
            store.load_all(&self.tracker, &self.ledger)?;
        }
        Ok(())
    }

    /// Save, release every forced chunk and drop all in-memory state
    pub fn on_world_unload(&self, now: Timestamp) -> StormResult<()> {
        let saved = self.save(now);
        for chunk in self.forced.take_all() {
            self.world.unforce_load_chunk(chunk);
        }
        self.server.clear();
        self.scheduler.clear();
        self.filter.clear();
        self.tracker.clear();
        self.ledger.clear();
        *self.applied_overrides.lock() = None;
        saved
    }

    pub fn save(&self, now: Timestamp) -> StormResult<()> {
        if let Some(store) = &self.store {
            store.save_all(&self.tracker, &self.ledger, now)?;
        }
        Ok(())
    }

    fn save_logged(&self, now: Timestamp) {
        if let Err(e) = self.save(now) {
            log::error!("Failed to save tornado survey data: {}", e);
        }
    }

    /// One poll of the feed: track lifecycle, real-time scanning of resident
    /// chunks, retroactive queueing of the rest, and housekeeping
    pub fn tick(&self, now: Timestamp) -> TickReport {
        let mut report = TickReport::default();
        let storms = self.monitor.poll(self.feed.as_ref());
        if self.monitor.is_disabled() {
            return report;
        }
        self.apply_strength_overrides();

        report.update = self.tracker.ingest(&storms, now);

        let current: HashMap<StormId, &StormSnapshot> = storms.iter().map(|s| (s.id, s)).collect();
        for id in self.tracker.active_ids() {
            let Some(snapshot) = current.get(&id) else {
                continue;
            };
            // Roping out: nothing left to damage
            if snapshot.windspeed <= 0 {
                continue;
            }
            let field = WindField::new(snapshot.position, snapshot.windspeed as f32, snapshot.width);
            self.survey_surroundings(id, field, now, &mut report);
        }

        report.purged_entries = self.scheduler.purge_stale(now);

        let in_use = self.server.chunks_in_use();
        for chunk in self.forced.take_due(now, self.config.forced_chunk_release_delay_ms, &in_use) {
            self.world.unforce_load_chunk(chunk);
            report.released_chunks += 1;
        }
        if report.released_chunks > 0 {
            log::debug!("Released {} force-loaded chunks", report.released_chunks);
        }

        if !report.update.deactivated.is_empty() {
            self.save_logged(now);
        }
        report
    }

    fn survey_surroundings(&self, tornado: StormId, field: WindField, now: Timestamp, report: &mut TickReport) {
        let range = damage_range(field.width, self.config.min_damage_range);
        for chunk in ChunkPos::within_radius(field.center, range) {
            if self.world.is_chunk_loaded(chunk) {
                let scan = self
                    .detector
                    .scan_loaded_chunk(tornado, chunk, field, now, self.world.as_ref(), &self.ledger);
                report.scanned_chunks += 1;
                if scan.has_evidence() {
                    report.evidence_chunks += 1;
                    self.tracker.mark_damaged(tornado, chunk);
                }
            } else {
                let info = RetroactiveDamageInfo {
                    tornado_position: field.center,
                    windspeed: field.windspeed,
                    windfield_width: field.width,
                    timestamp: now,
                };
                self.scheduler.queue(tornado, chunk, info);
                // Candidate until its evidence is settled at survey time
                self.tracker.mark_damaged(tornado, chunk);
                report.queued_chunks += 1;
            }
        }
    }

    fn apply_strength_overrides(&self) {
        let overrides = self.feed.block_strength_overrides();
        let mut applied = self.applied_overrides.lock();
        if *applied == overrides {
            return;
        }
        let destructibility = match &overrides {
            Some(map) => {
                log::info!("Applying {} block strength overrides from the weather feed", map.len());
                BlockDestructibility::with_overrides(map.clone())
            }
            None => BlockDestructibility::new(),
        };
        self.detector.set_strength_overrides(destructibility);
        *applied = overrides;
    }

    /// Run pending retroactive analysis for a chunk the host just loaded.
    /// Returns the tornadoes that gained evidence there.
    pub fn on_chunk_loaded(&self, chunk: ChunkPos, now: Timestamp) -> Vec<StormId> {
        let mut affected = Vec::new();
        for (tornado, info) in self.scheduler.drain_chunk(chunk, now) {
            let scan = self
                .detector
                .analyze_retroactive(tornado, chunk, &info, now, self.world.as_ref(), &self.ledger);
            if scan.has_evidence() {
                self.tracker.mark_damaged(tornado, chunk);
                affected.push(tornado);
            }
        }
        affected
    }

    /// Host notification of a block change. Attributed to the nearest active
    /// tornado whose damage range covers the block.
    pub fn on_block_changed(&self, pos: VoxelPos, old: BlockId, new: BlockId, now: Timestamp) -> bool {
        if self.monitor.is_disabled() {
            return false;
        }
        let point = Vec2::new(pos.x as f32 + 0.5, pos.z as f32 + 0.5);
        let Some(tornado) = self.tracker.nearest_active(point) else {
            return false;
        };
        let Some(track) = self.tracker.get(tornado) else {
            return false;
        };
        let Some(sample) = track.latest_sample().copied() else {
            return false;
        };
        if sample.windspeed <= 0.0 {
            return false;
        }
        let range = damage_range(sample.width, self.config.min_damage_range);
        let center = Vec2::new(sample.position.x, sample.position.z);
        if center.distance(point) > range {
            return false;
        }

        let recorded = self.detector.on_block_changed(
            tornado,
            sample.wind_field(),
            pos,
            old,
            new,
            now,
            self.world.as_ref(),
            &self.ledger,
        );
        if recorded {
            self.tracker.mark_damaged(tornado, pos.chunk());
        }
        recorded
    }

    /// Chunks a player may survey for a tornado, after force-loading and
    /// evaluating any that have not been analysed yet
    pub fn survey_candidates(&self, tornado: StormId, now: Timestamp) -> Result<Vec<ChunkPos>, SurveyRejection> {
        if self.monitor.is_disabled() {
            return Err(SurveyRejection::TrackingUnavailable);
        }
        let track = self
            .tracker
            .get(tornado)
            .ok_or(SurveyRejection::UnknownTornado(tornado))?;
        if track.is_active() {
            return Err(SurveyRejection::TornadoActive(tornado));
        }
        if let Some(session) = self.server.session(tornado) {
            return Err(SurveyRejection::SurveyInProgress {
                tornado,
                surveyor: session.surveyor,
            });
        }

        let ctx = FilterContext {
            world: self.world.as_ref(),
            ledger: &self.ledger,
            scheduler: &self.scheduler,
            detector: &self.detector,
        };
        let candidates = self.filter.filter(&track, &ctx, &self.forced, now);
        if candidates.is_empty() {
            return Err(SurveyRejection::NoDamageEvidence(tornado));
        }
        Ok(candidates)
    }

    /// Dispatch one client packet through the authoritative session table
    pub fn handle_client_packet(&self, player: &str, packet: ClientPacket, now: Timestamp) -> Vec<Outgoing> {
        if self.monitor.is_disabled() {
            let rejection = SurveyRejection::TrackingUnavailable;
            return vec![Outgoing::rejection(packet.tornado_id(), player, &rejection)];
        }
        let ctx = ServerContext {
            tracker: &self.tracker,
            ledger: &self.ledger,
        };
        let outgoing = self.server.handle_packet(player, packet, &ctx, now);
        let completed = outgoing.iter().any(|o| {
            matches!(
                o.packet,
                ServerPacket::SurveyUpdate {
                    update: SurveyUpdateKind::Completed { .. },
                    ..
                }
            )
        });
        if completed {
            self.save_logged(now);
        }
        outgoing
    }

    pub fn handle_disconnect(&self, player: &str) -> Vec<Outgoing> {
        self.server.handle_disconnect(player)
    }

    /// Hard-delete a tornado and all of its evidence
    pub fn reset_tornado(&self, tornado: StormId, now: Timestamp) -> bool {
        let existed = self.tracker.remove(tornado).is_some();
        let chunks = self.ledger.remove_tornado(tornado);
        self.scheduler.remove_tornado(tornado);
        self.filter.forget_tornado(tornado);
        self.server.discard_tornado(tornado);
        if existed || chunks > 0 {
            log::warn!("Reset tornado {} ({} evidence chunks removed)", tornado, chunks);
            self.save_logged(now);
        }
        existed
    }

    pub fn reset_all(&self, now: Timestamp) {
        let tracks = self.tracker.len();
        self.tracker.clear();
        self.ledger.clear();
        self.scheduler.clear();
        self.filter.clear();
        self.server.clear();
        log::warn!("Reset all tornado data ({} tracks removed)", tracks);
        self.save_logged(now);
    }
}
