use std::collections::HashSet;

use dashmap::DashMap;
use glam::Vec2;

use super::track::{TornadoTrack, TrackSummary};
use crate::config::SurveyConfig;
use crate::damage::EfRating;
use crate::error::{StormError, StormResult};
use crate::time::{elapsed_since, Timestamp};
use crate::weather::{StormId, StormSnapshot, StormType};
use crate::world::ChunkPos;

/// Lifecycle changes produced by one feed poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerUpdate {
    pub activated: Vec<StormId>,
    pub deactivated: Vec<StormId>,
}

impl TrackerUpdate {
    pub fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.deactivated.is_empty()
    }
}

/// Track table fed by the weather feed.
///
/// Read by chunk-load callbacks and survey handlers while the tick writes,
/// so every access goes through the concurrent map one key at a time.
pub struct TornadoTracker {
    tracks: DashMap<StormId, TornadoTrack>,
    sample_interval_ms: u64,
    inactive_grace_ms: u64,
    final_sample_min_gap_ms: u64,
    dissipated_width_factor: f32,
    confirmed_stage: i32,
}

impl TornadoTracker {
    pub fn new(config: &SurveyConfig) -> Self {
        Self {
            tracks: DashMap::new(),
            sample_interval_ms: config.sample_interval_ms,
            inactive_grace_ms: config.inactive_grace_ms,
            final_sample_min_gap_ms: config.final_sample_min_gap_ms,
            dissipated_width_factor: config.dissipated_width_factor,
            confirmed_stage: config.confirmed_tornado_stage,
        }
    }

    /// Apply one poll of the feed
    pub fn ingest(&self, snapshots: &[StormSnapshot], now: Timestamp) -> TrackerUpdate {
        let mut update = TrackerUpdate::default();
        let mut seen = HashSet::with_capacity(snapshots.len());

        for snapshot in snapshots {
            seen.insert(snapshot.id);
            if let Some(mut track) = self.tracks.get_mut(&snapshot.id) {
                if !track.is_active() {
                    continue;
                }
                if snapshot.dead {
                    track.deactivate(now, self.dissipated_width_factor, self.final_sample_min_gap_ms);
                    log::info!("Tornado {} reported dead, track closed", snapshot.id);
                    update.deactivated.push(snapshot.id);
                } else {
                    track.observe(snapshot, now, self.sample_interval_ms);
                }
                continue;
            }

            if self.is_confirmed_tornado(snapshot) {
                self.tracks.insert(snapshot.id, TornadoTrack::new(snapshot, now));
                log::info!(
                    "Tracking tornado {} at ({:.0}, {:.0}), {} mph, width {:.0}",
                    snapshot.id,
                    snapshot.position.x,
                    snapshot.position.z,
                    snapshot.windspeed,
                    snapshot.width
                );
                update.activated.push(snapshot.id);
            }
        }

        let missing: Vec<StormId> = self
            .tracks
            .iter()
            .filter(|entry| entry.is_active() && !seen.contains(entry.key()))
            .filter(|entry| elapsed_since(entry.last_seen(), now) > self.inactive_grace_ms)
            .map(|entry| *entry.key())
            .collect();
        for id in missing {
            if let Some(mut track) = self.tracks.get_mut(&id) {
                track.deactivate(now, self.dissipated_width_factor, self.final_sample_min_gap_ms);
                log::info!("Tornado {} missing from feed past grace period, track closed", id);
                update.deactivated.push(id);
            }
        }

        update.deactivated.sort_unstable();
        update
    }

    fn is_confirmed_tornado(&self, snapshot: &StormSnapshot) -> bool {
        snapshot.storm_type == StormType::Tornado && snapshot.stage >= self.confirmed_stage && !snapshot.dead
    }

    pub fn get(&self, id: StormId) -> Option<TornadoTrack> {
        self.tracks.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: StormId) -> bool {
        self.tracks.contains_key(&id)
    }

    pub fn is_active(&self, id: StormId) -> bool {
        self.tracks.get(&id).map(|t| t.is_active()).unwrap_or(false)
    }

    /// Ids of active tracks, sorted
    pub fn active_ids(&self) -> Vec<StormId> {
        self.ids_where(|t| t.is_active())
    }

    /// Ids of ended tracks, sorted
    pub fn inactive_ids(&self) -> Vec<StormId> {
        self.ids_where(|t| !t.is_active())
    }

    fn ids_where(&self, predicate: impl Fn(&TornadoTrack) -> bool) -> Vec<StormId> {
        let mut ids: Vec<StormId> = self
            .tracks
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| *entry.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Snapshot of every track, sorted by id
    pub fn all(&self) -> Vec<TornadoTrack> {
        let mut tracks: Vec<TornadoTrack> = self.tracks.iter().map(|e| e.value().clone()).collect();
        tracks.sort_by_key(|t| t.id);
        tracks
    }

    pub fn summaries(&self) -> Vec<TrackSummary> {
        self.all().iter().map(TornadoTrack::summary).collect()
    }

    /// Active track whose latest position is closest to a point
    pub fn nearest_active(&self, point: Vec2) -> Option<StormId> {
        self.tracks
            .iter()
            .filter(|entry| entry.is_active())
            .filter_map(|entry| {
                entry.latest_sample().map(|s| {
                    let d = Vec2::new(s.position.x, s.position.z).distance(point);
                    (*entry.key(), d)
                })
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    pub fn mark_damaged(&self, id: StormId, chunk: ChunkPos) -> bool {
        match self.tracks.get_mut(&id) {
            Some(mut track) => {
                let added = track.mark_damaged(chunk);
                if added {
                    log::debug!("Tornado {} damaged chunk {}", id, chunk);
                }
                added
            }
            None => false,
        }
    }

    /// Publish a survey result on a track
    pub fn apply_survey(
        &self,
        id: StormId,
        surveyed_by: &str,
        survey_time: Timestamp,
        rating: EfRating,
        max_windspeed: f32,
    ) -> StormResult<()> {
        let mut track = self.tracks.get_mut(&id).ok_or(StormError::UnknownTornado(id))?;
        track.apply_survey(surveyed_by, survey_time, rating, max_windspeed);
        log::info!("Tornado {} rated {} by {} ({:.0} mph)", id, rating, surveyed_by, max_windspeed);
        Ok(())
    }

    /// Insert a loaded track, replacing any in-memory one
    pub fn insert(&self, track: TornadoTrack) {
        self.tracks.insert(track.id, track);
    }

    /// Hard delete (admin reset only)
    pub fn remove(&self, id: StormId) -> Option<TornadoTrack> {
        self.tracks.remove(&id).map(|(_, track)| track)
    }

    pub fn clear(&self) {
        self.tracks.clear();
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn tracker() -> TornadoTracker {
        TornadoTracker::new(&SurveyConfig::default())
    }

    fn storm(id: StormId, stage: i32) -> StormSnapshot {
        StormSnapshot::tornado(id, stage, Vec3::new(0.0, 64.0, 0.0), 150, 60.0)
    }

    #[test]
    fn test_only_confirmed_tornadoes_tracked() {
        let tracker = tracker();
        let mut squall = storm(2, 5);
        squall.storm_type = StormType::Squall;
        let update = tracker.ingest(&[storm(1, 2), squall, storm(3, 3)], 0);
        assert_eq!(update.activated, vec![3]);
        assert!(!tracker.contains(1));
        assert!(!tracker.contains(2));

        // Stage 2 storm intensifies later
        tracker.ingest(&[storm(1, 3), storm(3, 3)], 1_000);
        assert!(tracker.is_active(1));
    }

    #[test]
    fn test_grace_period() {
        let tracker = tracker();
        tracker.ingest(&[storm(7, 3)], 0);
        assert!(tracker.ingest(&[], 30_000).deactivated.is_empty());
        let update = tracker.ingest(&[], 30_001);
        assert_eq!(update.deactivated, vec![7]);
        assert_eq!(tracker.inactive_ids(), vec![7]);
    }

    #[test]
    fn test_transient_gap_tolerated() {
        let tracker = tracker();
        tracker.ingest(&[storm(7, 3)], 0);
        tracker.ingest(&[], 20_000);
        tracker.ingest(&[storm(7, 3)], 25_000);
        assert!(tracker.ingest(&[], 50_000).deactivated.is_empty());
        assert!(tracker.is_active(7));
    }

    #[test]
    fn test_dead_storm_closes_and_never_reactivates() {
        let tracker = tracker();
        tracker.ingest(&[storm(9, 3)], 0);
        let mut dead = storm(9, 3);
        dead.dead = true;
        assert_eq!(tracker.ingest(&[dead], 1_000).deactivated, vec![9]);

        let update = tracker.ingest(&[storm(9, 4)], 2_000);
        assert!(update.activated.is_empty());
        assert!(!tracker.is_active(9));
    }

    #[test]
    fn test_apply_survey_unknown_tornado() {
        let tracker = tracker();
        assert!(matches!(
            tracker.apply_survey(5, "A", 0, EfRating::EF2, 120.0),
            Err(StormError::UnknownTornado(5))
        ));
    }

    #[test]
    fn test_nearest_active() {
        let tracker = tracker();
        let mut far = storm(2, 3);
        far.position = Vec3::new(500.0, 64.0, 0.0);
        tracker.ingest(&[storm(1, 3), far], 0);
        assert_eq!(tracker.nearest_active(Vec2::new(450.0, 0.0)), Some(2));
    }
}
