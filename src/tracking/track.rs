//! Per-tornado track record
//!
//! A track is created the first time a storm id is seen at the confirmed
//! tornado stage and never reactivates once it ends. Maxima only grow while
//! active, except that roping-out samples never touch them. The rating is
//! only readable as a grade once a survey has been applied.

use std::collections::BTreeSet;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::damage::{damage_range, EfRating};
use crate::time::{elapsed_since, Timestamp};
use crate::weather::{StormId, StormSnapshot, WindField};
use crate::world::ChunkPos;

/// One entry of the position history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub position: Vec3,
    pub timestamp: Timestamp,
    pub windspeed: f32,
    pub width: f32,
}

impl PositionSample {
    pub fn wind_field(&self) -> WindField {
        WindField::new(self.position, self.windspeed, self.width)
    }

    fn horizontal_distance(&self, point: Vec2) -> f32 {
        Vec2::new(self.position.x, self.position.z).distance(point)
    }
}

/// Published outcome of a completed survey
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSurvey {
    pub surveyed_by: String,
    pub survey_time: Timestamp,
    pub rating: EfRating,
    pub max_windspeed: f32,
}

/// Condensed view of a track for lists and status lines
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub id: StormId,
    pub active: bool,
    pub rating: EfRating,
    pub max_windspeed: f32,
    pub max_width: f32,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub path_length: f32,
    pub sample_count: usize,
    pub damaged_chunk_count: usize,
    pub surveyed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TornadoTrack {
    pub id: StormId,
    active: bool,
    max_windspeed: f32,
    max_width: f32,
    first_seen: Timestamp,
    last_seen: Timestamp,
    position_history: Vec<PositionSample>,
    damaged_chunks: BTreeSet<ChunkPos>,
    survey: Option<TrackSurvey>,
}

impl TornadoTrack {
    /// Start tracking a storm from its first confirmed observation
    pub fn new(snapshot: &StormSnapshot, now: Timestamp) -> Self {
        let windspeed = snapshot.windspeed as f32;
        Self {
            id: snapshot.id,
            active: true,
            max_windspeed: windspeed,
            max_width: snapshot.width,
            first_seen: now,
            last_seen: now,
            position_history: vec![PositionSample {
                position: snapshot.position,
                timestamp: now,
                windspeed,
                width: snapshot.width,
            }],
            damaged_chunks: BTreeSet::new(),
            survey: None,
        }
    }

    /// Rebuild a track from persisted parts. The rating can only come back
    /// through `survey`, so an unsurveyed record always loads unrated.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: StormId,
        active: bool,
        max_windspeed: f32,
        max_width: f32,
        first_seen: Timestamp,
        last_seen: Timestamp,
        position_history: Vec<PositionSample>,
        damaged_chunks: impl IntoIterator<Item = ChunkPos>,
        survey: Option<TrackSurvey>,
    ) -> Self {
        let mut position_history = position_history;
        position_history.sort_by_key(|s| s.timestamp);
        Self {
            id,
            active,
            max_windspeed,
            max_width,
            first_seen,
            last_seen,
            position_history,
            damaged_chunks: damaged_chunks.into_iter().collect(),
            survey,
        }
    }

    /// Fold one live feed observation into the track.
    /// Returns true if a position sample was appended.
    pub fn observe(&mut self, snapshot: &StormSnapshot, now: Timestamp, sample_interval_ms: u64) -> bool {
        if !self.active {
            return false;
        }
        self.last_seen = self.last_seen.max(now);

        let windspeed = snapshot.windspeed as f32;
        let roping_out = snapshot.windspeed == 0 && snapshot.width > 0.0;
        let width = if roping_out {
            self.max_width.min(snapshot.width)
        } else {
            self.max_windspeed = self.max_windspeed.max(windspeed);
            self.max_width = self.max_width.max(snapshot.width);
            snapshot.width
        };

        let due = self
            .position_history
            .last()
            .map(|last| now >= last.timestamp && elapsed_since(last.timestamp, now) >= sample_interval_ms)
            .unwrap_or(true);
        if !due {
            return false;
        }
        self.position_history.push(PositionSample {
            position: snapshot.position,
            timestamp: now,
            windspeed,
            width,
        });
        true
    }

    /// End the track, closing the path with a symbolic dissipated sample
    /// unless one was recorded within `min_gap_ms`
    pub fn deactivate(&mut self, now: Timestamp, dissipated_width_factor: f32, min_gap_ms: u64) {
        if !self.active {
            return;
        }
        self.active = false;

        let Some(last) = self.position_history.last().copied() else {
            return;
        };
        if now < last.timestamp || elapsed_since(last.timestamp, now) < min_gap_ms {
            return;
        }
        self.position_history.push(PositionSample {
            position: last.position,
            timestamp: now,
            windspeed: 0.0,
            width: self.max_width * dissipated_width_factor,
        });
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn max_windspeed(&self) -> f32 {
        self.max_windspeed
    }

    pub fn max_width(&self) -> f32 {
        self.max_width
    }

    pub fn first_seen(&self) -> Timestamp {
        self.first_seen
    }

    pub fn last_seen(&self) -> Timestamp {
        self.last_seen
    }

    pub fn position_history(&self) -> &[PositionSample] {
        &self.position_history
    }

    pub fn latest_sample(&self) -> Option<&PositionSample> {
        self.position_history.last()
    }

    pub fn damaged_chunks(&self) -> &BTreeSet<ChunkPos> {
        &self.damaged_chunks
    }

    /// Add a chunk to the damaged set; membership is never revoked
    pub fn mark_damaged(&mut self, chunk: ChunkPos) -> bool {
        self.damaged_chunks.insert(chunk)
    }

    pub fn is_surveyed(&self) -> bool {
        self.survey.is_some()
    }

    pub fn survey(&self) -> Option<&TrackSurvey> {
        self.survey.as_ref()
    }

    /// Published rating; unrated until surveyed
    pub fn rating(&self) -> EfRating {
        self.survey
            .as_ref()
            .map(|s| s.rating)
            .unwrap_or(EfRating::UNRATED)
    }

    /// Change the published rating. Refused on an unsurveyed track.
    pub fn set_rating(&mut self, rating: EfRating) -> bool {
        match self.survey.as_mut() {
            Some(survey) => {
                survey.rating = rating;
                true
            }
            None => false,
        }
    }

    pub fn apply_survey(&mut self, surveyed_by: impl Into<String>, survey_time: Timestamp, rating: EfRating, max_windspeed: f32) {
        self.survey = Some(TrackSurvey {
            surveyed_by: surveyed_by.into(),
            survey_time,
            rating,
            max_windspeed,
        });
    }

    /// History sample horizontally closest to a point
    pub fn closest_sample(&self, point: Vec2) -> Option<&PositionSample> {
        self.position_history.iter().min_by(|a, b| {
            a.horizontal_distance(point)
                .total_cmp(&b.horizontal_distance(point))
        })
    }

    /// Whether a chunk centre lies within the damage range of any recorded
    /// position, sized by the width at that position
    pub fn chunk_in_damage_range(&self, chunk: ChunkPos, min_range: f32) -> bool {
        let center = chunk.center();
        self.position_history
            .iter()
            .any(|s| s.horizontal_distance(center) <= damage_range(s.width.max(0.0), min_range))
    }

    /// Horizontal distance travelled along the recorded path
    pub fn path_length(&self) -> f32 {
        self.position_history
            .windows(2)
            .map(|pair| {
                Vec2::new(pair[0].position.x, pair[0].position.z)
                    .distance(Vec2::new(pair[1].position.x, pair[1].position.z))
            })
            .sum()
    }

    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            id: self.id,
            active: self.active,
            rating: self.rating(),
            max_windspeed: self.max_windspeed,
            max_width: self.max_width,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            path_length: self.path_length(),
            sample_count: self.position_history.len(),
            damaged_chunk_count: self.damaged_chunks.len(),
            surveyed_by: self.survey.as_ref().map(|s| s.surveyed_by.clone()),
        }
    }
}
