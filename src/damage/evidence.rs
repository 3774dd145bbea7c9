//! Per-chunk damage evidence
//!
//! One [`ChunkDamageData`] exists per (tornado, chunk) pair. Three evidence
//! kinds accumulate independently; ratings and windspeed estimates are always
//! derived from the current evidence on demand.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::rating::EfRating;
use crate::constants::evidence::{
    CONFIDENCE_CAP, CONFIDENCE_STEP, DEBARKING_MIN_EF, DEBARKING_MIN_WINDSPEED,
    DIRT_TO_MEDIUM_MIN_WINDSPEED, GRASS_TO_DIRT_MIN_WINDSPEED, MEDIUM_TO_HEAVY_MIN_WINDSPEED,
};
use crate::time::Timestamp;
use crate::world::{BlockId, ChunkPos, VoxelPos};

/// Ground-cover removal tiers, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScouringLevel {
    GrassToDirt,
    DirtToMedium,
    MediumToHeavy,
}

impl ScouringLevel {
    pub const ALL: [ScouringLevel; 3] = [
        ScouringLevel::GrassToDirt,
        ScouringLevel::DirtToMedium,
        ScouringLevel::MediumToHeavy,
    ];

    /// Minimum windspeed (mph) that produces this tier
    pub fn min_windspeed(&self) -> f32 {
        match self {
            ScouringLevel::GrassToDirt => GRASS_TO_DIRT_MIN_WINDSPEED,
            ScouringLevel::DirtToMedium => DIRT_TO_MEDIUM_MIN_WINDSPEED,
            ScouringLevel::MediumToHeavy => MEDIUM_TO_HEAVY_MIN_WINDSPEED,
        }
    }

    /// Rating floor implied by this tier
    pub fn min_ef_rating(&self) -> EfRating {
        match self {
            ScouringLevel::GrassToDirt => EfRating::EF3,
            ScouringLevel::DirtToMedium => EfRating::EF4,
            ScouringLevel::MediumToHeavy => EfRating::EF5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScouringLevel::GrassToDirt => "GRASS_TO_DIRT",
            ScouringLevel::DirtToMedium => "DIRT_TO_MEDIUM",
            ScouringLevel::MediumToHeavy => "MEDIUM_TO_HEAVY",
        }
    }
}

/// A block the wind destroyed (or was strong enough to destroy)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageRecord {
    pub original_block: BlockId,
    pub resulting_block: BlockId,
    /// Windspeed needed to destroy the original block
    pub strength_threshold: f32,
    pub timestamp: Timestamp,
    /// Tornado peak windspeed when the record was made
    pub tornado_windspeed: f32,
}

/// Outcome of surveying one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSurveyOutcome {
    pub surveyed_by: String,
    pub survey_time: Timestamp,
    pub rating: EfRating,
    pub max_windspeed_found: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkDamageData {
    pub chunk: ChunkPos,
    pub damage_records: HashMap<VoxelPos, DamageRecord>,
    pub debarked_logs: HashSet<VoxelPos>,
    pub scouring: HashMap<VoxelPos, ScouringLevel>,
    pub survey: Option<ChunkSurveyOutcome>,
}

impl ChunkDamageData {
    pub fn new(chunk: ChunkPos) -> Self {
        Self {
            chunk,
            ..Self::default()
        }
    }

    /// Record a destroyed block; a later record for the same position replaces it
    pub fn add_damage(&mut self, pos: VoxelPos, record: DamageRecord) {
        self.damage_records.insert(pos, record);
    }

    pub fn add_debarking_evidence(&mut self, pos: VoxelPos) {
        self.debarked_logs.insert(pos);
    }

    /// Record scouring; a position keeps the most severe tier seen
    pub fn add_scouring_evidence(&mut self, pos: VoxelPos, level: ScouringLevel) {
        let entry = self.scouring.entry(pos).or_insert(level);
        if level > *entry {
            *entry = level;
        }
    }

    pub fn mark_surveyed(
        &mut self,
        surveyed_by: impl Into<String>,
        survey_time: Timestamp,
        rating: EfRating,
        max_windspeed_found: f32,
    ) {
        self.survey = Some(ChunkSurveyOutcome {
            surveyed_by: surveyed_by.into(),
            survey_time,
            rating,
            max_windspeed_found,
        });
    }

    pub fn is_surveyed(&self) -> bool {
        self.survey.is_some()
    }

    pub fn has_damage(&self) -> bool {
        !self.damage_records.is_empty() || !self.debarked_logs.is_empty() || !self.scouring.is_empty()
    }

    /// Number of distinct evidence kinds present
    pub fn evidence_type_count(&self) -> usize {
        [
            !self.damage_records.is_empty(),
            !self.debarked_logs.is_empty(),
            !self.scouring.is_empty(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    fn strongest_scouring(&self) -> Option<ScouringLevel> {
        self.scouring.values().copied().max()
    }

    /// Highest windspeed any single piece of evidence demonstrates
    pub fn max_damage_intensity(&self) -> f32 {
        let mut intensity = self
            .damage_records
            .values()
            .map(|r| r.strength_threshold)
            .fold(0.0f32, f32::max);
        if !self.debarked_logs.is_empty() {
            intensity = intensity.max(DEBARKING_MIN_WINDSPEED);
        }
        if let Some(level) = self.strongest_scouring() {
            intensity = intensity.max(level.min_windspeed());
        }
        intensity
    }

    /// Windspeed estimate: recorded strengths set the baseline, debarking and
    /// scouring raise it to their floors, and each corroborating evidence
    /// kind beyond the first adds a small confidence bonus.
    pub fn enhanced_windspeed_estimate(&self) -> f32 {
        let baseline = self
            .damage_records
            .values()
            .map(|r| r.strength_threshold.max(r.tornado_windspeed))
            .fold(0.0f32, f32::max);

        let mut floor = 0.0f32;
        if !self.debarked_logs.is_empty() {
            floor = floor.max(DEBARKING_MIN_WINDSPEED);
        }
        if let Some(level) = self.strongest_scouring() {
            floor = floor.max(level.min_windspeed());
        }

        let estimate = baseline.max(floor);
        let extra_types = self.evidence_type_count().saturating_sub(1) as f32;
        let bonus = (extra_types * CONFIDENCE_STEP).min(CONFIDENCE_CAP);
        estimate * (1.0 + bonus)
    }

    /// Rating floor demonstrated by debarking and scouring
    pub fn minimum_ef_rating_from_evidence(&self) -> EfRating {
        let mut rating = EfRating::UNRATED;
        if !self.debarked_logs.is_empty() {
            rating = rating.max(EfRating::new(DEBARKING_MIN_EF as i32));
        }
        if let Some(level) = self.strongest_scouring() {
            rating = rating.max(level.min_ef_rating());
        }
        rating
    }

    /// Rating and windspeed a surveyor assigns to this chunk
    pub fn survey_assessment(&self) -> (EfRating, f32) {
        let windspeed = self.enhanced_windspeed_estimate();
        let mut rating = self
            .minimum_ef_rating_from_evidence()
            .max(EfRating::from_windspeed(windspeed));
        if self.has_damage() {
            rating = rating.max(EfRating::EF0);
        }
        (rating, windspeed)
    }
}
