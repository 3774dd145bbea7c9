//! On-disk schema
//!
//! Records are flat and versioned. Unknown fields are ignored and missing
//! ones take their defaults, so newer and older saves both load. A record
//! that is not marked surveyed always loads unrated, whatever its rating
//! field says.

use serde::{Deserialize, Serialize};

use crate::damage::{ChunkDamageData, ChunkSurveyOutcome, DamageRecord, EfRating, ScouringLevel};
use crate::time::Timestamp;
use crate::tracking::{PositionSample, TornadoTrack, TrackSurvey};
use crate::weather::StormId;
use crate::world::{ChunkPos, VoxelPos};

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

const UNKNOWN_SURVEYOR: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackRecord {
    pub schema_version: u32,
    pub id: StormId,
    pub active: bool,
    pub max_windspeed: f32,
    pub max_width: f32,
    /// Display form, "EF0".."EF5" or "EFU"
    pub rating: String,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub position_history: Vec<PositionSample>,
    pub damaged_chunks: Vec<ChunkPos>,
    pub surveyed: bool,
    pub surveyed_by: Option<String>,
    pub survey_time: Timestamp,
    pub surveyed_ef_rating: i8,
    pub surveyed_max_windspeed: f32,
}

impl Default for TrackRecord {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            id: 0,
            active: false,
            max_windspeed: 0.0,
            max_width: 0.0,
            rating: EfRating::UNRATED.to_string(),
            first_seen: 0,
            last_seen: 0,
            position_history: Vec::new(),
            damaged_chunks: Vec::new(),
            surveyed: false,
            surveyed_by: None,
            survey_time: 0,
            surveyed_ef_rating: EfRating::UNRATED.value(),
            surveyed_max_windspeed: 0.0,
        }
    }
}

impl From<&TornadoTrack> for TrackRecord {
    fn from(track: &TornadoTrack) -> Self {
        let survey = track.survey();
        Self {
            schema_version: SCHEMA_VERSION,
            id: track.id,
            active: track.is_active(),
            max_windspeed: track.max_windspeed(),
            max_width: track.max_width(),
            rating: track.rating().to_string(),
            first_seen: track.first_seen(),
            last_seen: track.last_seen(),
            position_history: track.position_history().to_vec(),
            damaged_chunks: track.damaged_chunks().iter().copied().collect(),
            surveyed: survey.is_some(),
            surveyed_by: survey.map(|s| s.surveyed_by.clone()),
            survey_time: survey.map(|s| s.survey_time).unwrap_or(0),
            surveyed_ef_rating: track.rating().value(),
            surveyed_max_windspeed: survey.map(|s| s.max_windspeed).unwrap_or(0.0),
        }
    }
}

impl TrackRecord {
    pub fn into_track(self) -> TornadoTrack {
        let survey = if self.surveyed {
            // The numeric field wins; the display string is derived data
            let rating = if self.surveyed_ef_rating >= 0 {
                EfRating::new(self.surveyed_ef_rating as i32)
            } else {
                EfRating::parse(&self.rating)
            };
            Some(TrackSurvey {
                surveyed_by: self
                    .surveyed_by
                    .unwrap_or_else(|| UNKNOWN_SURVEYOR.to_string()),
                survey_time: self.survey_time,
                rating,
                max_windspeed: self.surveyed_max_windspeed,
            })
        } else {
            if EfRating::parse(&self.rating).is_rated() {
                log::warn!(
                    "Track {} claims rating {} without a survey; loading as unrated",
                    self.id,
                    self.rating
                );
            }
            None
        };

        TornadoTrack::restore(
            self.id,
            self.active,
            self.max_windspeed,
            self.max_width,
            self.first_seen,
            self.last_seen,
            self.position_history,
            self.damaged_chunks,
            survey,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageEntry {
    pub pos: VoxelPos,
    pub record: DamageRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScouringEntry {
    pub pos: VoxelPos,
    pub level: ScouringLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkDamageRecord {
    pub schema_version: u32,
    pub tornado_id: StormId,
    pub chunk: ChunkPos,
    pub damage_records: Vec<DamageEntry>,
    pub debarked_logs: Vec<VoxelPos>,
    pub scouring: Vec<ScouringEntry>,
    pub surveyed: bool,
    pub surveyed_by: Option<String>,
    pub survey_time: Timestamp,
    pub determined_ef_rating: i8,
    pub max_windspeed_found: f32,
}

impl Default for ChunkDamageRecord {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            tornado_id: 0,
            chunk: ChunkPos::default(),
            damage_records: Vec::new(),
            debarked_logs: Vec::new(),
            scouring: Vec::new(),
            surveyed: false,
            surveyed_by: None,
            survey_time: 0,
            determined_ef_rating: EfRating::UNRATED.value(),
            max_windspeed_found: 0.0,
        }
    }
}

impl ChunkDamageRecord {
    pub fn from_data(tornado_id: StormId, data: &ChunkDamageData) -> Self {
        let mut damage_records: Vec<DamageEntry> = data
            .damage_records
            .iter()
            .map(|(pos, record)| DamageEntry { pos: *pos, record: *record })
            .collect();
        damage_records.sort_by_key(|e| e.pos);
        let mut debarked_logs: Vec<VoxelPos> = data.debarked_logs.iter().copied().collect();
        debarked_logs.sort();
        let mut scouring: Vec<ScouringEntry> = data
            .scouring
            .iter()
            .map(|(pos, level)| ScouringEntry { pos: *pos, level: *level })
            .collect();
        scouring.sort_by_key(|e| e.pos);

        let survey = data.survey.as_ref();
        Self {
            schema_version: SCHEMA_VERSION,
            tornado_id,
            chunk: data.chunk,
            damage_records,
            debarked_logs,
            scouring,
            surveyed: survey.is_some(),
            surveyed_by: survey.map(|s| s.surveyed_by.clone()),
            survey_time: survey.map(|s| s.survey_time).unwrap_or(0),
            determined_ef_rating: survey.map(|s| s.rating.value()).unwrap_or(EfRating::UNRATED.value()),
            max_windspeed_found: survey.map(|s| s.max_windspeed_found).unwrap_or(0.0),
        }
    }

    pub fn into_data(self) -> (StormId, ChunkDamageData) {
        let mut data = ChunkDamageData::new(self.chunk);
        for entry in self.damage_records {
            data.add_damage(entry.pos, entry.record);
        }
        for pos in self.debarked_logs {
            data.add_debarking_evidence(pos);
        }
        for entry in self.scouring {
            data.add_scouring_evidence(entry.pos, entry.level);
        }
        if self.surveyed {
            data.survey = Some(ChunkSurveyOutcome {
                surveyed_by: self
                    .surveyed_by
                    .unwrap_or_else(|| UNKNOWN_SURVEYOR.to_string()),
                survey_time: self.survey_time,
                rating: EfRating::new(self.determined_ef_rating as i32),
                max_windspeed_found: self.max_windspeed_found,
            });
        }
        (self.tornado_id, data)
    }
}

/// Top-level layout of the tracks file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackFile {
    pub schema_version: u32,
    pub saved_at: Timestamp,
    pub tracks: Vec<TrackRecord>,
}

impl Default for TrackFile {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            saved_at: 0,
            tracks: Vec::new(),
        }
    }
}

/// Top-level layout of the ledger file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerFile {
    pub schema_version: u32,
    pub saved_at: Timestamp,
    pub chunks: Vec<ChunkDamageRecord>,
}

impl Default for LedgerFile {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            saved_at: 0,
            chunks: Vec::new(),
        }
    }
}
