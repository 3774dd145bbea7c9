use std::fs;
use std::path::{Path, PathBuf};

use super::atomic_save::atomic_write;
use super::records::{ChunkDamageRecord, LedgerFile, TrackFile, TrackRecord, SCHEMA_VERSION};
use super::{PersistenceError, PersistenceResult};
use crate::damage::EvidenceLedger;
use crate::time::Timestamp;
use crate::tracking::{TornadoTrack, TornadoTracker};

pub const TRACKS_FILE: &str = "tornado_tracks.json";
pub const LEDGER_FILE: &str = "damage_ledger.json";

/// Counts from one load, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub tracks: usize,
    pub chunks: usize,
}

/// Per-world save directory holding the tracks file and the ledger file
#[derive(Debug, Clone)]
pub struct SurveyDataStore {
    dir: PathBuf,
}

impl SurveyDataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tracks_path(&self) -> PathBuf {
        self.dir.join(TRACKS_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE)
    }

    pub fn save_tracks(&self, tracks: &[TornadoTrack], now: Timestamp) -> PersistenceResult<()> {
        let mut records: Vec<TrackRecord> = tracks.iter().map(TrackRecord::from).collect();
        records.sort_by_key(|r| r.id);
        let file = TrackFile {
            schema_version: SCHEMA_VERSION,
            saved_at: now,
            tracks: records,
        };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
        atomic_write(self.tracks_path(), &bytes)
    }

    /// Missing file means a fresh world
    pub fn load_tracks(&self) -> PersistenceResult<Vec<TornadoTrack>> {
        let Some(bytes) = read_optional(&self.tracks_path())? else {
            return Ok(Vec::new());
        };
        let file: TrackFile = serde_json::from_slice(&bytes)?;
        check_version("tracks", file.schema_version);
        Ok(file.tracks.into_iter().map(TrackRecord::into_track).collect())
    }

    pub fn save_ledger(&self, ledger: &EvidenceLedger, now: Timestamp) -> PersistenceResult<()> {
        let mut chunks: Vec<ChunkDamageRecord> = ledger
            .snapshot()
            .iter()
            .map(|(tornado, data)| ChunkDamageRecord::from_data(*tornado, data))
            .collect();
        chunks.sort_by_key(|r| (r.tornado_id, r.chunk));
        let file = LedgerFile {
            schema_version: SCHEMA_VERSION,
            saved_at: now,
            chunks,
        };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
        atomic_write(self.ledger_path(), &bytes)
    }

    pub fn load_ledger(&self, ledger: &EvidenceLedger) -> PersistenceResult<usize> {
        let Some(bytes) = read_optional(&self.ledger_path())? else {
            return Ok(0);
        };
        let file: LedgerFile = serde_json::from_slice(&bytes)?;
        check_version("ledger", file.schema_version);
        let count = file.chunks.len();
        for record in file.chunks {
            let (tornado, data) = record.into_data();
            ledger.insert(tornado, data);
        }
        Ok(count)
    }

    pub fn save_all(&self, tracker: &TornadoTracker, ledger: &EvidenceLedger, now: Timestamp) -> PersistenceResult<()> {
        self.save_tracks(&tracker.all(), now)?;
        self.save_ledger(ledger, now)?;
        log::debug!(
            "Saved {} tracks and {} ledger chunks to {}",
            tracker.len(),
            ledger.len(),
            self.dir.display()
        );
        Ok(())
    }

    /// Replace in-memory state with what is on disk
    pub fn load_all(&self, tracker: &TornadoTracker, ledger: &EvidenceLedger) -> PersistenceResult<LoadStats> {
        let tracks = self.load_tracks()?;
        tracker.clear();
        ledger.clear();
        let stats = LoadStats {
            tracks: tracks.len(),
            chunks: 0,
        };
        for track in tracks {
            tracker.insert(track);
        }
        let chunks = self.load_ledger(ledger)?;
        let stats = LoadStats { chunks, ..stats };
        log::info!(
            "Loaded {} tornado tracks and {} damaged chunks from {}",
            stats.tracks,
            stats.chunks,
            self.dir.display()
        );
        Ok(stats)
    }
}

fn read_optional(path: &Path) -> PersistenceResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn check_version(what: &str, found: u32) {
    if found > SCHEMA_VERSION {
        log::warn!(
            "{} file has schema version {} (newer than {}); unknown fields will be dropped",
            what,
            found,
            SCHEMA_VERSION
        );
    }
}
