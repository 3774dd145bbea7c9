//! Weather-simulation collaborator port
//!
//! The external weather mod is only ever read through [`WeatherFeed`]. One
//! adapter pushes snapshots in from the host integration ([`SharedFeed`]),
//! the other stands in when the mod is absent ([`DisabledFeed`]).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::Vec3;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::world::BlockId;

/// Storm identity assigned by the external simulation
pub type StormId = i64;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum FeedError {
    #[error("weather simulation is not available: {0}")]
    Unavailable(String),

    #[error("malformed storm record {id}: {reason}")]
    Malformed { id: StormId, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StormType {
    /// Supercell capable of producing tornadoes
    Tornado,
    Squall,
}

impl StormType {
    /// Wire value from the simulation; other values are not storms we track
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(StormType::Tornado),
            1 => Some(StormType::Squall),
            _ => None,
        }
    }
}

/// One storm as reported by the simulation on a single poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StormSnapshot {
    pub id: StormId,
    pub storm_type: StormType,
    pub stage: i32,
    pub position: Vec3,
    /// Peak windspeed in mph
    pub windspeed: i32,
    pub width: f32,
    pub velocity: Vec3,
    pub dead: bool,
}

impl StormSnapshot {
    /// Convenience constructor for a living tornado-type storm
    pub fn tornado(id: StormId, stage: i32, position: Vec3, windspeed: i32, width: f32) -> Self {
        Self {
            id,
            storm_type: StormType::Tornado,
            stage,
            position,
            windspeed,
            width,
            velocity: Vec3::ZERO,
            dead: false,
        }
    }

    /// Reject records whose numbers cannot describe a storm
    pub fn validate(&self) -> Result<(), FeedError> {
        if !self.position.is_finite() {
            return Err(FeedError::Malformed {
                id: self.id,
                reason: "non-finite position".to_string(),
            });
        }
        if !self.width.is_finite() || self.width < 0.0 {
            return Err(FeedError::Malformed {
                id: self.id,
                reason: format!("invalid width {}", self.width),
            });
        }
        if self.windspeed < 0 {
            return Err(FeedError::Malformed {
                id: self.id,
                reason: format!("negative windspeed {}", self.windspeed),
            });
        }
        Ok(())
    }
}

pub trait WeatherFeed: Send + Sync {
    /// Storms currently known to the simulation
    fn poll(&self) -> Result<Vec<StormSnapshot>, FeedError>;

    /// Block strength overrides (mph) from the simulation's config, if any
    fn block_strength_overrides(&self) -> Option<HashMap<BlockId, f32>> {
        None
    }
}

/// Feed used when the weather mod is not installed
#[derive(Debug, Default)]
pub struct DisabledFeed;

impl WeatherFeed for DisabledFeed {
    fn poll(&self) -> Result<Vec<StormSnapshot>, FeedError> {
        Err(FeedError::Unavailable("weather mod not installed".to_string()))
    }
}

/// Feed populated by the host integration once per tick
#[derive(Debug, Default)]
pub struct SharedFeed {
    storms: RwLock<Vec<StormSnapshot>>,
    overrides: RwLock<Option<HashMap<BlockId, f32>>>,
    unavailable: RwLock<Option<String>>,
}

impl SharedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current storm list
    pub fn publish(&self, storms: Vec<StormSnapshot>) {
        *self.storms.write() = storms;
        *self.unavailable.write() = None;
    }

    pub fn set_block_strength_overrides(&self, overrides: HashMap<BlockId, f32>) {
        *self.overrides.write() = Some(overrides);
    }

    /// Report that the host could no longer reach the simulation internals
    pub fn mark_unavailable(&self, reason: impl Into<String>) {
        *self.unavailable.write() = Some(reason.into());
    }
}

impl WeatherFeed for SharedFeed {
    fn poll(&self) -> Result<Vec<StormSnapshot>, FeedError> {
        if let Some(reason) = self.unavailable.read().as_ref() {
            return Err(FeedError::Unavailable(reason.clone()));
        }
        Ok(self.storms.read().clone())
    }

    fn block_strength_overrides(&self) -> Option<HashMap<BlockId, f32>> {
        self.overrides.read().clone()
    }
}

/// Wraps a feed so that an unavailable collaborator disables tracking
/// instead of failing every tick
pub struct FeedMonitor {
    disabled: AtomicBool,
}

impl Default for FeedMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedMonitor {
    pub fn new() -> Self {
        Self {
            disabled: AtomicBool::new(false),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    /// Poll the feed. Unavailability is logged once and latches the monitor;
    /// malformed records are skipped.
    pub fn poll(&self, feed: &dyn WeatherFeed) -> Vec<StormSnapshot> {
        if self.is_disabled() {
            return Vec::new();
        }
        match feed.poll() {
            Ok(storms) => storms
                .into_iter()
                .filter(|storm| match storm.validate() {
                    Ok(()) => true,
                    Err(e) => {
                        log::debug!("Skipping storm record: {}", e);
                        false
                    }
                })
                .collect(),
            Err(e) => {
                if !self.disabled.swap(true, Ordering::AcqRel) {
                    log::warn!("Tornado tracking disabled: {}", e);
                }
                Vec::new()
            }
        }
    }

    /// Re-arm after the host reattaches the simulation
    pub fn reset(&self) {
        self.disabled.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storm_type_from_raw() {
        assert_eq!(StormType::from_raw(0), Some(StormType::Tornado));
        assert_eq!(StormType::from_raw(1), Some(StormType::Squall));
        assert_eq!(StormType::from_raw(7), None);
    }

    #[test]
    fn test_disabled_feed_latches_monitor() {
        let monitor = FeedMonitor::new();
        assert!(monitor.poll(&DisabledFeed).is_empty());
        assert!(monitor.is_disabled());
        assert!(monitor.poll(&DisabledFeed).is_empty());
    }

    #[test]
    fn test_malformed_records_skipped() {
        let feed = SharedFeed::new();
        let mut bad = StormSnapshot::tornado(2, 3, Vec3::ZERO, 100, 10.0);
        bad.width = f32::NAN;
        feed.publish(vec![StormSnapshot::tornado(1, 3, Vec3::ZERO, 100, 10.0), bad]);

        let monitor = FeedMonitor::new();
        let storms = monitor.poll(&feed);
        assert_eq!(storms.len(), 1);
        assert_eq!(storms[0].id, 1);
        assert!(!monitor.is_disabled());
    }

    #[test]
    fn test_shared_feed_unavailable() {
        let feed = SharedFeed::new();
        feed.mark_unavailable("reflection lookup failed");
        assert!(matches!(feed.poll(), Err(FeedError::Unavailable(_))));
        feed.publish(Vec::new());
        assert_eq!(feed.poll(), Ok(Vec::new()));
    }
}
