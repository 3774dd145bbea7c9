//! Tornado tracks and their lifecycle

pub mod track;
pub mod tracker;

pub use track::{PositionSample, TornadoTrack, TrackSummary, TrackSurvey};
pub use tracker::{TornadoTracker, TrackerUpdate};
