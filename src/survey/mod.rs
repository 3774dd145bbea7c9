//! Damage survey workflow
//!
//! A survey walks a finished tornado's damaged chunks, rating each from its
//! evidence, and publishes the highest rating found. The client runs the
//! session locally for responsiveness; the server session table is the
//! arbiter for ownership, coverage and downgrade conflicts.

pub mod candidates;
pub mod client;
pub mod server;

use crate::damage::EfRating;
use crate::weather::StormId;
use crate::world::ChunkPos;

pub use candidates::{CandidateFilter, FilterContext, ForcedChunks};
pub use client::{ClientEvent, ClientSurveyState, SurveyClient, SurveySession};
pub use server::{Outgoing, Recipient, ServerContext, ServerSurveySession, ServerSurveyState, SurveyServer};

/// A survey request that failed validation. The text is shown to the player.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SurveyRejection {
    #[error("Tornado tracking is unavailable")]
    TrackingUnavailable,

    #[error("Unknown tornado {0}")]
    UnknownTornado(StormId),

    #[error("Tornado {0} is still active. Wait for it to end before surveying.")]
    TornadoActive(StormId),

    #[error("Tornado {tornado} is already being surveyed by {surveyor}")]
    SurveyInProgress { tornado: StormId, surveyor: String },

    #[error("You are already surveying tornado {0}")]
    AlreadySurveying(StormId),

    #[error("No damage evidence was found for tornado {0}")]
    NoDamageEvidence(StormId),

    #[error("You are not surveying tornado {0}")]
    NoSession(StormId),

    #[error("Chunk {0} is not part of this survey")]
    ChunkNotInSurvey(ChunkPos),

    #[error("Chunk {0} has already been surveyed")]
    ChunkAlreadySurveyed(ChunkPos),

    #[error("Survey at least {required} chunks before finishing ({surveyed} so far)")]
    InsufficientCoverage { surveyed: usize, required: usize },

    #[error("Tornado {tornado} was already rated {existing} by {surveyor}; a rating of {attempted} cannot replace it. Contact an admin to change it.")]
    DowngradeConflict {
        tornado: StormId,
        existing: EfRating,
        surveyor: String,
        attempted: EfRating,
    },

    #[error("Invalid survey request: {0}")]
    InvalidRequest(String),
}

impl SurveyRejection {
    /// Whether the server discarded the sender's session with this rejection
    pub fn closes_session(&self) -> bool {
        matches!(self, SurveyRejection::DowngradeConflict { .. })
    }
}

/// Chunks that must be surveyed before a survey over `targets` may finish
pub fn required_surveys(targets: usize, coverage_divisor: usize) -> usize {
    (targets / coverage_divisor.max(1)).max(1)
}
