//! Crate-level error type
//!
//! Storage failures and lookups of unknown tornadoes surface as [`StormError`]. User-facing
//! survey rejections are a separate type, [`crate::survey::SurveyRejection`],
//! because they are expected outcomes rather than faults.

use crate::persistence::PersistenceError;

/// Result alias used across the crate
pub type StormResult<T> = Result<T, StormError>;

#[derive(Debug, thiserror::Error)]
pub enum StormError {
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("unknown tornado {0}")]
    UnknownTornado(i64),
}
