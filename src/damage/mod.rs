//! Damage evidence: detection, per-chunk records, and EF ratings

pub mod detector;
pub mod evidence;
pub mod ledger;
pub mod rating;
pub mod retroactive;

pub use detector::{damage_range, ChunkScanReport, DamageDetector};
pub use evidence::{ChunkDamageData, ChunkSurveyOutcome, DamageRecord, ScouringLevel};
pub use ledger::EvidenceLedger;
pub use rating::{windspeed_to_ef_rating, EfRating};
pub use retroactive::{DrainOutcome, RetroactiveDamageInfo, RetroactiveScheduler};
