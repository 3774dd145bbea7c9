//! Runtime configuration
//!
//! Values default to `crate::constants`; a TOML file may override any subset.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{retroactive, survey, tracking};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tuning knobs for tracking, damage inference and surveys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    /// Position-history cadence
    pub sample_interval_ms: u64,
    /// How long a storm may be missing from the feed before its track ends
    pub inactive_grace_ms: u64,
    /// A dissipation sample is skipped if one was recorded this recently
    pub final_sample_min_gap_ms: u64,
    pub dissipated_width_factor: f32,
    pub confirmed_tornado_stage: i32,
    pub min_damage_range: f32,

    pub retroactive_ttl_ms: u64,
    pub retroactive_base_samples: u32,
    pub retroactive_max_samples: u32,
    /// Fixed seed for retroactive inference; entropy-seeded when absent
    pub rng_seed: Option<u64>,

    /// Column spacing for real-time sampling
    pub realtime_sample_stride: i32,
    pub coverage_divisor: usize,
    pub force_load_wait_ms: u64,
    pub forced_chunk_release_delay_ms: u64,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: tracking::SAMPLE_INTERVAL_MS,
            inactive_grace_ms: tracking::INACTIVE_GRACE_MS,
            final_sample_min_gap_ms: tracking::FINAL_SAMPLE_MIN_GAP_MS,
            dissipated_width_factor: tracking::DISSIPATED_WIDTH_FACTOR,
            confirmed_tornado_stage: tracking::CONFIRMED_TORNADO_STAGE,
            min_damage_range: tracking::MIN_DAMAGE_RANGE,
            retroactive_ttl_ms: retroactive::ENTRY_TTL_MS,
            retroactive_base_samples: retroactive::BASE_SAMPLES,
            retroactive_max_samples: retroactive::MAX_SAMPLES,
            rng_seed: None,
            realtime_sample_stride: survey::REAL_TIME_SAMPLE_STRIDE,
            coverage_divisor: survey::COVERAGE_DIVISOR,
            force_load_wait_ms: survey::FORCE_LOAD_WAIT_MS,
            forced_chunk_release_delay_ms: survey::FORCED_CHUNK_RELEASE_DELAY_MS,
        }
    }
}

impl SurveyConfig {
    /// Load a TOML config file; keys not present keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: SurveyConfig = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "sample_interval_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.coverage_divisor == 0 {
            return Err(ConfigError::Invalid {
                field: "coverage_divisor",
                reason: "must be positive".to_string(),
            });
        }
        if self.realtime_sample_stride <= 0 {
            return Err(ConfigError::Invalid {
                field: "realtime_sample_stride",
                reason: "must be positive".to_string(),
            });
        }
        if !(self.min_damage_range.is_finite() && self.min_damage_range > 0.0) {
            return Err(ConfigError::Invalid {
                field: "min_damage_range",
                reason: format!("{} is not a positive distance", self.min_damage_range),
            });
        }
        Ok(())
    }

    /// Config for tests and headless tools: no blocking waits, fixed seed
    pub fn deterministic(seed: u64) -> Self {
        Self {
            rng_seed: Some(seed),
            force_load_wait_ms: 0,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SurveyConfig::from_toml_str("retroactive_ttl_ms = 1000\nrng_seed = 7\n").unwrap();
        assert_eq!(config.retroactive_ttl_ms, 1000);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.sample_interval_ms, tracking::SAMPLE_INTERVAL_MS);
        assert_eq!(config.coverage_divisor, 4);
    }

    #[test]
    fn test_invalid_divisor_rejected() {
        let err = SurveyConfig::from_toml_str("coverage_divisor = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "coverage_divisor", .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("survey.toml");
        std::fs::write(&path, "force_load_wait_ms = 0\n").unwrap();
        let config = SurveyConfig::load(&path).unwrap();
        assert_eq!(config.force_load_wait_ms, 0);
    }
}
