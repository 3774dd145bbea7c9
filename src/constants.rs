// Tornado Survey Constants - SINGLE SOURCE OF TRUTH
//
// Every tuning value used by the tracker, the damage model and the survey
// workflow lives here. `SurveyConfig::default()` is built from these.

/// World layout
pub mod world {
    /// Horizontal chunk edge length in blocks
    pub const CHUNK_SIZE: i32 = 16;
    pub const CHUNK_SIZE_F32: f32 = 16.0;
    /// Default column height for in-memory worlds
    pub const DEFAULT_WORLD_HEIGHT: i32 = 128;
}

/// Rankine vortex model
pub mod wind {
    /// Rankine core width = windfield width / this divisor
    pub const RANKINE_DIVISOR: f32 = 4.5;
    /// Outer edge of the wind field as a multiple of the windfield width
    pub const FIELD_EXTENT_FACTOR: f32 = 2.0;
    /// Falloff exponent in the transition region
    pub const FALLOFF_EXPONENT: f32 = 1.5;
    /// Forward-motion contribution per horizontal axis
    pub const TRANSLATIONAL_BIAS: f32 = 15.0;
}

/// Block destructibility
pub mod strength {
    /// threshold = BASE + sqrt(relative hardness) * SCALE
    pub const BASE_THRESHOLD: f32 = 60.0;
    pub const HARDNESS_SCALE: f32 = 60.0;
    /// Used when hardness cannot be normalised (unbreakable, NaN, zero tool speed)
    pub const FALLBACK_RELATIVE_HARDNESS: f32 = 1.0;
}

/// Evidence thresholds (mph)
pub mod evidence {
    pub const DEBARKING_MIN_WINDSPEED: f32 = 140.0;
    pub const GRASS_TO_DIRT_MIN_WINDSPEED: f32 = 140.0;
    pub const DIRT_TO_MEDIUM_MIN_WINDSPEED: f32 = 170.0;
    pub const MEDIUM_TO_HEAVY_MIN_WINDSPEED: f32 = 200.0;

    /// Minimum EF rating implied by debarking
    pub const DEBARKING_MIN_EF: i8 = 3;

    /// Confidence multiplier per corroborating evidence type beyond the first
    pub const CONFIDENCE_STEP: f32 = 0.05;
    pub const CONFIDENCE_CAP: f32 = 0.10;

    /// Natural forest: share of log/leaf/grass blocks in a 7x7x7 sample
    pub const FOREST_SAMPLE_RADIUS: i32 = 3;
    pub const FOREST_MIN_RATIO: f32 = 0.20;
    /// Natural grassland: share of grass blocks in a 7x1x7 sample
    pub const GRASSLAND_SAMPLE_RADIUS: i32 = 3;
    pub const GRASSLAND_MIN_RATIO: f32 = 0.40;
    /// How far below the surface the debarking scan looks for trunks
    pub const CANOPY_SCAN_DEPTH: i32 = 8;
}

/// Enhanced Fujita scale bands (lower bound mph of each rating)
pub mod ef_scale {
    pub const EF0_MIN: f32 = 65.0;
    pub const EF1_MIN: f32 = 86.0;
    pub const EF2_MIN: f32 = 111.0;
    pub const EF3_MIN: f32 = 136.0;
    pub const EF4_MIN: f32 = 166.0;
    pub const EF5_MIN: f32 = 201.0;

    pub const UNRATED: i8 = -1;
    pub const MAX_RATING: i8 = 5;
}

/// Tornado track lifecycle
pub mod tracking {
    /// Stage at which a storm counts as a confirmed tornado
    pub const CONFIRMED_TORNADO_STAGE: i32 = 3;
    pub const SAMPLE_INTERVAL_MS: u64 = 10_000;
    pub const INACTIVE_GRACE_MS: u64 = 30_000;
    pub const FINAL_SAMPLE_MIN_GAP_MS: u64 = 5_000;
    pub const DISSIPATED_WIDTH_FACTOR: f32 = 0.1;
    /// Damage range floor; the range is max(width * 2, this)
    pub const MIN_DAMAGE_RANGE: f32 = 80.0;
    pub const DAMAGE_RANGE_WIDTH_FACTOR: f32 = 2.0;
}

/// Retroactive analysis
pub mod retroactive {
    pub const ENTRY_TTL_MS: u64 = 10 * 60 * 1000;
    /// Samples per chunk = BASE + windspeed / DIVISOR, capped
    pub const BASE_SAMPLES: u32 = 8;
    pub const WINDSPEED_SAMPLE_DIVISOR: f32 = 10.0;
    pub const MAX_SAMPLES: u32 = 48;
    /// Probability floor for inferring evidence once the wind clears the threshold
    pub const MIN_INFERENCE_PROBABILITY: f64 = 0.45;
}

/// Survey workflow
pub mod survey {
    /// requiredSurveys = max(1, targets / COVERAGE_DIVISOR)
    pub const COVERAGE_DIVISOR: usize = 4;
    pub const FORCE_LOAD_WAIT_MS: u64 = 400;
    pub const FORCED_CHUNK_RELEASE_DELAY_MS: u64 = 60_000;
    pub const REAL_TIME_SAMPLE_STRIDE: i32 = 2;
}
