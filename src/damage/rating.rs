use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::ef_scale::*;

/// Enhanced Fujita rating, -1 meaning unrated ("EFU")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EfRating(i8);

impl Default for EfRating {
    fn default() -> Self {
        EfRating::UNRATED
    }
}

impl EfRating {
    pub const UNRATED: EfRating = EfRating(UNRATED);
    pub const EF0: EfRating = EfRating(0);
    pub const EF1: EfRating = EfRating(1);
    pub const EF2: EfRating = EfRating(2);
    pub const EF3: EfRating = EfRating(3);
    pub const EF4: EfRating = EfRating(4);
    pub const EF5: EfRating = EfRating(5);

    /// Clamp an arbitrary wire value into -1..=5
    pub fn new(value: i32) -> Self {
        EfRating(value.clamp(UNRATED as i32, MAX_RATING as i32) as i8)
    }

    pub fn value(&self) -> i8 {
        self.0
    }

    pub fn is_rated(&self) -> bool {
        self.0 >= 0
    }

    /// Rating implied by a windspeed estimate
    pub fn from_windspeed(mph: f32) -> Self {
        if !mph.is_finite() || mph < EF0_MIN {
            EfRating::UNRATED
        } else if mph < EF1_MIN {
            EfRating::EF0
        } else if mph < EF2_MIN {
            EfRating::EF1
        } else if mph < EF3_MIN {
            EfRating::EF2
        } else if mph < EF4_MIN {
            EfRating::EF3
        } else if mph < EF5_MIN {
            EfRating::EF4
        } else {
            EfRating::EF5
        }
    }

    /// Parse the display form ("EF0".."EF5", "EFU"); anything else is unrated
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        match trimmed
            .strip_prefix("EF")
            .and_then(|digit| digit.parse::<i32>().ok())
        {
            Some(value) if (0..=MAX_RATING as i32).contains(&value) => EfRating::new(value),
            _ => EfRating::UNRATED,
        }
    }
}

impl fmt::Display for EfRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_rated() {
            write!(f, "EF{}", self.0)
        } else {
            write!(f, "EFU")
        }
    }
}

/// Free-function form used by the survey workflow
pub fn windspeed_to_ef_rating(mph: f32) -> EfRating {
    EfRating::from_windspeed(mph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_edges() {
        assert_eq!(EfRating::from_windspeed(64.9), EfRating::UNRATED);
        assert_eq!(EfRating::from_windspeed(65.0), EfRating::EF0);
        assert_eq!(EfRating::from_windspeed(110.0), EfRating::EF1);
        assert_eq!(EfRating::from_windspeed(136.0), EfRating::EF3);
        assert_eq!(EfRating::from_windspeed(165.9), EfRating::EF3);
        assert_eq!(EfRating::from_windspeed(200.0), EfRating::EF4);
        assert_eq!(EfRating::from_windspeed(250.0), EfRating::EF5);
        assert_eq!(EfRating::from_windspeed(f32::NAN), EfRating::UNRATED);
    }

    #[test]
    fn test_display_and_parse() {
        assert_eq!(EfRating::EF3.to_string(), "EF3");
        assert_eq!(EfRating::UNRATED.to_string(), "EFU");
        assert_eq!(EfRating::parse("EF4"), EfRating::EF4);
        assert_eq!(EfRating::parse("EF9"), EfRating::UNRATED);
        assert_eq!(EfRating::parse("garbage"), EfRating::UNRATED);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(EfRating::new(12), EfRating::EF5);
        assert_eq!(EfRating::new(-40), EfRating::UNRATED);
    }
}
