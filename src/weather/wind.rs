use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::constants::wind::{
    FALLOFF_EXPONENT, FIELD_EXTENT_FACTOR, RANKINE_DIVISOR, TRANSLATIONAL_BIAS,
};

/// Rankine-type vortex approximation of a tornado's wind field.
///
/// Deliberately simpler than the upstream simulation's own model; every
/// evidence path uses this one formula so results stay self-consistent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindField {
    pub center: Vec3,
    /// Peak windspeed (mph)
    pub windspeed: f32,
    pub width: f32,
}

impl WindField {
    pub fn new(center: Vec3, windspeed: f32, width: f32) -> Self {
        Self {
            center,
            windspeed,
            width,
        }
    }

    /// Radius beyond which the vortex contributes nothing
    pub fn extent(&self) -> f32 {
        self.width * FIELD_EXTENT_FACTOR
    }

    /// Fraction of peak rotational speed at horizontal distance `d`
    pub fn rotational_fraction(&self, d: f32) -> f32 {
        let rankine_width = self.width / RANKINE_DIVISOR;
        let core_radius = rankine_width / 2.0;
        let extent = self.extent();

        let frac = if d <= core_radius {
            d / core_radius
        } else if d <= extent {
            let span = (extent - rankine_width) / 2.0;
            (1.0 - (d - core_radius) / span)
                .powf(FALLOFF_EXPONENT)
                .clamp(0.0, 1.0)
        } else {
            0.0
        };

        if frac.is_finite() {
            frac.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Estimated wind magnitude at a world-space point
    pub fn speed_at(&self, point: Vec3) -> f32 {
        let radial = Vec2::new(point.x - self.center.x, point.z - self.center.z);
        let d = radial.length();

        let rotational = if d > f32::EPSILON {
            let tangent = Vec2::new(-radial.y, radial.x) / d;
            tangent * (self.windspeed * self.rotational_fraction(d))
        } else {
            Vec2::ZERO
        };

        let extent = self.extent();
        let translational = if extent > 0.0 {
            let weight = (1.0 - d / extent).max(0.0).sqrt();
            Vec2::splat(TRANSLATIONAL_BIAS * weight)
        } else {
            Vec2::ZERO
        };

        let speed = (rotational + translational).length();
        if speed.is_finite() {
            speed
        } else {
            0.0
        }
    }

    /// Speed at the centre of a block
    pub fn speed_at_block(&self, pos: crate::world::VoxelPos) -> f32 {
        self.speed_at(pos.center())
    }
}
