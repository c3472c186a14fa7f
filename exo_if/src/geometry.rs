//! # Subject geometry
//!
//! Link lengths, handedness and joint limits of the operator currently strapped into the rig.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const INCH_TO_M: f64 = 0.0254;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Angular range a single joint may occupy.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct JointLimits {
    pub min_rad: f64,
    pub max_rad: f64,
}

/// Geometry of the subject.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Geometry {
    /// Length of the upper arm (shoulder to elbow axis).
    pub upper_length_m: f64,

    /// Length from the elbow axis to the end effector (the handle).
    pub to_ee_length_m: f64,

    /// `true` for a right handed subject, mirroring the rig for a left handed one.
    pub right_handed: bool,

    /// Subject's limits on the shoulder joint.
    pub shoulder_limits: JointLimits,

    /// Subject's limits on the elbow joint.
    pub elbow_limits: JointLimits,
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of the current subject's geometry.
///
/// The geometry may change between sessions, the control core takes one snapshot per cycle.
pub trait GeometryProvider: Send + Sync {
    fn snapshot(&self) -> Geometry;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointLimits {
    pub fn from_deg(min_deg: f64, max_deg: f64) -> Self {
        Self {
            min_rad: min_deg.to_radians(),
            max_rad: max_deg.to_radians(),
        }
    }

    /// Returns `true` if the angle is within the limits (inclusive).
    pub fn contains(&self, angle_rad: f64) -> bool {
        angle_rad >= self.min_rad && angle_rad <= self.max_rad
    }
}

impl Geometry {
    /// Joint limits indexed by joint.
    pub fn limits(&self) -> [JointLimits; 2] {
        [self.shoulder_limits, self.elbow_limits]
    }

    /// Inner radius of the donut workspace.
    pub fn min_reach_m(&self) -> f64 {
        (self.upper_length_m - self.to_ee_length_m).abs()
    }

    /// Outer radius of the donut workspace.
    pub fn max_reach_m(&self) -> f64 {
        self.upper_length_m + self.to_ee_length_m
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            upper_length_m: 13.0 * INCH_TO_M,
            to_ee_length_m: 14.0 * INCH_TO_M,
            right_handed: true,
            shoulder_limits: JointLimits::from_deg(-70.0, 120.0),
            elbow_limits: JointLimits::from_deg(0.0, 170.0),
        }
    }
}

impl GeometryProvider for Geometry {
    fn snapshot(&self) -> Geometry {
        *self
    }
}

impl GeometryProvider for RwLock<Geometry> {
    fn snapshot(&self) -> Geometry {
        *self.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reach() {
        let g = Geometry {
            upper_length_m: 0.35,
            to_ee_length_m: 0.3,
            ..Default::default()
        };

        assert!((g.min_reach_m() - 0.05).abs() < 1e-12);
        assert!((g.max_reach_m() - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_rwlock_provider() {
        let lock = RwLock::new(Geometry::default());
        lock.write().unwrap().right_handed = false;

        assert!(!lock.snapshot().right_handed);
    }

    #[test]
    fn test_partial_toml() {
        let g: Geometry = toml::from_str("upper_length_m = 0.3\nright_handed = false\n").unwrap();

        assert_eq!(g.upper_length_m, 0.3);
        assert!(!g.right_handed);
        assert_eq!(g.to_ee_length_m, Geometry::default().to_ee_length_m);
    }
}
