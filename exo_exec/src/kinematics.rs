//! Two-link arm kinematics
//!
//! Joint angles are measured with the shoulder angle from the x axis and the elbow angle relative
//! to the upper arm. A left handed subject mirrors the arm about the y axis, so the same joint
//! angles put the end effector at `(-x, y)`.
//!
//! The rig itself is a parallel linkage which does not sit exactly on the subject's joints, the
//! [`Linkage`] struct converts between the subject's joint angles and the rig's linkage angles.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use exo_if::geometry::Geometry;
use nalgebra::{Matrix2, Vector2};
use std::f64::consts::{FRAC_PI_2, PI};

use crate::params::RigParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Kinematics of the subject's arm.
#[derive(Debug, Clone, Copy)]
pub struct Kinematics {
    upper_length_m: f64,
    to_ee_length_m: f64,
    right_handed: bool,
}

/// Fixed offsets between the subject's joints and the rig's linkage.
#[derive(Debug, Clone, Copy)]
pub struct Linkage {
    /// Angle subtended by the upper arm joint offset.
    pub alpha_rad: f64,

    /// Angle subtended by the forearm joint offset.
    pub beta_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Kinematics {
    pub fn new(geometry: &Geometry) -> Self {
        Self {
            upper_length_m: geometry.upper_length_m,
            to_ee_length_m: geometry.to_ee_length_m,
            right_handed: geometry.right_handed,
        }
    }

    /// End effector position for the given joint angles.
    pub fn forward_kin(&self, th_rad: &Vector2<f64>) -> Vector2<f64> {
        let (l1, l2) = (self.upper_length_m, self.to_ee_length_m);
        let (th1, th2) = (th_rad[0], th_rad[1]);

        if self.right_handed {
            Vector2::new(
                l1 * th1.cos() + l2 * (th1 + th2).cos(),
                l1 * th1.sin() + l2 * (th1 + th2).sin(),
            )
        } else {
            Vector2::new(
                l1 * (PI - th1).cos() + l2 * (PI - th1 - th2).cos(),
                l1 * (PI - th1).sin() + l2 * (PI - th1 - th2).sin(),
            )
        }
    }

    /// Joint angles placing the end effector at the given position, elbow angle in [0, pi].
    ///
    /// The law of cosines argument is clamped to [-1, 1], so a point outside the donut workspace
    /// maps to the nearest fully extended or folded configuration instead of NaN. Callers are
    /// still expected to validate the position first.
    pub fn inverse_kin(&self, pos_m: &Vector2<f64>) -> Vector2<f64> {
        let (l1, l2) = (self.upper_length_m, self.to_ee_length_m);
        let (x, y) = (pos_m[0], pos_m[1]);

        let c2 = ((x * x + y * y - l1 * l1 - l2 * l2) / (2.0 * l1 * l2)).clamp(-1.0, 1.0);
        let s2 = (1.0 - c2 * c2).sqrt();
        let th2 = s2.atan2(c2);

        let th1 = if self.right_handed {
            y.atan2(x) - (l2 * s2).atan2(l1 + l2 * c2)
        } else {
            PI - (y.atan2(x) + (l2 * s2).atan2(l1 + l2 * c2))
        };

        Vector2::new(th1, th2)
    }

    /// Velocity Jacobian, mapping joint velocities onto end effector velocity.
    pub fn jacobian(&self, th_rad: &Vector2<f64>) -> Matrix2<f64> {
        let (l1, l2) = (self.upper_length_m, self.to_ee_length_m);
        let (th1, th2) = (th_rad[0], th_rad[1]);

        let s1 = l1 * th1.sin() + l2 * (th1 + th2).sin();
        let s12 = l2 * (th1 + th2).sin();
        let c1 = l1 * th1.cos() + l2 * (th1 + th2).cos();
        let c12 = l2 * (th1 + th2).cos();

        if self.right_handed {
            Matrix2::new(-s1, -s12, c1, c12)
        } else {
            Matrix2::new(s1, s12, c1, c12)
        }
    }
}

impl Linkage {
    pub fn new(geometry: &Geometry, rig: &RigParams) -> Self {
        let ratio = |offset: f64, length: f64| (offset / length).clamp(-1.0, 1.0);

        Self {
            alpha_rad: ratio(rig.joint_offset_m[0], geometry.upper_length_m).asin(),
            beta_rad: ratio(rig.joint_offset_m[1], geometry.to_ee_length_m).asin(),
        }
    }

    /// Linkage angles of the rig holding the subject at the given joint angles.
    pub fn joint_to_link(&self, th_rad: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            th_rad[0] + self.alpha_rad,
            th_rad[1] + th_rad[0] - FRAC_PI_2 + self.beta_rad,
        )
    }

    /// Subject joint angles for the given rig linkage angles.
    pub fn link_to_joint(&self, link_rad: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            link_rad[0] - self.alpha_rad,
            FRAC_PI_2 + link_rad[1] - link_rad[0] + self.alpha_rad - self.beta_rad,
        )
    }
}
