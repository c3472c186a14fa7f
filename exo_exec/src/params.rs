//! Parameters structures for the exoskeleton control core

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use exo_if::geometry::Geometry;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const INCH_TO_M: f64 = 0.0254;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// All parameters loaded from `exo_ctrl.toml`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExoParams {
    pub rig: RigParams,
    pub gains: Gains,
    pub safety: SafetyFlags,
    pub subject: Geometry,
}

/// Calibration of the physical rig.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigParams {
    // ---- GEARING ----
    /// Motor to linkage reduction of each joint's capstan drive.
    pub gear_ratio: [f64; 2],

    /// Encoder counts per motor revolution.
    pub counts_per_rev: f64,

    // ---- LINKAGE ----
    /// Perpendicular offsets of the upper arm and forearm joints from the linkage.
    ///
    /// Units: meters
    pub joint_offset_m: [f64; 2],

    /// Shoulder linkage maximum and elbow linkage minimum for a right handed setup. The linkage
    /// rests against these limits during calibration.
    ///
    /// Units: radians
    pub link_limits_right_rad: [f64; 2],

    /// As `link_limits_right_rad` but for the left handed setup.
    ///
    /// Units: radians
    pub link_limits_left_rad: [f64; 2],

    /// Hard maximum of the elbow joint.
    ///
    /// Units: radians
    pub elbow_max_rad: f64,

    /// Tolerance on the linkage limits when validating a configuration.
    ///
    /// Units: radians
    pub eps_angle_rad: f64,

    /// Margin inside the donut workspace when projecting an unreachable point.
    ///
    /// Units: meters
    pub eps_radius_m: f64,

    // ---- SAFETY ----
    /// Distance before a limit at which the virtual bumpers engage.
    ///
    /// Units: radians
    pub bumper_buffer_rad: f64,

    /// Stiffness of the virtual bumpers.
    ///
    /// Units: Nm/radian
    pub bumper_stiffness_nm_rad: f64,

    /// Maximum magnitude of any torque sent to a motor.
    ///
    /// Units: Nm
    pub max_torque_nm: f64,

    // ---- TRAJECTORIES ----
    /// Peak joint speed of joint space trajectories.
    ///
    /// Units: radians/second
    pub max_joint_speed_rads: f64,

    /// Peak end effector speed of task space trajectories.
    ///
    /// Units: meters/second
    pub max_task_speed_ms: f64,

    // ---- ESTIMATION ----
    /// Weight of the newest sample in the velocity filter, in (0, 1].
    pub vel_filter_weight: f64,

    /// Bound on the magnitude of each integrated error component.
    pub integral_clamp: f64,

    // ---- SETTLING ----
    /// Position and speed threshold for settling in joint space.
    ///
    /// Units: radians, radians/second
    pub settle_joint_thresh_rad: f64,

    /// Position and speed threshold for settling in task space.
    ///
    /// Units: meters, meters/second
    pub settle_task_thresh_m: f64,

    /// Consecutive in-tolerance cycles needed before a target counts as reached.
    pub settle_count: u32,
}

/// Controller gains, indexed by axis (shoulder/elbow or x/y).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gains {
    pub kp_joint: [f64; 2],
    pub kd_joint: [f64; 2],
    pub ki_joint: [f64; 2],

    pub kp_task: [f64; 2],
    pub kd_task: [f64; 2],
    pub ki_task: [f64; 2],

    /// Negative damping applied to free joints.
    pub kd_neg: [f64; 2],

    /// Dither amplitude in motor space.
    ///
    /// Units: Nm
    pub dither_amp_nm: [f64; 2],

    /// Units: Hz
    pub dither_freq_hz: [f64; 2],
}

/// Switches for the auxiliary torques of the safety layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyFlags {
    pub bumpers: bool,
    pub neg_damping: bool,
    pub dither: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RigParams {
    /// Linkage limits for the given handedness.
    pub fn link_limits_rad(&self, right_handed: bool) -> [f64; 2] {
        if right_handed {
            self.link_limits_right_rad
        } else {
            self.link_limits_left_rad
        }
    }
}

impl Default for RigParams {
    fn default() -> Self {
        Self {
            gear_ratio: [16.98, 16.59],
            counts_per_rev: 2000.0,
            joint_offset_m: [1.60 * INCH_TO_M, 1.53 * INCH_TO_M],
            link_limits_right_rad: [62.343f64.to_radians(), 25.541f64.to_radians()],
            link_limits_left_rad: [62.321f64.to_radians(), 26.300f64.to_radians()],
            elbow_max_rad: 145f64.to_radians(),
            eps_angle_rad: 0.25f64.to_radians(),
            eps_radius_m: 0.05,
            bumper_buffer_rad: 5f64.to_radians(),
            bumper_stiffness_nm_rad: 5.0,
            max_torque_nm: 12.0,
            max_joint_speed_rads: 0.4,
            max_task_speed_ms: 0.2,
            vel_filter_weight: 0.5,
            integral_clamp: 750.0,
            settle_joint_thresh_rad: 1.5f64.to_radians(),
            settle_task_thresh_m: 0.01,
            settle_count: 250,
        }
    }
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            kp_joint: [6.0, 3.0],
            kd_joint: [2.0, 2.0],
            ki_joint: [0.0005, 0.0005],
            kp_task: [6.5, 6.5],
            kd_task: [2.0, 2.0],
            ki_task: [0.0005, 0.0005],
            kd_neg: [0.0, 0.0],
            dither_amp_nm: [0.2, 0.2],
            dither_freq_hz: [100.0, 100.0],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_params() {
        let p: ExoParams = util::params::from_str(
            "[gains]\nkp_joint = [8.0, 4.0]\n\n[safety]\nbumpers = true\n",
        )
        .unwrap();

        assert_eq!(p.gains.kp_joint, [8.0, 4.0]);
        assert_eq!(p.gains.kd_joint, Gains::default().kd_joint);
        assert!(p.safety.bumpers);
        assert!(!p.safety.dither);
        assert_eq!(p.rig.settle_count, 250);
    }

    #[test]
    fn test_link_limits_by_handedness() {
        let rig = RigParams::default();

        assert_eq!(rig.link_limits_rad(true), rig.link_limits_right_rad);
        assert_eq!(rig.link_limits_rad(false), rig.link_limits_left_rad);
    }

    #[test]
    fn test_shipped_file_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../params/exo_ctrl.toml");
        let p: ExoParams = util::params::load_from_path(path).unwrap();
        let d = ExoParams::default();

        let close = |a: f64, b: f64| (a - b).abs() < 1e-5;

        assert_eq!(p.gains, d.gains);
        assert_eq!(p.safety, d.safety);
        assert_eq!(p.rig.settle_count, d.rig.settle_count);
        for i in 0..2 {
            assert!(close(p.rig.link_limits_right_rad[i], d.rig.link_limits_right_rad[i]));
            assert!(close(p.rig.link_limits_left_rad[i], d.rig.link_limits_left_rad[i]));
            assert!(close(p.rig.joint_offset_m[i], d.rig.joint_offset_m[i]));
        }
        assert!(close(p.rig.elbow_max_rad, d.rig.elbow_max_rad));
        assert!(close(p.subject.upper_length_m, d.subject.upper_length_m));
        assert!(close(p.subject.elbow_limits.max_rad, d.subject.elbow_limits.max_rad));
    }
}
