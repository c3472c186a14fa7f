//! # Safety and actuation layer
//!
//! Turns the controller's robot space torque into the motor torques actually issued. The steps
//! are applied in a fixed order:
//!
//! 1. Start from the controller's torque
//! 2. Zero inactive joints
//! 3. Virtual bumpers on locked joints
//! 4. Negative damping on free joints
//! 5. Convert to motor space (gearing and handedness)
//! 6. Dither on free joints
//! 7. Saturate
//! 8. Suppress locked joints
//!
//! Steps 3 and 4 act on the robot's dynamics so they are computed before the conversion, dither
//! targets the motors' friction so it is added after it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use util::maths::{get_ang_dist_2pi, saturate, wrap_to_pi};

use crate::params::{Gains, RigParams, SafetyFlags};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Inputs to the actuation pipeline for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct ActuationInput {
    /// Torque demanded by the controller, in robot space.
    pub torque_nm: Vector2<f64>,

    /// Joints under active control.
    pub active: [bool; 2],

    /// Joints manually locked by the operator.
    pub locked: [bool; 2],

    /// Current joint angles.
    pub th_rad: Vector2<f64>,

    /// Current linkage angles.
    pub link_rad: Vector2<f64>,

    /// Current joint velocities.
    pub thdot_rads: Vector2<f64>,

    /// Current time, drives the dither.
    pub t_s: f64,
}

/// Rig specific constants used by the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ActuationConfig<'a> {
    pub rig: &'a RigParams,
    pub gains: &'a Gains,
    pub safety: &'a SafetyFlags,

    /// Linkage limits for the current handedness.
    pub link_limits_rad: [f64; 2],

    pub right_handed: bool,
}

/// Output of the actuation pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Actuation {
    /// Robot space torque after the safety torques, before conversion.
    pub robot_torque_nm: [f64; 2],

    /// Saturated motor space torque.
    pub motor_torque_nm: [f64; 2],

    /// Torque to send to each motor, `None` for locked joints which must not be driven.
    pub issued_nm: [Option<f64>; 2],
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Run the actuation pipeline.
pub fn compose(input: &ActuationInput, cfg: &ActuationConfig) -> Actuation {
    let rig = cfg.rig;
    let gains = cfg.gains;
    let free = |i: usize| !input.active[i] && !input.locked[i];

    // 1, 2
    let mut t = input.torque_nm;
    for i in 0..2 {
        if !input.active[i] {
            t[i] = 0.0;
        }
    }

    // 3
    if cfg.safety.bumpers {
        let k = rig.bumper_stiffness_nm_rad;
        let buf = rig.bumper_buffer_rad;
        let link = input.link_rad.map(wrap_to_pi);
        let elbow = wrap_to_pi(input.th_rad[1]);

        // Upper arm into the frame
        let lim = cfg.link_limits_rad[0] - buf;
        if input.locked[0] && link[0] > lim {
            t[0] += k * get_ang_dist_2pi(link[0], lim);
        }

        // Forearm into the frame
        let lim = rig.elbow_max_rad - buf;
        if input.locked[1] && elbow > lim {
            t[1] += k * get_ang_dist_2pi(elbow, lim);
        }

        // Upper arm and forearm linkages into each other
        let lim = cfg.link_limits_rad[1] + buf;
        if input.locked[1] && link[1] < lim {
            t[1] += k * get_ang_dist_2pi(link[1], lim);
        }
    }

    // 4
    if cfg.safety.neg_damping {
        for i in 0..2 {
            if free(i) {
                t[i] += gains.kd_neg[i] * input.thdot_rads[i];
            }
        }
    }

    let robot_torque_nm = [t[0], t[1]];

    // 5
    let sign = if cfg.right_handed { 1.0 } else { -1.0 };
    let mut m = [
        sign * t[0] / rig.gear_ratio[0],
        sign * t[1] / rig.gear_ratio[1],
    ];

    // 6
    if cfg.safety.dither {
        for (i, mi) in m.iter_mut().enumerate() {
            if free(i) {
                *mi += gains.dither_amp_nm[i] * (TAU * gains.dither_freq_hz[i] * input.t_s).sin();
            }
        }
    }

    // 7, 8
    let mut issued_nm = [None; 2];
    for i in 0..2 {
        m[i] = saturate(m[i], rig.max_torque_nm);

        if !input.locked[i] {
            issued_nm[i] = Some(m[i]);
        }
    }

    Actuation {
        robot_torque_nm,
        motor_torque_nm: m,
        issued_nm,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::approx_eq;

    fn input(torque: [f64; 2], active: [bool; 2], locked: [bool; 2]) -> ActuationInput {
        ActuationInput {
            torque_nm: Vector2::new(torque[0], torque[1]),
            active,
            locked,
            th_rad: Vector2::new(0.6, 1.5),
            link_rad: Vector2::new(0.6, 1.0),
            thdot_rads: Vector2::new(0.5, -0.25),
            t_s: 0.0125,
        }
    }

    fn config<'a>(
        rig: &'a RigParams,
        gains: &'a Gains,
        safety: &'a SafetyFlags,
        right_handed: bool,
    ) -> ActuationConfig<'a> {
        ActuationConfig {
            rig,
            gains,
            safety,
            link_limits_rad: rig.link_limits_rad(right_handed),
            right_handed,
        }
    }

    #[test]
    fn test_conversion_and_inactive() {
        let rig = RigParams::default();
        let gains = Gains::default();
        let safety = SafetyFlags::default();

        let a = compose(
            &input([3.0, 2.0], [true, false], [false, false]),
            &config(&rig, &gains, &safety, true),
        );
        assert_eq!(a.robot_torque_nm, [3.0, 0.0]);
        assert!(approx_eq(a.motor_torque_nm[0], 3.0 / 16.98, 1e-12));
        assert_eq!(a.issued_nm[1], Some(0.0));

        let a = compose(
            &input([3.0, 2.0], [true, true], [false, false]),
            &config(&rig, &gains, &safety, false),
        );
        assert!(approx_eq(a.motor_torque_nm[0], -3.0 / 16.98, 1e-12));
        assert!(approx_eq(a.motor_torque_nm[1], -2.0 / 16.59, 1e-12));
    }

    #[test]
    fn test_saturation_keeps_sign() {
        let rig = RigParams::default();
        let gains = Gains::default();
        let safety = SafetyFlags::default();

        let a = compose(
            &input([500.0, -500.0], [true, true], [false, false]),
            &config(&rig, &gains, &safety, true),
        );
        assert_eq!(a.motor_torque_nm, [12.0, -12.0]);
        assert_eq!(a.issued_nm, [Some(12.0), Some(-12.0)]);

        // A controller fed invalid gains never reaches the motors with NaN
        let a = compose(
            &input([f64::NAN, 1.0], [true, true], [false, false]),
            &config(&rig, &gains, &safety, true),
        );
        assert_eq!(a.issued_nm[0], Some(0.0));
        assert!(a.issued_nm[1].unwrap().is_finite());
    }

    #[test]
    fn test_locked_joints_suppressed() {
        let rig = RigParams::default();
        let gains = Gains::default();
        let safety = SafetyFlags {
            bumpers: true,
            neg_damping: true,
            dither: true,
        };

        let a = compose(
            &input([3.0, 2.0], [true, true], [false, true]),
            &config(&rig, &gains, &safety, true),
        );
        assert!(a.issued_nm[0].is_some());
        assert_eq!(a.issued_nm[1], None);
    }

    #[test]
    fn test_bumpers() {
        let rig = RigParams::default();
        let gains = Gains::default();
        let safety = SafetyFlags {
            bumpers: true,
            ..Default::default()
        };
        let lims = rig.link_limits_rad(true);

        // Shoulder linkage 1 degree past the start of its buffer, elbow linkage 2 degrees into
        // its buffer
        let mut inp = input([0.0, 0.0], [false, false], [true, true]);
        inp.link_rad = Vector2::new(
            lims[0] - rig.bumper_buffer_rad + 1f64.to_radians(),
            lims[1] + rig.bumper_buffer_rad - 2f64.to_radians(),
        );

        let a = compose(&inp, &config(&rig, &gains, &safety, true));
        assert!(approx_eq(a.robot_torque_nm[0], -5.0 * 1f64.to_radians(), 1e-9));
        assert!(approx_eq(a.robot_torque_nm[1], 5.0 * 2f64.to_radians(), 1e-9));

        // Nothing for unlocked joints
        inp.locked = [false, false];
        let a = compose(&inp, &config(&rig, &gains, &safety, true));
        assert_eq!(a.robot_torque_nm, [0.0, 0.0]);

        // Elbow hard stop
        let mut inp = input([0.0, 0.0], [false, false], [true, true]);
        inp.th_rad[1] = rig.elbow_max_rad - rig.bumper_buffer_rad + 0.5f64.to_radians();
        let a = compose(&inp, &config(&rig, &gains, &safety, true));
        assert!(approx_eq(a.robot_torque_nm[1], -5.0 * 0.5f64.to_radians(), 1e-9));
    }

    #[test]
    fn test_negative_damping_per_joint() {
        let rig = RigParams::default();
        let gains = Gains {
            kd_neg: [0.4, 0.2],
            ..Default::default()
        };
        let safety = SafetyFlags {
            neg_damping: true,
            ..Default::default()
        };

        // Only the free elbow is damped
        let a = compose(
            &input([1.0, 1.0], [true, false], [false, false]),
            &config(&rig, &gains, &safety, true),
        );
        assert!(approx_eq(a.robot_torque_nm[0], 1.0, 1e-12));
        assert!(approx_eq(a.robot_torque_nm[1], 0.2 * -0.25, 1e-12));
    }

    #[test]
    fn test_dither_after_conversion() {
        let rig = RigParams::default();
        let gains = Gains::default();
        let safety = SafetyFlags {
            dither: true,
            ..Default::default()
        };

        let inp = input([0.0, 0.0], [true, false], [false, false]);
        let a = compose(&inp, &config(&rig, &gains, &safety, false));

        // Dither is not scaled by the gearing or handedness
        let expected = 0.2 * (TAU * 100.0 * inp.t_s).sin();
        assert_eq!(a.robot_torque_nm, [0.0, 0.0]);
        assert_eq!(a.motor_torque_nm[0], 0.0);
        assert!(approx_eq(a.motor_torque_nm[1], expected, 1e-12));
    }
}
