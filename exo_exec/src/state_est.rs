//! # State estimation
//!
//! Derives the velocity and integrated error terms of the kinematic state from successive
//! position samples.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use util::maths::{clamp, get_ang_dist_2pi};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Joint space state, indexed shoulder then elbow.
///
/// All angles are kept in [0, 2pi), errors are shortest signed angular distances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JointState {
    pub th_rad: Vector2<f64>,
    pub targ_rad: Vector2<f64>,
    pub des_rad: Vector2<f64>,
    pub err_rad: Vector2<f64>,
    pub thdot_rads: Vector2<f64>,
    pub thdot_des_rads: Vector2<f64>,
    pub thdot_err_rads: Vector2<f64>,
    pub err_int: Vector2<f64>,
}

/// Task space state of the end effector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub pos_m: Vector2<f64>,
    pub targ_m: Vector2<f64>,
    pub des_m: Vector2<f64>,
    pub err_m: Vector2<f64>,
    pub vel_ms: Vector2<f64>,
    pub vel_des_ms: Vector2<f64>,
    pub vel_err_ms: Vector2<f64>,
    pub err_int: Vector2<f64>,
}

/// Output of one estimator update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub thdot_rads: Vector2<f64>,
    pub joint_err_int: Vector2<f64>,
    pub task_err_int: Vector2<f64>,
}

/// Filtered velocity and clamped integral estimator.
///
/// Holds the previous sample of everything it differentiates or integrates.
#[derive(Debug, Clone)]
pub struct StateEstimator {
    filter_weight: f64,
    integral_clamp: f64,

    last_t_s: Option<f64>,
    last_th_rad: Vector2<f64>,
    last: Estimate,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Estimate {
    fn default() -> Self {
        Self {
            thdot_rads: Vector2::zeros(),
            joint_err_int: Vector2::zeros(),
            task_err_int: Vector2::zeros(),
        }
    }
}

impl StateEstimator {
    pub fn new(filter_weight: f64, integral_clamp: f64) -> Self {
        Self {
            filter_weight,
            integral_clamp,
            last_t_s: None,
            last_th_rad: Vector2::zeros(),
            last: Estimate::default(),
        }
    }

    /// Forget all history, the next update starts from rest.
    pub fn reset(&mut self) {
        self.last_t_s = None;
        self.last = Estimate::default();
    }

    /// Zero the integrated errors without touching the velocity filter.
    pub fn reset_integrals(&mut self) {
        self.last.joint_err_int = Vector2::zeros();
        self.last.task_err_int = Vector2::zeros();
    }

    /// Update with a new sample.
    ///
    /// If no time has passed since the previous sample the previous estimate is returned
    /// unchanged.
    pub fn update(
        &mut self,
        t_s: f64,
        th_rad: &Vector2<f64>,
        joint_err: &Vector2<f64>,
        task_err: &Vector2<f64>,
    ) -> Estimate {
        let dt_s = match self.last_t_s {
            Some(t0) => t_s - t0,
            None => {
                self.last_t_s = Some(t_s);
                self.last_th_rad = *th_rad;
                return self.last;
            }
        };

        if dt_s <= 0.0 {
            return self.last;
        }

        let a = self.filter_weight;
        let lim = self.integral_clamp;

        let mut est = Estimate::default();
        for i in 0..2 {
            let raw = get_ang_dist_2pi(self.last_th_rad[i], th_rad[i]) / dt_s;
            est.thdot_rads[i] = a * raw + (1.0 - a) * self.last.thdot_rads[i];

            est.joint_err_int[i] =
                clamp(self.last.joint_err_int[i] + joint_err[i] * dt_s, -lim, lim);
            est.task_err_int[i] = clamp(self.last.task_err_int[i] + task_err[i] * dt_s, -lim, lim);
        }

        self.last_t_s = Some(t_s);
        self.last_th_rad = *th_rad;
        self.last = est;

        est
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::approx_eq;

    #[test]
    fn test_integral_clamp() {
        let mut est = StateEstimator::new(0.5, 750.0);
        let th = Vector2::new(1.0, 1.0);
        let err = Vector2::new(2.0, -3.0);

        let mut out = est.update(0.0, &th, &err, &err);
        for i in 1..2000 {
            out = est.update(i as f64, &th, &err, &err);

            for k in 0..2 {
                assert!(out.joint_err_int[k].abs() <= 750.0);
                assert!(out.task_err_int[k].abs() <= 750.0);
            }
        }

        assert_eq!(out.joint_err_int, Vector2::new(750.0, -750.0));
        assert_eq!(out.task_err_int, Vector2::new(750.0, -750.0));
    }

    #[test]
    fn test_velocity_filter() {
        let mut est = StateEstimator::new(0.5, 750.0);
        let zero = Vector2::zeros();

        est.update(0.0, &Vector2::new(1.0, 1.0), &zero, &zero);
        let out = est.update(0.1, &Vector2::new(1.1, 1.0), &zero, &zero);
        assert!(approx_eq(out.thdot_rads[0], 0.5, 1e-9));
        assert!(approx_eq(out.thdot_rads[1], 0.0, 1e-12));

        let out = est.update(0.2, &Vector2::new(1.2, 1.0), &zero, &zero);
        assert!(approx_eq(out.thdot_rads[0], 0.75, 1e-9));
    }

    #[test]
    fn test_velocity_across_wrap() {
        let mut est = StateEstimator::new(1.0, 750.0);
        let zero = Vector2::zeros();
        let tau = std::f64::consts::TAU;

        est.update(0.0, &Vector2::new(tau - 0.01, 0.0), &zero, &zero);
        let out = est.update(0.01, &Vector2::new(0.01, 0.0), &zero, &zero);
        assert!(approx_eq(out.thdot_rads[0], 2.0, 1e-9));
    }

    #[test]
    fn test_no_elapsed_time() {
        let mut est = StateEstimator::new(0.5, 750.0);
        let zero = Vector2::zeros();

        est.update(0.0, &Vector2::new(1.0, 1.0), &zero, &zero);
        let a = est.update(0.1, &Vector2::new(1.1, 1.0), &Vector2::new(1.0, 1.0), &zero);
        let b = est.update(0.1, &Vector2::new(1.5, 1.0), &Vector2::new(1.0, 1.0), &zero);

        assert_eq!(a, b);
        assert!(b.thdot_rads.iter().all(|v| v.is_finite()));
    }
}
