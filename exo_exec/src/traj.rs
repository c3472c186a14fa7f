//! # Trajectory generation
//!
//! Point to point moves follow a quintic minimum-jerk profile, which starts and ends at rest.
//! Joint space moves are profiled independently on each joint, task space moves are profiled
//! along a straight line (fixed bearing) from the start position.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use exo_if::ctrl::Frame;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use util::maths::wrap_to_2pi;

use crate::kinematics::Kinematics;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A point to point move starting at `t_init_s`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Trajectory {
    Joint {
        init_rad: Vector2<f64>,

        /// Signed shortest angular displacement of each joint.
        delta_rad: Vector2<f64>,

        duration_s: [f64; 2],
        t_init_s: f64,
    },
    Task {
        init_m: Vector2<f64>,
        distance_m: f64,
        bearing_rad: f64,
        duration_s: f64,
        t_init_s: f64,
    },
}

/// Desired state along a trajectory, in both frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesiredState {
    pub th_rad: Vector2<f64>,
    pub thdot_rads: Vector2<f64>,
    pub pos_m: Vector2<f64>,
    pub vel_ms: Vector2<f64>,

    /// `true` once every axis has reached the end of its move.
    pub complete: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Duration of a minimum-jerk move of `delta` whose peak speed is exactly `max_speed`.
pub fn min_jerk_duration(delta: f64, max_speed: f64) -> f64 {
    (30.0 * delta.abs()) / (16.0 * max_speed)
}

/// Displacement and speed along a minimum-jerk move at time `t` after its start.
///
/// Before the start the move is at rest at zero, after `duration` it is at rest at `delta`.
pub fn min_jerk(delta: f64, duration: f64, t: f64) -> (f64, f64) {
    if t >= duration {
        return (delta, 0.0);
    }
    if t <= 0.0 {
        return (0.0, 0.0);
    }

    let tau = t / duration;
    let tau2 = tau * tau;
    let tau3 = tau2 * tau;

    let s = delta * (10.0 * tau3 - 15.0 * tau3 * tau + 6.0 * tau3 * tau2);
    let sdot = (delta / duration) * (30.0 * tau2 - 60.0 * tau3 + 30.0 * tau3 * tau);

    (s, sdot)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Trajectory {
    /// A joint space move from `init_rad` by `delta_rad`.
    pub fn joint(
        init_rad: Vector2<f64>,
        delta_rad: Vector2<f64>,
        max_speed_rads: f64,
        t_init_s: f64,
    ) -> Self {
        Trajectory::Joint {
            init_rad,
            delta_rad,
            duration_s: [
                min_jerk_duration(delta_rad[0], max_speed_rads),
                min_jerk_duration(delta_rad[1], max_speed_rads),
            ],
            t_init_s,
        }
    }

    /// A straight line task space move from `init_m` to `target_m`.
    pub fn task(
        init_m: Vector2<f64>,
        target_m: Vector2<f64>,
        max_speed_ms: f64,
        t_init_s: f64,
    ) -> Self {
        let d = target_m - init_m;
        let distance_m = d.norm();

        Trajectory::Task {
            init_m,
            distance_m,
            bearing_rad: d[1].atan2(d[0]),
            duration_s: min_jerk_duration(distance_m, max_speed_ms),
            t_init_s,
        }
    }

    /// A zero length move which holds the given state.
    pub fn hold(frame: Frame, th_rad: Vector2<f64>, pos_m: Vector2<f64>, t_init_s: f64) -> Self {
        match frame {
            Frame::Joint => Trajectory::Joint {
                init_rad: th_rad,
                delta_rad: Vector2::zeros(),
                duration_s: [0.0; 2],
                t_init_s,
            },
            Frame::Task => Trajectory::Task {
                init_m: pos_m,
                distance_m: 0.0,
                bearing_rad: 0.0,
                duration_s: 0.0,
                t_init_s,
            },
        }
    }

    pub fn frame(&self) -> Frame {
        match self {
            Trajectory::Joint { .. } => Frame::Joint,
            Trajectory::Task { .. } => Frame::Task,
        }
    }

    pub fn t_init_s(&self) -> f64 {
        match self {
            Trajectory::Joint { t_init_s, .. } | Trajectory::Task { t_init_s, .. } => *t_init_s,
        }
    }

    /// Time the slowest axis needs to complete the move.
    pub fn duration_s(&self) -> f64 {
        match self {
            Trajectory::Joint { duration_s, .. } => duration_s[0].max(duration_s[1]),
            Trajectory::Task { duration_s, .. } => *duration_s,
        }
    }

    /// Desired state at absolute time `t_s`.
    ///
    /// The state in the other frame is derived through the kinematics so both representations
    /// agree.
    pub fn sample(&self, t_s: f64, kin: &Kinematics) -> DesiredState {
        let elapsed_s = t_s - self.t_init_s();

        match *self {
            Trajectory::Joint {
                init_rad,
                delta_rad,
                duration_s,
                ..
            } => {
                let mut th_rad = Vector2::zeros();
                let mut thdot_rads = Vector2::zeros();

                for i in 0..2 {
                    let (s, sdot) = min_jerk(delta_rad[i], duration_s[i], elapsed_s);
                    th_rad[i] = wrap_to_2pi(init_rad[i] + s);
                    thdot_rads[i] = sdot;
                }

                DesiredState {
                    th_rad,
                    thdot_rads,
                    pos_m: kin.forward_kin(&th_rad),
                    vel_ms: kin.jacobian(&th_rad) * thdot_rads,
                    complete: elapsed_s >= self.duration_s(),
                }
            }
            Trajectory::Task {
                init_m,
                distance_m,
                bearing_rad,
                duration_s,
                ..
            } => {
                let (dr, drdot) = min_jerk(distance_m, duration_s, elapsed_s);
                let dir = Vector2::new(bearing_rad.cos(), bearing_rad.sin());

                let pos_m = init_m + dir * dr;
                let vel_ms = dir * drdot;
                let th_rad = kin.inverse_kin(&pos_m).map(wrap_to_2pi);

                // No joint velocity can be derived at a singularity
                let thdot_rads = match kin.jacobian(&th_rad).try_inverse() {
                    Some(j_inv) => j_inv * vel_ms,
                    None => Vector2::zeros(),
                };

                DesiredState {
                    th_rad,
                    thdot_rads,
                    pos_m,
                    vel_ms,
                    complete: elapsed_s >= duration_s,
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::approx_eq;
    use exo_if::geometry::Geometry;

    #[test]
    fn test_min_jerk_boundaries() {
        for &delta in &[0.7, -1.3] {
            let dt = min_jerk_duration(delta, 0.4);

            let (s0, v0) = min_jerk(delta, dt, 0.0);
            let (s1, v1) = min_jerk(delta, dt, dt);
            assert_eq!(s0, 0.0);
            assert_eq!(v0, 0.0);
            assert_eq!(s1, delta);
            assert_eq!(v1, 0.0);

            // Just inside either end the profile is continuous
            let (s, v) = min_jerk(delta, dt, 1e-9);
            assert!(approx_eq(s, 0.0, 1e-9) && approx_eq(v, 0.0, 1e-6));
            let (s, v) = min_jerk(delta, dt, dt - 1e-9);
            assert!(approx_eq(s, delta, 1e-9) && approx_eq(v, 0.0, 1e-6));
        }
    }

    #[test]
    fn test_min_jerk_monotonic_and_peak_speed() {
        let delta = 0.9;
        let v_max = 0.4;
        let dt = min_jerk_duration(delta, v_max);

        let mut last = 0.0;
        let mut peak: f64 = 0.0;
        for i in 1..=1000 {
            let (s, v) = min_jerk(delta, dt, dt * i as f64 / 1000.0);
            assert!(s >= last);
            last = s;
            peak = peak.max(v);
        }

        assert!(approx_eq(peak, v_max, 1e-9));

        // Negative moves are monotonically decreasing
        let mut last = 0.0;
        for i in 1..=100 {
            let (s, _) = min_jerk(-delta, dt, dt * i as f64 / 100.0);
            assert!(s <= last);
            last = s;
        }
    }

    #[test]
    fn test_zero_length_move() {
        assert_eq!(min_jerk_duration(0.0, 0.2), 0.0);
        assert_eq!(min_jerk(0.0, 0.0, 0.0), (0.0, 0.0));
    }

    #[test]
    fn test_joint_trajectory() {
        let kin = Kinematics::new(&Geometry::default());
        let init = Vector2::new(1.0, 1.5);
        let traj = Trajectory::joint(init, Vector2::new(-0.4, 0.2), 0.4, 10.0);

        // Axes with different displacements have different durations
        let dur = match traj {
            Trajectory::Joint { duration_s, .. } => duration_s,
            _ => unreachable!(),
        };
        assert!(dur[0] > dur[1]);

        let start = traj.sample(10.0, &kin);
        assert!(approx_eq(start.th_rad[0], 1.0, 1e-12));
        assert!(!start.complete);

        let mid = traj.sample(10.0 + dur[1], &kin);
        assert!(approx_eq(mid.th_rad[1], 1.7, 1e-12));
        assert_eq!(mid.thdot_rads[1], 0.0);
        assert!(mid.thdot_rads[0] < 0.0);

        let end = traj.sample(100.0, &kin);
        assert!(end.complete);
        assert!(approx_eq(end.th_rad[0], 0.6, 1e-12));
        assert!(approx_eq(end.th_rad[1], 1.7, 1e-12));

        let p = kin.forward_kin(&end.th_rad);
        assert!(approx_eq(end.pos_m[0], p[0], 1e-12));
        assert!(approx_eq(end.pos_m[1], p[1], 1e-12));
    }

    #[test]
    fn test_task_trajectory_consistent() {
        let kin = Kinematics::new(&Geometry::default());
        let init = kin.forward_kin(&Vector2::new(0.5, 1.5));
        let target = kin.forward_kin(&Vector2::new(0.8, 1.2));
        let traj = Trajectory::task(init, target, 0.2, 0.0);
        let dur = traj.duration_s();

        for i in 0..=10 {
            let d = traj.sample(dur * i as f64 / 10.0, &kin);

            // Joint space agrees with task space
            let p = kin.forward_kin(&d.th_rad);
            assert!(approx_eq(p[0], d.pos_m[0], 1e-9));
            assert!(approx_eq(p[1], d.pos_m[1], 1e-9));

            let v = kin.jacobian(&d.th_rad) * d.thdot_rads;
            assert!(approx_eq(v[0], d.vel_ms[0], 1e-9));
            assert!(approx_eq(v[1], d.vel_ms[1], 1e-9));
        }

        let end = traj.sample(dur, &kin);
        assert!(end.complete);
        assert!(approx_eq(end.pos_m[0], target[0], 1e-12));
        assert!(approx_eq(end.pos_m[1], target[1], 1e-12));
        assert_eq!(end.vel_ms, Vector2::zeros());
    }

    #[test]
    fn test_hold() {
        let kin = Kinematics::new(&Geometry::default());
        let th = Vector2::new(0.9, 1.4);
        let pos = kin.forward_kin(&th);

        let d = Trajectory::hold(Frame::Joint, th, pos, 3.0).sample(3.0, &kin);
        assert!(d.complete);
        assert_eq!(d.th_rad, th);
        assert_eq!(d.thdot_rads, Vector2::zeros());

        let traj = Trajectory::hold(Frame::Task, th, pos, 3.0);
        assert_eq!(traj.frame(), Frame::Task);
        let d = traj.sample(3.5, &kin);
        assert!(approx_eq(d.th_rad[0], th[0], 1e-9));
        assert!(approx_eq(d.th_rad[1], th[1], 1e-9));
    }
}
