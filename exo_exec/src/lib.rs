//! # Exoskeleton library.
//!
//! The real-time control core of the 2-DOF upper-limb exoskeleton, plus the pieces needed to run
//! it: a control loop runner, a simulated rig and a motion script interpreter.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Safety and actuation layer - composes, converts and saturates the final motor torques
pub mod actuation;

/// Control loop - runs the control core on its own thread
pub mod control_loop;

/// Exoskeleton control - the control core and its shared command state
pub mod exo_ctrl;

/// Kinematics - forward/inverse kinematics and the linkage offset corrections
pub mod kinematics;

/// Parameters of the rig, default gains and safety switches
pub mod params;

/// Motion scripts - sequences of commands for the supervisory executable
pub mod script;

/// Settle detection - debounced "reached target" flag
pub mod settle;

/// Simulated rig implementing the hardware port
pub mod sim_hw;

/// State estimation - filtered velocities and clamped integral errors
pub mod state_est;

/// Telemetry snapshots
pub mod telemetry;

/// Trajectory generation - quintic minimum-jerk moves
pub mod traj;

/// Workspace validation
pub mod workspace;

// ------------------------------------------------------------------------------------------------
// TEST UTILITIES
// ------------------------------------------------------------------------------------------------

/// Returns `true` if `a` and `b` are within `tol` of each other.
#[cfg(test)]
pub(crate) fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}
