//! Command and kinematic state shared between the control loop and its callers

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use exo_if::{
    ctrl::{ControlMode, ControlParadigm},
    hw::JointId,
};
use log::debug;
use nalgebra::Vector2;
use serde::Serialize;

use crate::{
    params::{Gains, SafetyFlags},
    state_est::{JointState, TaskState},
    traj::Trajectory,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Everything the control loop and the supervisory callers exchange.
///
/// Always accessed through the single lock in [`super::SharedCtrl`], so a command and the
/// trajectory reset that goes with it are seen together by the loop.
#[derive(Debug, Clone, Serialize)]
pub struct CtrlState {
    pub paradigm: ControlParadigm,
    pub mode: ControlMode,

    pub joint: JointState,
    pub task: TaskState,

    pub trajectory: Trajectory,

    /// Set by the first target, the desired state follows `trajectory` from then on.
    pub on_traj: bool,

    /// Joint torque commanded in force mode.
    pub torque_cmd_nm: Vector2<f64>,

    /// End effector force commanded in force mode.
    pub force_cmd_n: Vector2<f64>,

    pub gains: Gains,
    pub safety: SafetyFlags,
    pub locked: [bool; 2],

    /// Incremented by every new target, force or paradigm.
    pub cmd_epoch: u64,

    pub reached: bool,

    /// Latched hardware fault, one line per faulty encoder.
    pub fault: Option<String>,

    /// Time of the latest state sample.
    pub t_s: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Ways an encoder can stop being trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    /// The counter reported a quadrature error.
    Quadrature,

    /// The channel could not be queried or read.
    ReadFailure,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CtrlState {
    pub(crate) fn new(gains: Gains, safety: SafetyFlags) -> Self {
        Self {
            paradigm: ControlParadigm::None,
            mode: ControlMode::Position,
            joint: JointState::default(),
            task: TaskState::default(),
            trajectory: Trajectory::hold(
                ControlParadigm::None.frame(),
                Vector2::zeros(),
                Vector2::zeros(),
                0.0,
            ),
            on_traj: false,
            torque_cmd_nm: Vector2::zeros(),
            force_cmd_n: Vector2::zeros(),
            gains,
            safety,
            locked: [false; 2],
            cmd_epoch: 0,
            reached: false,
            fault: None,
            t_s: 0.0,
        }
    }

    /// Make the desired state the current one and replace the trajectory with a hold.
    ///
    /// If `reset_target` the target is moved to the current state too.
    pub(crate) fn sync_states(&mut self, reset_target: bool) {
        self.joint.des_rad = self.joint.th_rad;
        self.task.des_m = self.task.pos_m;
        self.joint.thdot_des_rads = Vector2::zeros();
        self.task.vel_des_ms = Vector2::zeros();

        self.trajectory = Trajectory::hold(
            self.paradigm.frame(),
            self.joint.th_rad,
            self.task.pos_m,
            self.t_s,
        );

        if reset_target {
            self.joint.targ_rad = self.joint.th_rad;
            self.task.targ_m = self.task.pos_m;
        }
    }

    /// Switch paradigm, holding the current state if it changed.
    pub(crate) fn change_paradigm(&mut self, paradigm: ControlParadigm) -> bool {
        if paradigm == self.paradigm {
            return false;
        }

        debug!("Paradigm {:?} -> {:?}", self.paradigm, paradigm);

        // Set first so the hold trajectory is in the new paradigm's frame
        self.paradigm = paradigm;
        self.sync_states(true);
        self.new_command();

        true
    }

    /// Invalidate any settle in progress.
    pub(crate) fn new_command(&mut self) {
        self.cmd_epoch = self.cmd_epoch.wrapping_add(1);
        self.reached = false;
    }

    /// Record a sensing fault on the given encoder, returning the accumulated message.
    pub(crate) fn latch_fault(&mut self, joint: JointId, fault: SensorFault) -> String {
        let line = format!(
            "   + {} on encoder #{} ({:?})",
            fault.describe(),
            joint.index(),
            joint
        );

        let msg = match self.fault.take() {
            Some(m) => format!("{}\n{}", m, line),
            None => line,
        };

        self.fault = Some(msg.clone());
        msg
    }
}

impl SensorFault {
    fn describe(self) -> &'static str {
        match self {
            SensorFault::Quadrature => "quadrature error",
            SensorFault::ReadFailure => "read failure",
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use exo_if::ctrl::Frame;

    #[test]
    fn test_change_paradigm_syncs() {
        let mut s = CtrlState::new(Gains::default(), SafetyFlags::default());
        s.joint.th_rad = Vector2::new(1.0, 1.5);
        s.joint.targ_rad = Vector2::new(0.2, 0.2);
        s.t_s = 4.0;
        let epoch = s.cmd_epoch;

        assert!(s.change_paradigm(ControlParadigm::Task));
        assert_eq!(s.joint.targ_rad, s.joint.th_rad);
        assert_eq!(s.joint.des_rad, s.joint.th_rad);
        assert_eq!(s.trajectory.frame(), Frame::Task);
        assert_eq!(s.trajectory.t_init_s(), 4.0);
        assert_ne!(s.cmd_epoch, epoch);

        // No change, nothing reset
        s.joint.targ_rad = Vector2::new(0.2, 0.2);
        assert!(!s.change_paradigm(ControlParadigm::Task));
        assert_eq!(s.joint.targ_rad, Vector2::new(0.2, 0.2));
    }

    #[test]
    fn test_latch_fault_accumulates() {
        let mut s = CtrlState::new(Gains::default(), SafetyFlags::default());

        s.latch_fault(JointId::Shoulder, SensorFault::Quadrature);
        let msg = s.latch_fault(JointId::Elbow, SensorFault::ReadFailure);

        assert_eq!(msg.lines().count(), 2);
        assert!(msg.contains("quadrature error on encoder #0"));
        assert!(msg.contains("read failure on encoder #1"));
        assert_eq!(s.fault, Some(msg));
    }
}
