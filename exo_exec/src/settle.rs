//! # Settle detection
//!
//! A target only counts as reached after the arm has been at rest on it for a number of
//! consecutive control cycles.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use exo_if::ctrl::ControlParadigm;
use util::maths::get_ang_dist_2pi;

use crate::{
    params::RigParams,
    state_est::{JointState, TaskState},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Debounced settle detector.
#[derive(Debug, Clone)]
pub struct SettleDetector {
    required: u32,
    count: u32,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SettleDetector {
    pub fn new(required: u32) -> Self {
        Self { required, count: 0 }
    }

    /// Feed one sample, returning `true` once `required` consecutive samples have been in
    /// tolerance.
    pub fn update(&mut self, in_tolerance: bool) -> bool {
        if in_tolerance {
            self.count = self.count.saturating_add(1);
        } else {
            self.count = 0;
        }

        self.is_settled()
    }

    pub fn is_settled(&self) -> bool {
        self.count >= self.required
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

/// Returns `true` if the arm is on its target and at rest for the given paradigm.
///
/// Nothing can settle without a controlled joint.
pub fn in_tolerance(
    paradigm: ControlParadigm,
    joint: &JointState,
    task: &TaskState,
    rig: &RigParams,
) -> bool {
    let jnt_thresh = rig.settle_joint_thresh_rad;
    let jnt_err = |i: usize| get_ang_dist_2pi(joint.th_rad[i], joint.targ_rad[i]);

    match paradigm {
        ControlParadigm::None => false,
        ControlParadigm::Shoulder | ControlParadigm::Elbow => {
            let i = if paradigm == ControlParadigm::Shoulder { 0 } else { 1 };

            jnt_err(i).abs() <= jnt_thresh && joint.thdot_rads.norm() <= jnt_thresh
        }
        ControlParadigm::Joint => {
            let err = (jnt_err(0).powi(2) + jnt_err(1).powi(2)).sqrt();

            err <= jnt_thresh && joint.thdot_rads.norm() <= jnt_thresh
        }
        ControlParadigm::Task => {
            let thresh = rig.settle_task_thresh_m;

            (task.targ_m - task.pos_m).norm() <= thresh && task.vel_ms.norm() <= thresh
        }
    }
}
