//! # Control vocabulary
//!
//! Paradigms, modes and workspace classifications used when commanding the control core.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::hw::{JointId, NUM_JOINTS};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Which joints, if any, are under active closed-loop control.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlParadigm {
    /// No joint is controlled, zero torque is commanded.
    #[default]
    None,

    /// Only the shoulder is controlled, in joint space.
    Shoulder,

    /// Only the elbow is controlled, in joint space.
    Elbow,

    /// Both joints are controlled in joint space.
    Joint,

    /// Both joints are controlled through the end effector position.
    Task,
}

/// Whether the controller tracks a position or renders a force.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlMode {
    #[default]
    Position,
    Force,
}

/// Coordinate frame a configuration is expressed in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frame {
    /// Shoulder and elbow angles, in radians.
    Joint,

    /// Cartesian end effector position, in meters.
    Task,
}

/// Classification of a configuration against the reachable workspace.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WorkspaceStatus {
    #[default]
    InBounds,

    /// Inside the inner radius of the donut workspace.
    TooClose,

    /// Outside the outer radius of the donut workspace.
    TooFar,

    /// Outside the subject's joint limits.
    SubjectUnreachable,

    /// Outside the rig's linkage limits.
    RobotUnreachable,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ControlParadigm {
    /// Joints actively servoed under this paradigm, indexed by joint.
    pub fn active_joints(self) -> [bool; NUM_JOINTS] {
        match self {
            ControlParadigm::None => [false, false],
            ControlParadigm::Shoulder => [true, false],
            ControlParadigm::Elbow => [false, true],
            ControlParadigm::Joint | ControlParadigm::Task => [true, true],
        }
    }

    pub fn is_active(self, joint: JointId) -> bool {
        self.active_joints()[joint.index()]
    }

    /// The frame targets and trajectories of this paradigm are expressed in.
    pub fn frame(self) -> Frame {
        match self {
            ControlParadigm::Task => Frame::Task,
            _ => Frame::Joint,
        }
    }
}

impl WorkspaceStatus {
    pub fn is_in_bounds(self) -> bool {
        self == WorkspaceStatus::InBounds
    }
}
