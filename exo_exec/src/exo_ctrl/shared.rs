//! Thread safe handle used by supervisory callers to command the control core

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use exo_if::{
    ctrl::{ControlMode, ControlParadigm, Frame, WorkspaceStatus},
    geometry::{Geometry, GeometryProvider},
};
use log::{debug, info, warn};
use nalgebra::Vector2;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use util::maths::{get_ang_dist_2pi, wrap_to_2pi};

use super::CtrlState;
use crate::{
    params::{Gains, RigParams, SafetyFlags},
    state_est::{JointState, TaskState},
    traj::Trajectory,
    workspace::Workspace,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handle to the control core's shared state.
///
/// Cheap to clone, every clone refers to the same core.
#[derive(Clone)]
pub struct SharedCtrl {
    state: Arc<Mutex<CtrlState>>,
    geometry: Arc<dyn GeometryProvider>,
    rig: Arc<RigParams>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SharedCtrl {
    pub(crate) fn new(
        geometry: Arc<dyn GeometryProvider>,
        rig: Arc<RigParams>,
        gains: Gains,
        safety: SafetyFlags,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(CtrlState::new(gains, safety))),
            geometry,
            rig,
        }
    }

    /// Lock the shared state.
    ///
    /// The state is plain data which is valid at every point a writer could panic, so a poisoned
    /// lock is recovered.
    pub(crate) fn lock(&self) -> MutexGuard<'_, CtrlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current snapshot of the subject's geometry.
    pub fn geometry(&self) -> Geometry {
        self.geometry.snapshot()
    }

    /// The workspace for the current geometry.
    pub fn workspace(&self) -> Workspace {
        Workspace::new(&self.geometry(), &self.rig)
    }

    // ---- COMMANDS ----

    pub fn set_mode(&self, mode: ControlMode) {
        let mut state = self.lock();

        if state.mode != mode {
            debug!("Mode {:?} -> {:?}", state.mode, mode);
            state.mode = mode;
        }
    }

    /// Switch the control paradigm.
    ///
    /// On a change the desired state and target are reset to the current state, so the next
    /// cycle holds position instead of carrying over errors from the old paradigm.
    pub fn set_paradigm(&self, paradigm: ControlParadigm) {
        self.lock().change_paradigm(paradigm);
    }

    /// Move to a new target under the given paradigm.
    ///
    /// The target is in the paradigm's frame: end effector position for `Task`, joint angles
    /// otherwise. A trajectory from the current state is started immediately. The returned
    /// status is the target's workspace classification, targets outside the workspace are
    /// stored but the controller will refuse to drive towards them.
    pub fn set_target(&self, target: Vector2<f64>, paradigm: ControlParadigm) -> WorkspaceStatus {
        let ws = self.workspace();
        let frame = paradigm.frame();

        {
            let mut state = self.lock();
            state.mode = ControlMode::Position;
            state.change_paradigm(paradigm);

            match frame {
                Frame::Task => {
                    state.task.targ_m = target;
                    state.joint.targ_rad = ws.kin.inverse_kin(&target).map(wrap_to_2pi);
                    state.trajectory = Trajectory::task(
                        state.task.pos_m,
                        target,
                        self.rig.max_task_speed_ms,
                        state.t_s,
                    );
                }
                Frame::Joint => {
                    let targ_rad = target.map(wrap_to_2pi);
                    let th_rad = state.joint.th_rad;
                    let delta_rad = Vector2::new(
                        get_ang_dist_2pi(th_rad[0], targ_rad[0]),
                        get_ang_dist_2pi(th_rad[1], targ_rad[1]),
                    );

                    state.joint.targ_rad = targ_rad;
                    state.task.targ_m = ws.kin.forward_kin(&targ_rad);
                    state.trajectory = Trajectory::joint(
                        th_rad,
                        delta_rad,
                        self.rig.max_joint_speed_rads,
                        state.t_s,
                    );
                }
            }

            state.on_traj = true;
            state.new_command();
        }

        let status = ws.check(&target, frame);
        if status.is_in_bounds() {
            debug!("New {:?} target {:?}", paradigm, target);
        } else {
            warn!("{:?} target {:?} is not reachable: {:?}", paradigm, target, status);
        }

        status
    }

    /// Render a force under the given paradigm.
    ///
    /// For `Task` the value is an end effector force, otherwise joint torques. The equivalent
    /// in the other frame is derived through the Jacobian at the current configuration.
    pub fn set_force(&self, force: Vector2<f64>, paradigm: ControlParadigm) {
        let ws = self.workspace();
        let mut state = self.lock();

        state.mode = ControlMode::Force;
        state.change_paradigm(paradigm);

        let jt = ws.kin.jacobian(&state.joint.th_rad).transpose();

        match paradigm.frame() {
            Frame::Task => {
                state.force_cmd_n = force;
                state.torque_cmd_nm = jt * force;
            }
            Frame::Joint => {
                state.torque_cmd_nm = force;
                if let Some(jt_inv) = jt.try_inverse() {
                    state.force_cmd_n = jt_inv * force;
                }
            }
        }

        state.new_command();

        debug!("New {:?} force {:?}", paradigm, force);
    }

    pub fn set_gains(&self, gains: Gains) {
        self.lock().gains = gains;
        info!("Gains updated: {:?}", gains);
    }

    pub fn gains(&self) -> Gains {
        self.lock().gains
    }

    pub fn set_safety_flags(&self, flags: SafetyFlags) {
        self.lock().safety = flags;
        info!("Safety flags updated: {:?}", flags);
    }

    pub fn safety_flags(&self) -> SafetyFlags {
        self.lock().safety
    }

    /// Lock joints, which are then never driven by the motors.
    pub fn set_locked_joints(&self, locked: [bool; 2]) {
        self.lock().locked = locked;
        info!("Locked joints: {:?}", locked);
    }

    pub fn locked_joints(&self) -> [bool; 2] {
        self.lock().locked
    }

    // ---- QUERIES ----

    /// Returns `true` once the arm has settled on the current target.
    pub fn reached_target(&self) -> bool {
        self.lock().reached
    }

    /// The latched hardware fault message, if any.
    pub fn fault(&self) -> Option<String> {
        self.lock().fault.clone()
    }

    pub fn is_faulted(&self) -> bool {
        self.lock().fault.is_some()
    }

    pub(crate) fn clear_fault(&self) {
        self.lock().fault = None;
    }

    pub fn paradigm(&self) -> ControlParadigm {
        self.lock().paradigm
    }

    pub fn mode(&self) -> ControlMode {
        self.lock().mode
    }

    pub fn joint_state(&self) -> JointState {
        self.lock().joint
    }

    pub fn task_state(&self) -> TaskState {
        self.lock().task
    }

    /// A copy of the whole shared state.
    pub fn snapshot(&self) -> CtrlState {
        self.lock().clone()
    }

    /// Classify a configuration against the current workspace.
    pub fn check_workspace(&self, config: &Vector2<f64>, frame: Frame) -> WorkspaceStatus {
        self.workspace().check(config, frame)
    }

    /// Project a task space point radially into the donut workspace.
    pub fn find_nearest_reachable(&self, pos_m: &Vector2<f64>) -> Vector2<f64> {
        self.workspace().find_nearest_reachable(pos_m)
    }
}
