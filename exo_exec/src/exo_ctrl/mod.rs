//! Exoskeleton control module
//!
//! [`ExoCtrl`] owns the hardware port and runs the per-cycle pipeline: `sample_state` reads the
//! encoders and updates the kinematic state, `issue_command` runs the controller and the safety
//! layer and commands the motors. Supervisory callers command the core through a
//! [`SharedCtrl`] handle, which can be used from any thread.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod shared;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use exo_if::{
    ctrl::{ControlMode, ControlParadigm, Frame, WorkspaceStatus},
    geometry::GeometryProvider,
    hw::{HardwarePort, HwError, JointId},
};
use log::{debug, error, info, trace, warn};
use nalgebra::Vector2;
use serde::Serialize;
use std::f64::consts::TAU;
use std::sync::Arc;
use util::{
    maths::{get_ang_dist_2pi, wrap_to_2pi},
    time::Clock,
};

// Internal
pub use shared::*;
pub use state::*;

use crate::{
    actuation::{self, Actuation, ActuationConfig, ActuationInput},
    params::{ExoParams, RigParams},
    settle::{self, SettleDetector},
    state_est::StateEstimator,
    telemetry::Telemetry,
    workspace::Workspace,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The exoskeleton control core.
pub struct ExoCtrl<H: HardwarePort> {
    hw: H,
    shared: SharedCtrl,
    rig: Arc<RigParams>,
    clock: Arc<dyn Clock>,

    connected: bool,
    calibrated: bool,

    /// Encoder counts with the linkage held at its limits.
    zero_counts: [i64; 2],

    /// Linkage angles at the calibration position.
    link_nom_rad: Vector2<f64>,

    /// Latest linkage angles.
    link_rad: Vector2<f64>,

    estimator: StateEstimator,
    settle: SettleDetector,
    settle_epoch: u64,

    last_status: WorkspaceStatus,
    telemetry: Telemetry,
}

/// Summary of one issued command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CommandReport {
    pub paradigm: ControlParadigm,
    pub mode: ControlMode,
    pub active: [bool; 2],
    pub actuation: Actuation,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during ExoCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum ExoCtrlError {
    #[error("Hardware port error: {0}")]
    Hw(#[from] HwError),

    #[error("A hardware fault is latched, reconnect to clear it:\n{0}")]
    HardwareFault(String),

    #[error("The target is outside the workspace: {0:?}")]
    WorkspaceViolation(WorkspaceStatus),

    #[error("The exoskeleton is not connected")]
    NotConnected,

    #[error("The exoskeleton has not been calibrated")]
    NotCalibrated,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<H: HardwarePort> ExoCtrl<H> {
    /// Create a new control core bound to the given hardware and subject geometry.
    ///
    /// The core starts disconnected, in the `None` paradigm.
    pub fn new(
        hw: H,
        geometry: Arc<dyn GeometryProvider>,
        params: &ExoParams,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rig = Arc::new(params.rig.clone());

        Self {
            hw,
            shared: SharedCtrl::new(geometry, rig.clone(), params.gains, params.safety),
            clock,
            connected: false,
            calibrated: false,
            zero_counts: [0; 2],
            link_nom_rad: Vector2::zeros(),
            link_rad: Vector2::zeros(),
            estimator: StateEstimator::new(rig.vel_filter_weight, rig.integral_clamp),
            settle: SettleDetector::new(rig.settle_count),
            settle_epoch: 0,
            last_status: WorkspaceStatus::InBounds,
            telemetry: Telemetry::default(),
            rig,
        }
    }

    /// A handle for commanding this core from other threads.
    pub fn shared(&self) -> SharedCtrl {
        self.shared.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Telemetry from the latest command.
    pub fn telemetry(&self) -> Telemetry {
        self.telemetry
    }

    // ---- LIFECYCLE ----

    /// Connect to the hardware and initialise every encoder and motor.
    ///
    /// A fresh connection clears any latched hardware fault. On failure the hardware is left
    /// disconnected and the caller must not continue with startup.
    pub fn connect(&mut self) -> Result<(), ExoCtrlError> {
        info!("Connecting to the exoskeleton");

        self.hw.connect()?;

        if let Err(e) = self.init_channels() {
            error!("Channel initialisation failed: {}", e);
            if let Err(e) = self.hw.disconnect() {
                warn!("Could not disconnect after failed initialisation: {}", e);
            }
            return Err(e.into());
        }

        self.connected = true;
        self.shared.clear_fault();

        info!("Exoskeleton connected");

        Ok(())
    }

    fn init_channels(&mut self) -> Result<(), HwError> {
        for joint in JointId::ALL {
            self.hw.init_encoder(joint)?;
        }
        for joint in JointId::ALL {
            self.hw.init_motor(joint)?;
        }

        Ok(())
    }

    /// Command zero torque and disconnect from the hardware.
    pub fn disconnect(&mut self) -> Result<(), ExoCtrlError> {
        if !self.connected {
            return Ok(());
        }

        let zeroed = self.zero_torque();
        self.hw.disconnect()?;
        self.connected = false;

        info!("Exoskeleton disconnected");

        zeroed.map_err(ExoCtrlError::from)
    }

    /// Record the sensor zero points.
    ///
    /// The operator must hold the shoulder and elbow linkages against their limits, `confirm`
    /// blocks until they have done so. Zero torque is commanded throughout.
    pub fn calibrate<F: FnOnce()>(&mut self, confirm: F) -> Result<(), ExoCtrlError> {
        if !self.connected {
            return Err(ExoCtrlError::NotConnected);
        }

        self.zero_torque()?;

        info!("Calibrating, move the shoulder and elbow linkages to their limits");
        confirm();

        for joint in JointId::ALL {
            self.zero_counts[joint.index()] = self.hw.read_counts(joint)?;
        }

        let right_handed = self.shared.geometry().right_handed;
        self.link_nom_rad = Vector2::from(self.rig.link_limits_rad(right_handed));
        self.calibrated = true;
        self.estimator.reset();

        // Start holding wherever the linkage is
        self.sample_state()?;
        self.shared.lock().sync_states(true);

        info!("Calibration complete, zero counts: {:?}", self.zero_counts);

        Ok(())
    }

    // ---- CONTROL CYCLE ----

    /// Read the sensors and update the kinematic state.
    ///
    /// If an encoder reports a quadrature error, or cannot be queried or read, the fault is
    /// latched, the motors are zeroed and the state is frozen at its last value until the next
    /// connection.
    pub fn sample_state(&mut self) -> Result<(), ExoCtrlError> {
        self.check_ready()?;

        if let Some(msg) = self.shared.fault() {
            return Err(ExoCtrlError::HardwareFault(msg));
        }

        let t_s = self.clock.now_s();
        let geometry = self.shared.geometry();
        let ws = Workspace::new(&geometry, &self.rig);

        // ---- SENSING ----

        let mut faults = Vec::new();
        for joint in JointId::ALL {
            match self.hw.encoder_ok(joint) {
                Ok(true) => (),
                Ok(false) => faults.push((joint, SensorFault::Quadrature)),
                Err(e) => {
                    error!("Could not query the {:?} encoder: {}", joint, e);
                    faults.push((joint, SensorFault::ReadFailure));
                }
            }
        }

        let mut counts = [0i64; 2];
        if faults.is_empty() {
            for joint in JointId::ALL {
                match self.hw.read_counts(joint) {
                    Ok(c) => counts[joint.index()] = c,
                    Err(e) => {
                        error!("Could not read the {:?} encoder: {}", joint, e);
                        faults.push((joint, SensorFault::ReadFailure));
                    }
                }
            }
        }

        if !faults.is_empty() {
            let mut state = self.shared.lock();
            let mut msg = String::new();
            for (joint, fault) in faults {
                msg = state.latch_fault(joint, fault);
            }
            drop(state);

            // The arm can no longer be seen, stop driving it. Failures are logged by zero_torque
            self.zero_torque().ok();

            error!("Hardware fault, holding last known state:\n{}", msg);
            return Err(ExoCtrlError::HardwareFault(msg));
        }

        // ---- KINEMATICS ----

        let sign = if geometry.right_handed { 1.0 } else { -1.0 };
        for i in 0..2 {
            let motor_rad =
                TAU * (counts[i] - self.zero_counts[i]) as f64 / self.rig.counts_per_rev;
            self.link_rad[i] = sign * motor_rad / self.rig.gear_ratio[i] + self.link_nom_rad[i];
        }

        let th_rad = ws.linkage.link_to_joint(&self.link_rad).map(wrap_to_2pi);
        let pos_m = ws.kin.forward_kin(&th_rad);

        // ---- ESTIMATION ----

        let mut state = self.shared.lock();
        state.t_s = t_s;
        state.joint.th_rad = th_rad;
        state.task.pos_m = pos_m;

        if state.cmd_epoch != self.settle_epoch {
            self.settle.reset();
            self.settle_epoch = state.cmd_epoch;
        }

        let traj_valid = state.on_traj
            && state.trajectory.frame() == state.paradigm.frame()
            && ws.check(&state.joint.targ_rad, Frame::Joint).is_in_bounds();

        if traj_valid {
            let des = state.trajectory.sample(t_s, &ws.kin);
            state.joint.des_rad = des.th_rad;
            state.joint.thdot_des_rads = des.thdot_rads;
            state.task.des_m = des.pos_m;
            state.task.vel_des_ms = des.vel_ms;
        } else {
            state.sync_states(false);
            self.estimator.reset_integrals();
        }

        let des_rad = state.joint.des_rad;
        state.joint.err_rad = Vector2::new(
            get_ang_dist_2pi(th_rad[0], des_rad[0]),
            get_ang_dist_2pi(th_rad[1], des_rad[1]),
        );
        state.task.err_m = state.task.des_m - pos_m;

        let est = self
            .estimator
            .update(t_s, &th_rad, &state.joint.err_rad, &state.task.err_m);

        state.joint.thdot_rads = est.thdot_rads;
        state.joint.thdot_err_rads = state.joint.thdot_des_rads - est.thdot_rads;
        state.joint.err_int = est.joint_err_int;

        state.task.vel_ms = ws.kin.jacobian(&th_rad) * est.thdot_rads;
        state.task.vel_err_ms = state.task.vel_des_ms - state.task.vel_ms;
        state.task.err_int = est.task_err_int;

        // ---- SETTLING ----

        let in_tol = settle::in_tolerance(state.paradigm, &state.joint, &state.task, &self.rig);
        state.reached = self.settle.update(in_tol);

        trace!(
            "t = {:.4} s, th = {:?} rad, pos = {:?} m",
            t_s,
            th_rad.as_slice(),
            pos_m.as_slice()
        );

        Ok(())
    }

    /// Run the controller and safety layer once and command the motors.
    ///
    /// Paradigm and mode are read under the lock at the start of every call, so a change from
    /// another thread applies on the next command. A target outside the workspace disables
    /// control for this cycle and returns `WorkspaceViolation`.
    pub fn issue_command(&mut self) -> Result<CommandReport, ExoCtrlError> {
        self.check_ready()?;

        let s = self.shared.snapshot();

        if let Some(msg) = s.fault.clone() {
            self.zero_torque()?;
            self.publish(&s, &Actuation::default(), self.last_status);
            return Err(ExoCtrlError::HardwareFault(msg));
        }

        let geometry = self.shared.geometry();
        let ws = Workspace::new(&geometry, &self.rig);
        let active = s.paradigm.active_joints();

        // ---- CONTROLLER ----

        let mut force_n = s.force_cmd_n;

        let torque_nm = match (s.paradigm, s.mode) {
            (ControlParadigm::None, _) => {
                self.zero_torque()?;
                self.publish(&s, &Actuation::default(), WorkspaceStatus::InBounds);
                return Ok(CommandReport {
                    paradigm: s.paradigm,
                    mode: s.mode,
                    active,
                    actuation: Actuation::default(),
                });
            }
            (ControlParadigm::Task, ControlMode::Position) => {
                let status = ws.check(&s.task.targ_m, Frame::Task);
                if !status.is_in_bounds() {
                    return self.reject(&s, status);
                }

                let g = &s.gains;
                let f = Vector2::from(g.kp_task).component_mul(&s.task.err_m)
                    + Vector2::from(g.kd_task).component_mul(&s.task.vel_err_ms)
                    + Vector2::from(g.ki_task).component_mul(&s.task.err_int);

                force_n = f;
                ws.kin.jacobian(&s.joint.th_rad).transpose() * f
            }
            (ControlParadigm::Task, ControlMode::Force) => {
                ws.kin.jacobian(&s.joint.th_rad).transpose() * s.force_cmd_n
            }
            (_, ControlMode::Position) => {
                let status = ws.check(&s.joint.targ_rad, Frame::Joint);
                if !status.is_in_bounds() {
                    return self.reject(&s, status);
                }

                let g = &s.gains;
                Vector2::from(g.kp_joint).component_mul(&s.joint.err_rad)
                    + Vector2::from(g.kd_joint).component_mul(&s.joint.thdot_err_rads)
                    + Vector2::from(g.ki_joint).component_mul(&s.joint.err_int)
            }
            (_, ControlMode::Force) => s.torque_cmd_nm,
        };

        if self.last_status != WorkspaceStatus::InBounds {
            info!("Target back within the workspace, control resumed");
        }

        // ---- SAFETY AND ACTUATION ----

        let act = actuation::compose(
            &ActuationInput {
                torque_nm,
                active,
                locked: s.locked,
                th_rad: s.joint.th_rad,
                link_rad: self.link_rad,
                thdot_rads: s.joint.thdot_rads,
                t_s: s.t_s,
            },
            &ActuationConfig {
                rig: &self.rig,
                gains: &s.gains,
                safety: &s.safety,
                link_limits_rad: self.rig.link_limits_rad(geometry.right_handed),
                right_handed: geometry.right_handed,
            },
        );

        for joint in JointId::ALL {
            if let Some(t) = act.issued_nm[joint.index()] {
                self.hw.set_torque(joint, t)?;
            }
        }

        // End effector force equivalent to the joint torques
        if s.paradigm.frame() == Frame::Joint {
            force_n = ws
                .kin
                .jacobian(&s.joint.th_rad)
                .transpose()
                .try_inverse()
                .map(|jt_inv| jt_inv * torque_nm)
                .unwrap_or_else(Vector2::zeros);
        }

        let mut s = s;
        s.force_cmd_n = force_n;
        self.publish(&s, &act, WorkspaceStatus::InBounds);

        Ok(CommandReport {
            paradigm: s.paradigm,
            mode: s.mode,
            active,
            actuation: act,
        })
    }

    /// Sample the state then issue a command.
    pub fn step(&mut self) -> Result<CommandReport, ExoCtrlError> {
        self.sample_state()?;
        self.issue_command()
    }

    /// Command zero torque to every motor, bypassing the safety layer.
    pub fn disable(&mut self) -> Result<(), ExoCtrlError> {
        if !self.connected {
            return Err(ExoCtrlError::NotConnected);
        }

        self.zero_torque().map_err(ExoCtrlError::from)
    }

    // ---- PRIVATE ----

    fn check_ready(&self) -> Result<(), ExoCtrlError> {
        if !self.connected {
            return Err(ExoCtrlError::NotConnected);
        }
        if !self.calibrated {
            return Err(ExoCtrlError::NotCalibrated);
        }

        Ok(())
    }

    /// Zero every motor, attempting all of them even if one fails.
    fn zero_torque(&mut self) -> Result<(), HwError> {
        let mut result = Ok(());

        for joint in JointId::ALL {
            if let Err(e) = self.hw.set_torque(joint, 0.0) {
                error!("Could not zero the {:?} motor: {}", joint, e);
                result = Err(e);
            }
        }

        result
    }

    fn reject(
        &mut self,
        s: &CtrlState,
        status: WorkspaceStatus,
    ) -> Result<CommandReport, ExoCtrlError> {
        self.zero_torque()?;

        if status != self.last_status {
            warn!(
                "{:?} target is outside the workspace ({:?}), control disabled",
                s.paradigm, status
            );
        }

        self.publish(s, &Actuation::default(), status);

        Err(ExoCtrlError::WorkspaceViolation(status))
    }

    fn publish(&mut self, s: &CtrlState, act: &Actuation, status: WorkspaceStatus) {
        if status != self.last_status {
            debug!("Workspace status {:?} -> {:?}", self.last_status, status);
        }
        self.last_status = status;

        let arr = |v: &Vector2<f64>| [v[0], v[1]];

        self.telemetry = Telemetry {
            t_s: s.t_s,
            paradigm: s.paradigm,
            mode: s.mode,
            active: s.paradigm.active_joints(),
            locked: s.locked,
            th_rad: arr(&s.joint.th_rad),
            thdot_rads: arr(&s.joint.thdot_rads),
            targ_rad: arr(&s.joint.targ_rad),
            pos_m: arr(&s.task.pos_m),
            vel_ms: arr(&s.task.vel_ms),
            targ_m: arr(&s.task.targ_m),
            robot_torque_nm: act.robot_torque_nm,
            motor_torque_nm: act.motor_torque_nm,
            force_n: arr(&s.force_cmd_n),
            status,
            reached: s.reached,
            faulted: s.fault.is_some(),
        };
    }
}

impl<H: HardwarePort> Drop for ExoCtrl<H> {
    fn drop(&mut self) {
        if self.connected {
            if let Err(e) = self.disconnect() {
                error!("Error disconnecting the exoskeleton: {}", e);
            }
        }
    }
}
