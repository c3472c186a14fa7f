//! # Simulated rig
//!
//! A [`HardwarePort`] implementation backed by a simple model of the rig: each channel is a geared
//! motor driving one joint, modelled as an inertia with viscous damping. The joints are treated as
//! independent, the model is there to close the loop for development and tests, not to reproduce
//! the arm's dynamics.
//!
//! The forearm linkage turns with the upper arm, so the elbow encoder reads the sum of both joints'
//! displacements.
//!
//! The plant is advanced to the clock's current time whenever the port is accessed, so the
//! simulation runs equally well against a [`util::time::SystemClock`] or a test clock.
//!
//! Faults can be injected through a [`SimHandle`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use exo_if::hw::{HardwarePort, HwError, JointId, NUM_JOINTS};
use log::{debug, info};
use serde::Deserialize;
use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use util::time::Clock;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the simulated rig.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Motor to link gear ratio.
    pub gear_ratio: [f64; NUM_JOINTS],

    /// Encoder counts per motor revolution.
    pub counts_per_rev: f64,

    /// Units: kg m^2
    pub joint_inertia_kgm2: [f64; NUM_JOINTS],

    /// Units: Nm s/rad
    pub joint_damping_nms: [f64; NUM_JOINTS],

    /// Time taken by every port access, emulating the interface card's bus.
    ///
    /// Units: microseconds
    pub io_latency_us: u64,

    /// Largest integration step.
    ///
    /// Units: seconds
    pub max_step_s: f64,
}

/// The simulated rig.
pub struct SimHardware {
    plant: Arc<Mutex<SimPlant>>,
    params: SimParams,
    clock: Arc<dyn Clock>,
}

/// Handle to a [`SimHardware`]'s plant, used to observe it and inject faults.
#[derive(Clone)]
pub struct SimHandle {
    plant: Arc<Mutex<SimPlant>>,
}

#[derive(Debug, Default)]
struct SimPlant {
    connected: bool,
    fail_next_connect: bool,

    channels: [SimChannel; NUM_JOINTS],

    t_s: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct SimChannel {
    /// Joint displacement since power on, in the motor's sign convention.
    joint_rad: f64,
    joint_rads: f64,

    torque_nm: f64,

    encoder_init: bool,
    motor_init: bool,

    quadrature_error: bool,
    fail_encoder_init: bool,
    fail_motor_init: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            gear_ratio: [16.98, 16.59],
            counts_per_rev: 2000.0,
            joint_inertia_kgm2: [0.1, 0.05],
            joint_damping_nms: [0.1, 0.1],
            io_latency_us: 0,
            max_step_s: 0.001,
        }
    }
}

impl SimHardware {
    pub fn new(params: SimParams, clock: Arc<dyn Clock>) -> Self {
        Self {
            plant: Arc::new(Mutex::new(SimPlant::default())),
            params,
            clock,
        }
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            plant: self.plant.clone(),
        }
    }

    /// Advance the plant to now and lock it, after the emulated bus latency.
    fn access(&self) -> MutexGuard<'_, SimPlant> {
        if self.params.io_latency_us > 0 {
            thread::sleep(Duration::from_micros(self.params.io_latency_us));
        }

        let mut plant = lock(&self.plant);
        plant.advance(self.clock.now_s(), &self.params);
        plant
    }

    fn connected(&self) -> Result<MutexGuard<'_, SimPlant>, HwError> {
        let plant = self.access();

        if plant.connected {
            Ok(plant)
        } else {
            Err(HwError::NotConnected)
        }
    }
}

impl HardwarePort for SimHardware {
    fn connect(&mut self) -> Result<(), HwError> {
        let mut plant = self.access();

        if plant.fail_next_connect {
            plant.fail_next_connect = false;
            return Err(HwError::ConnectFailed("simulated connection failure".into()));
        }

        plant.connected = true;
        info!("Simulated rig connected");

        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), HwError> {
        let mut plant = self.access();

        plant.connected = false;
        for ch in plant.channels.iter_mut() {
            ch.torque_nm = 0.0;
            ch.encoder_init = false;
            ch.motor_init = false;
        }

        info!("Simulated rig disconnected");

        Ok(())
    }

    fn init_encoder(&mut self, joint: JointId) -> Result<(), HwError> {
        let mut plant = self.connected()?;
        let ch = &mut plant.channels[joint.index()];

        if ch.fail_encoder_init {
            return Err(HwError::EncoderInitFailed(joint, "simulated failure".into()));
        }

        ch.encoder_init = true;
        Ok(())
    }

    fn init_motor(&mut self, joint: JointId) -> Result<(), HwError> {
        let mut plant = self.connected()?;
        let ch = &mut plant.channels[joint.index()];

        if ch.fail_motor_init {
            return Err(HwError::MotorInitFailed(joint, "simulated failure".into()));
        }

        ch.motor_init = true;
        ch.torque_nm = 0.0;
        Ok(())
    }

    fn encoder_ok(&mut self, joint: JointId) -> Result<bool, HwError> {
        let plant = self.connected()?;

        Ok(!plant.channels[joint.index()].quadrature_error)
    }

    fn read_counts(&mut self, joint: JointId) -> Result<i64, HwError> {
        let plant = self.connected()?;
        let i = joint.index();

        if !plant.channels[i].encoder_init {
            return Err(HwError::Io(joint, "encoder not initialised".into()));
        }

        let counts = plant.link_rad(joint) * self.params.gear_ratio[i] * self.params.counts_per_rev
            / TAU;

        Ok(counts.round() as i64)
    }

    fn set_torque(&mut self, joint: JointId, torque_nm: f64) -> Result<(), HwError> {
        let mut plant = self.connected()?;
        let ch = &mut plant.channels[joint.index()];

        if !ch.motor_init {
            return Err(HwError::Io(joint, "motor not initialised".into()));
        }

        ch.torque_nm = torque_nm;
        Ok(())
    }
}

impl SimPlant {
    /// Displacement of the linkage the joint's encoder is mounted on.
    fn link_rad(&self, joint: JointId) -> f64 {
        match joint {
            JointId::Shoulder => self.channels[0].joint_rad,
            JointId::Elbow => self.channels[0].joint_rad + self.channels[1].joint_rad,
        }
    }

    /// Integrate the plant up to `t_s` with semi-implicit Euler steps.
    fn advance(&mut self, t_s: f64, params: &SimParams) {
        let t_prev = match self.t_s.replace(t_s) {
            Some(t) => t,
            None => return,
        };

        let dt_s = t_s - t_prev;
        if dt_s <= 0.0 {
            if dt_s < 0.0 {
                debug!("Simulation clock went backwards by {} s", -dt_s);
                self.t_s = Some(t_prev);
            }
            return;
        }

        let num_steps = (dt_s / params.max_step_s).ceil().max(1.0);
        let h = dt_s / num_steps;
        let powered = self.connected;

        for _ in 0..(num_steps as u64) {
            for (i, ch) in self.channels.iter_mut().enumerate() {
                let drive = if powered && ch.motor_init {
                    ch.torque_nm * params.gear_ratio[i]
                } else {
                    0.0
                };

                let accel = (drive - params.joint_damping_nms[i] * ch.joint_rads)
                    / params.joint_inertia_kgm2[i];

                ch.joint_rads += accel * h;
                ch.joint_rad += ch.joint_rads * h;
            }
        }
    }
}

impl SimHandle {
    /// Make the encoder report a quadrature error until cleared.
    pub fn inject_encoder_fault(&self, joint: JointId) {
        lock(&self.plant).channels[joint.index()].quadrature_error = true;
    }

    pub fn clear_encoder_faults(&self) {
        for ch in lock(&self.plant).channels.iter_mut() {
            ch.quadrature_error = false;
        }
    }

    pub fn fail_next_connect(&self) {
        lock(&self.plant).fail_next_connect = true;
    }

    pub fn fail_encoder_init(&self, joint: JointId) {
        lock(&self.plant).channels[joint.index()].fail_encoder_init = true;
    }

    pub fn fail_motor_init(&self, joint: JointId) {
        lock(&self.plant).channels[joint.index()].fail_motor_init = true;
    }

    /// Last torque commanded on the channel, zero while unpowered.
    pub fn commanded_torque(&self, joint: JointId) -> f64 {
        lock(&self.plant).channels[joint.index()].torque_nm
    }

    /// Joint displacement since power on, in the motor's sign convention.
    pub fn joint_angle(&self, joint: JointId) -> f64 {
        lock(&self.plant).channels[joint.index()].joint_rad
    }

    /// Move a joint, as if the operator pushed it, and stop it there.
    pub fn set_joint_angle(&self, joint: JointId, joint_rad: f64) {
        let mut plant = lock(&self.plant);
        let ch = &mut plant.channels[joint.index()];
        ch.joint_rad = joint_rad;
        ch.joint_rads = 0.0;
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.plant).connected
    }
}

fn lock(plant: &Mutex<SimPlant>) -> MutexGuard<'_, SimPlant> {
    plant.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod test {
    use super::*;
    use util::time::ManualClock;

    fn connected_sim() -> (SimHardware, SimHandle, ManualClock) {
        let clock = ManualClock::new(0.0);
        let mut sim = SimHardware::new(SimParams::default(), Arc::new(clock.clone()));
        let handle = sim.handle();

        sim.connect().unwrap();
        for j in JointId::ALL {
            sim.init_encoder(j).unwrap();
            sim.init_motor(j).unwrap();
        }

        (sim, handle, clock)
    }

    #[test]
    fn test_requires_connection() {
        let clock = ManualClock::new(0.0);
        let mut sim = SimHardware::new(SimParams::default(), Arc::new(clock));

        assert_eq!(sim.read_counts(JointId::Shoulder), Err(HwError::NotConnected));
        assert_eq!(sim.set_torque(JointId::Elbow, 1.0), Err(HwError::NotConnected));

        sim.handle().fail_next_connect();
        assert!(matches!(sim.connect(), Err(HwError::ConnectFailed(_))));
        assert!(sim.connect().is_ok());

        // Channels must be initialised before use
        assert!(matches!(sim.read_counts(JointId::Shoulder), Err(HwError::Io(..))));
    }

    #[test]
    fn test_constant_torque_accelerates() {
        let (mut sim, handle, clock) = connected_sim();
        let params = SimParams::default();

        sim.set_torque(JointId::Shoulder, 0.01).unwrap();
        sim.read_counts(JointId::Shoulder).unwrap();

        // Over a short interval damping is small, angle ~ a t^2 / 2
        clock.advance(0.1);
        let counts = sim.read_counts(JointId::Shoulder).unwrap();

        let accel = 0.01 * params.gear_ratio[0] / params.joint_inertia_kgm2[0];
        let expected = 0.5 * accel * 0.1 * 0.1;
        let angle = handle.joint_angle(JointId::Shoulder);
        assert!((angle - expected).abs() / expected < 0.05);

        let expected_counts = angle * params.gear_ratio[0] * params.counts_per_rev / TAU;
        assert_eq!(counts, expected_counts.round() as i64);

        // The elbow joint had no torque but its linkage is carried by the upper arm
        assert_eq!(handle.joint_angle(JointId::Elbow), 0.0);
        let elbow_counts = sim.read_counts(JointId::Elbow).unwrap();
        let expected_counts = angle * params.gear_ratio[1] * params.counts_per_rev / TAU;
        assert_eq!(elbow_counts, expected_counts.round() as i64);
    }

    #[test]
    fn test_disconnect_unpowers() {
        let (mut sim, handle, clock) = connected_sim();

        sim.set_torque(JointId::Elbow, 0.5).unwrap();
        sim.disconnect().unwrap();
        assert_eq!(handle.commanded_torque(JointId::Elbow), 0.0);
        assert!(!handle.is_connected());

        // Motors must be initialised again after a reconnection
        sim.connect().unwrap();
        assert!(matches!(sim.set_torque(JointId::Elbow, 0.5), Err(HwError::Io(..))));

        clock.advance(0.5);
        sim.encoder_ok(JointId::Elbow).unwrap();
        assert_eq!(handle.joint_angle(JointId::Elbow), 0.0);
    }

    #[test]
    fn test_fault_injection() {
        let (mut sim, handle, _) = connected_sim();

        handle.inject_encoder_fault(JointId::Elbow);
        assert_eq!(sim.encoder_ok(JointId::Shoulder), Ok(true));
        assert_eq!(sim.encoder_ok(JointId::Elbow), Ok(false));

        handle.clear_encoder_faults();
        assert_eq!(sim.encoder_ok(JointId::Elbow), Ok(true));

        handle.fail_encoder_init(JointId::Shoulder);
        assert!(matches!(
            sim.init_encoder(JointId::Shoulder),
            Err(HwError::EncoderInitFailed(JointId::Shoulder, _))
        ));
    }
}
