//! # Control loop
//!
//! Runs [`ExoCtrl`] cycles back to back on a dedicated thread until stopped. The loop is free
//! running, its rate is set by the time the hardware port takes to service each cycle.
//!
//! The supervisory side talks to the core through the [`SharedCtrl`] handle and reads the latest
//! telemetry, it never blocks the loop: telemetry is only published when its lock is free.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use exo_if::hw::HardwarePort;
use log::{debug, error, info, warn};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc, Arc, Mutex, PoisonError,
};
use std::thread::{self, JoinHandle};

use crate::{
    exo_ctrl::{ExoCtrl, ExoCtrlError, SharedCtrl},
    telemetry::Telemetry,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to a running control loop.
///
/// Dropping the handle stops the loop and disables the motors.
pub struct ControlLoop<H: HardwarePort + 'static> {
    run: Arc<AtomicBool>,

    /// Held by the loop thread for as long as it is running.
    run_lock: Arc<Mutex<()>>,

    num_cycles: Arc<AtomicU64>,
    telemetry: Arc<Mutex<Telemetry>>,
    shared: SharedCtrl,

    handle: Option<JoinHandle<ExoCtrl<H>>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ControlLoopError {
    #[error("The control core must be connected and calibrated before the loop is started")]
    NotReady,

    #[error("Could not spawn the control thread: {0}")]
    SpawnFailed(std::io::Error),

    #[error("The control thread exited before signalling it had started")]
    StartFailed,

    #[error("The control thread panicked")]
    Panicked,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<H: HardwarePort + 'static> ControlLoop<H> {
    /// Start running the control core on its own thread.
    ///
    /// Returns once the thread is running.
    pub fn start(exo: ExoCtrl<H>) -> Result<Self, ControlLoopError> {
        if !exo.is_connected() || !exo.is_calibrated() {
            return Err(ControlLoopError::NotReady);
        }

        let run = Arc::new(AtomicBool::new(true));
        let run_lock = Arc::new(Mutex::new(()));
        let num_cycles = Arc::new(AtomicU64::new(0));
        let telemetry = Arc::new(Mutex::new(exo.telemetry()));
        let shared = exo.shared();

        let (ready_tx, ready_rx) = mpsc::channel();

        let run_clone = run.clone();
        let run_lock_clone = run_lock.clone();
        let num_cycles_clone = num_cycles.clone();
        let telemetry_clone = telemetry.clone();

        let handle = thread::Builder::new()
            .name("exo_ctrl".into())
            .spawn(move || {
                bg_thread(
                    exo,
                    run_clone,
                    run_lock_clone,
                    num_cycles_clone,
                    telemetry_clone,
                    ready_tx,
                )
            })
            .map_err(ControlLoopError::SpawnFailed)?;

        // Wait until the thread holds the run lock, so a stop can never race the start
        if ready_rx.recv().is_err() {
            run.store(false, Ordering::Relaxed);
            return match handle.join() {
                Err(_) => Err(ControlLoopError::Panicked),
                Ok(_) => Err(ControlLoopError::StartFailed),
            };
        }

        info!("Control loop started");

        Ok(Self {
            run,
            run_lock,
            num_cycles,
            telemetry,
            shared,
            handle: Some(handle),
        })
    }

    /// Stop the loop and wait for the final cycle to complete.
    ///
    /// The motors are disabled before the control core is handed back.
    pub fn stop(mut self) -> Result<ExoCtrl<H>, ControlLoopError> {
        self.halt().ok_or(ControlLoopError::Panicked)
    }

    pub fn shared(&self) -> SharedCtrl {
        self.shared.clone()
    }

    /// Latest published telemetry.
    pub fn telemetry(&self) -> Telemetry {
        *self.telemetry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of cycles completed so far.
    pub fn num_cycles(&self) -> u64 {
        self.num_cycles.load(Ordering::Relaxed)
    }

    fn halt(&mut self) -> Option<ExoCtrl<H>> {
        let handle = self.handle.take()?;

        self.run.store(false, Ordering::Relaxed);

        // Blocks until the loop has finished its last cycle and released the lock
        drop(self.run_lock.lock().unwrap_or_else(PoisonError::into_inner));

        match handle.join() {
            Ok(exo) => {
                info!("Control loop stopped after {} cycles", self.num_cycles());
                Some(exo)
            }
            Err(_) => {
                error!("The control thread panicked");
                None
            }
        }
    }
}

impl<H: HardwarePort + 'static> Drop for ControlLoop<H> {
    fn drop(&mut self) {
        self.halt();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn bg_thread<H: HardwarePort>(
    mut exo: ExoCtrl<H>,
    run: Arc<AtomicBool>,
    run_lock: Arc<Mutex<()>>,
    num_cycles: Arc<AtomicU64>,
    telemetry: Arc<Mutex<Telemetry>>,
    ready_tx: mpsc::Sender<()>,
) -> ExoCtrl<H> {
    let guard = run_lock.lock().unwrap_or_else(PoisonError::into_inner);

    if ready_tx.send(()).is_err() {
        return exo;
    }

    let mut last_error: Option<String> = None;

    while run.load(Ordering::Relaxed) {
        // Any sensing failure latches a fault and freezes the state, the command still runs so
        // that the latched fault zeroes the motors every cycle
        let sampled = exo.sample_state();
        let result = exo.issue_command();

        let err = match (sampled, result) {
            (Err(e), _) | (Ok(_), Err(e)) => Some(e),
            _ => None,
        };

        // Only log on changes, the same error repeats every cycle
        match err {
            Some(e) => {
                let msg = e.to_string();
                if last_error.as_ref() != Some(&msg) {
                    match e {
                        ExoCtrlError::WorkspaceViolation(_) => debug!("Cycle rejected: {}", msg),
                        _ => warn!("Control cycle error: {}", msg),
                    }
                    last_error = Some(msg);
                }
            }
            None => {
                if last_error.take().is_some() {
                    info!("Control cycles nominal");
                }
            }
        }

        num_cycles.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut tm) = telemetry.try_lock() {
            *tm = exo.telemetry();
        }
    }

    if let Err(e) = exo.disable() {
        error!("Could not disable the motors at loop exit: {}", e);
    }

    *telemetry.lock().unwrap_or_else(PoisonError::into_inner) = exo.telemetry();

    drop(guard);

    exo
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        params::ExoParams,
        sim_hw::{SimHardware, SimParams},
    };
    use exo_if::{ctrl::ControlParadigm, geometry::Geometry, hw::JointId};
    use nalgebra::Vector2;
    use std::time::{Duration, Instant};
    use util::time::SystemClock;

    fn calibrated_exo() -> (ExoCtrl<SimHardware>, crate::sim_hw::SimHandle) {
        let clock = Arc::new(SystemClock::new());
        let sim_params = SimParams {
            io_latency_us: 100,
            ..Default::default()
        };
        let sim = SimHardware::new(sim_params, clock.clone());
        let handle = sim.handle();

        let mut exo = ExoCtrl::new(sim, Arc::new(Geometry::default()), &ExoParams::default(), clock);
        exo.connect().unwrap();
        exo.calibrate(|| ()).unwrap();

        (exo, handle)
    }

    fn wait_for<F: Fn() -> bool>(cond: F) {
        let start = Instant::now();
        while !cond() {
            assert!(start.elapsed() < Duration::from_secs(5), "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_start_requires_calibration() {
        let clock = Arc::new(SystemClock::new());
        let sim = SimHardware::new(SimParams::default(), clock.clone());
        let mut exo = ExoCtrl::new(sim, Arc::new(Geometry::default()), &ExoParams::default(), clock);
        exo.connect().unwrap();

        assert!(matches!(ControlLoop::start(exo), Err(ControlLoopError::NotReady)));
    }

    #[test]
    fn test_stop_disables_motors() {
        let (exo, handle) = calibrated_exo();
        let ctrl_loop = ControlLoop::start(exo).unwrap();

        ctrl_loop
            .shared()
            .set_force(Vector2::new(1.0, 1.0), ControlParadigm::Joint);

        wait_for(|| handle.commanded_torque(JointId::Shoulder) != 0.0);
        assert!(ctrl_loop.num_cycles() > 0);

        let exo = ctrl_loop.stop().unwrap();
        assert_eq!(handle.commanded_torque(JointId::Shoulder), 0.0);
        assert_eq!(handle.commanded_torque(JointId::Elbow), 0.0);

        // The core is still usable after the loop
        assert!(exo.is_connected());
    }

    #[test]
    fn test_commands_reach_the_loop() {
        let (exo, handle) = calibrated_exo();
        let ctrl_loop = ControlLoop::start(exo).unwrap();

        let shared = ctrl_loop.shared();
        shared.set_force(Vector2::new(0.0, 2.0), ControlParadigm::Joint);
        wait_for(|| ctrl_loop.telemetry().paradigm == ControlParadigm::Joint);

        shared.set_paradigm(ControlParadigm::None);
        wait_for(|| ctrl_loop.telemetry().paradigm == ControlParadigm::None);
        assert_eq!(handle.commanded_torque(JointId::Elbow), 0.0);

        // Dropping the loop stops it too
        drop(ctrl_loop);
        assert_eq!(handle.commanded_torque(JointId::Elbow), 0.0);
    }
}
