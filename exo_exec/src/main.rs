//! Exoskeleton executable entry point.
//!
//! Runs the control core against the simulated rig:
//!
//!     - Initialise the session, logging and parameters
//!     - Connect to and calibrate the rig
//!     - Start the control loop
//!     - Run a motion script, recording telemetry
//!     - Stop the loop and save the results
//!
//! The script is loaded from the path given as the only argument, or the built-in demo script is
//! used if there is none.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use exo_if::geometry::GeometryProvider;
use log::{debug, info, warn};
use std::env;
use std::sync::{Arc, RwLock};
use std::time::Duration;

// Internal
use exo_lib::{
    control_loop::ControlLoop,
    exo_ctrl::ExoCtrl,
    params::ExoParams,
    script::MotionScript,
    sim_hw::{SimHardware, SimParams},
    telemetry::Telemetry,
};
use util::{
    archive::Archiver,
    logger::{logger_init, LogConfig},
    session::Session,
    time::{Clock, SystemClock},
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Period at which telemetry is sampled while the script runs.
const TELEMETRY_PERIOD: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("exo_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    let log_config: LogConfig =
        util::params::load("logging.toml").wrap_err("Could not load logging params")?;
    logger_init(&log_config, &session).wrap_err("Failed to initialise logging")?;

    info!("Exoskeleton Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exo_params: ExoParams =
        util::params::load("exo_ctrl.toml").wrap_err("Could not load exo_ctrl params")?;
    let sim_params: SimParams =
        util::params::load("sim_hw.toml").wrap_err("Could not load sim_hw params")?;

    info!("Parameters loaded");

    // ---- LOAD SCRIPT ----

    let args: Vec<String> = env::args().collect();
    debug!("CLI arguments: {:?}", args);

    let script = match args.get(1) {
        Some(path) => {
            info!("Loading script from \"{}\"", path);
            MotionScript::load(path).wrap_err("Failed to load the script")?
        }
        None => {
            info!("No script given, running the demo script");
            MotionScript::default()
        }
    };

    // ---- INITIALISE THE CONTROL CORE ----

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let geometry: Arc<dyn GeometryProvider> = Arc::new(RwLock::new(exo_params.subject));

    let sim = SimHardware::new(sim_params, clock.clone());
    let mut exo = ExoCtrl::new(sim, geometry, &exo_params, clock);

    exo.connect().wrap_err("Failed to connect to the exoskeleton")?;
    exo.calibrate(|| info!("Simulated operator confirmed the calibration position"))
        .wrap_err("Failed to calibrate the exoskeleton")?;

    let ctrl_loop = ControlLoop::start(exo).wrap_err("Failed to start the control loop")?;
    let shared = ctrl_loop.shared();

    // ---- RUN THE SCRIPT ----

    let mut archiver =
        Archiver::from_path(&session, "telemetry.csv").wrap_err("Failed to create the archive")?;
    let mut log: Vec<Telemetry> = Vec::new();
    let mut arch_ok = true;

    let script_result = script.run(&shared, TELEMETRY_PERIOD, || {
        let tm = ctrl_loop.telemetry();

        if arch_ok {
            if let Err(e) = archiver.serialise(tm.to_record()) {
                warn!("Telemetry archiving stopped: {}", e);
                arch_ok = false;
            }
        }

        log.push(tm);
    });

    // ---- SHUTDOWN ----

    let cycles = ctrl_loop.num_cycles();
    let mut exo = ctrl_loop.stop().wrap_err("Failed to stop the control loop")?;
    exo.disconnect().wrap_err("Failed to disconnect the exoskeleton")?;

    info!("Ran {} control cycles", cycles);

    session
        .save("telemetry.json", &log)
        .wrap_err("Failed to save the telemetry")?;
    session
        .save("gains.json", &shared.gains())
        .wrap_err("Failed to save the gains")?;

    script_result.wrap_err("The script did not complete")?;

    info!("End of execution");

    Ok(())
}
