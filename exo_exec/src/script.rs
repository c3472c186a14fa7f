//! # Motion scripts
//!
//! A script is a list of steps executed in order against a [`SharedCtrl`], for example:
//!
//! ```toml
//! [[step]]
//! cmd = "target"
//! paradigm = "Joint"
//! value = [0.7, 1.4]
//!
//! [[step]]
//! cmd = "wait_settle"
//! timeout_s = 10.0
//! ```
//!
//! Values are in the paradigm's frame: metres for `Task`, radians otherwise. Forces are in N or Nm
//! to match.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use exo_if::ctrl::{ControlParadigm, WorkspaceStatus};
use log::{info, warn};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use util::params::{self, LoadError};

use crate::exo_ctrl::SharedCtrl;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionScript {
    pub step: Vec<ScriptStep>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Move to a target.
    Target {
        paradigm: ControlParadigm,
        value: [f64; 2],
    },

    /// Render a force or joint torques.
    Force {
        paradigm: ControlParadigm,
        value: [f64; 2],
    },

    /// Switch paradigm, holding the current position.
    Paradigm { paradigm: ControlParadigm },

    Wait { duration_s: f64 },

    /// Wait until the arm has settled on the current target.
    WaitSettle { timeout_s: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Could not load the script: {0}")]
    LoadError(#[from] LoadError),

    #[error("Step {0}: the target is not reachable ({1:?})")]
    Unreachable(usize, WorkspaceStatus),

    #[error("Step {0}: the arm did not settle within {1} s")]
    SettleTimeout(usize, f64),

    #[error("Step {0}: hardware fault:\n{1}")]
    HardwareFault(usize, String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotionScript {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScriptError> {
        Ok(params::load_from_path(path)?)
    }

    /// Run the script to completion.
    ///
    /// `on_tick` is called every `poll_period` while waiting, use it to record telemetry.
    pub fn run<F: FnMut()>(
        &self,
        shared: &SharedCtrl,
        poll_period: Duration,
        mut on_tick: F,
    ) -> Result<(), ScriptError> {
        for (i, step) in self.step.iter().enumerate() {
            info!("Script step {}: {:?}", i, step);

            match *step {
                ScriptStep::Target { paradigm, value } => {
                    let status = shared.set_target(Vector2::from(value), paradigm);
                    if !status.is_in_bounds() {
                        return Err(ScriptError::Unreachable(i, status));
                    }
                }
                ScriptStep::Force { paradigm, value } => {
                    shared.set_force(Vector2::from(value), paradigm)
                }
                ScriptStep::Paradigm { paradigm } => shared.set_paradigm(paradigm),
                ScriptStep::Wait { duration_s } => {
                    let end = Instant::now() + Duration::from_secs_f64(duration_s.max(0.0));

                    while Instant::now() < end {
                        check_fault(shared, i)?;
                        on_tick();
                        thread::sleep(poll_period);
                    }
                }
                ScriptStep::WaitSettle { timeout_s } => {
                    let end = Instant::now() + Duration::from_secs_f64(timeout_s.max(0.0));

                    while !shared.reached_target() {
                        check_fault(shared, i)?;

                        if Instant::now() >= end {
                            warn!("Step {} timed out waiting for the arm to settle", i);
                            return Err(ScriptError::SettleTimeout(i, timeout_s));
                        }

                        on_tick();
                        thread::sleep(poll_period);
                    }
                }
            }
        }

        on_tick();
        info!("Script complete");

        Ok(())
    }
}

/// Joint target, task target, a short force pulse and then release.
impl Default for MotionScript {
    fn default() -> Self {
        Self {
            step: vec![
                ScriptStep::Target {
                    paradigm: ControlParadigm::Joint,
                    value: [40f64.to_radians(), 80f64.to_radians()],
                },
                ScriptStep::WaitSettle { timeout_s: 15.0 },
                ScriptStep::Target {
                    paradigm: ControlParadigm::Task,
                    value: [0.1, 0.45],
                },
                ScriptStep::WaitSettle { timeout_s: 15.0 },
                ScriptStep::Force {
                    paradigm: ControlParadigm::Task,
                    value: [0.0, 2.0],
                },
                ScriptStep::Wait { duration_s: 0.25 },
                ScriptStep::Paradigm {
                    paradigm: ControlParadigm::None,
                },
                ScriptStep::Wait { duration_s: 0.5 },
            ],
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn check_fault(shared: &SharedCtrl, step: usize) -> Result<(), ScriptError> {
    match shared.fault() {
        Some(msg) => Err(ScriptError::HardwareFault(step, msg)),
        None => Ok(()),
    }
}
