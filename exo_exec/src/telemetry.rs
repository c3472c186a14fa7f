//! # Telemetry
//!
//! Snapshots of the control core for display and archiving.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use exo_if::ctrl::{ControlMode, ControlParadigm, WorkspaceStatus};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// State of the control core after its latest command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub t_s: f64,

    pub paradigm: ControlParadigm,
    pub mode: ControlMode,
    pub active: [bool; 2],
    pub locked: [bool; 2],

    pub th_rad: [f64; 2],
    pub thdot_rads: [f64; 2],
    pub targ_rad: [f64; 2],

    pub pos_m: [f64; 2],
    pub vel_ms: [f64; 2],
    pub targ_m: [f64; 2],

    /// Robot space torque, including safety torques.
    pub robot_torque_nm: [f64; 2],

    /// Motor torque as sent to the hardware.
    pub motor_torque_nm: [f64; 2],

    /// End effector force equivalent to the commanded torque.
    pub force_n: [f64; 2],

    /// Classification of the current target.
    pub status: WorkspaceStatus,
    pub reached: bool,
    pub faulted: bool,
}

/// A flat copy of [`Telemetry`] suitable for a CSV archive.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TelemetryRecord {
    pub t_s: f64,
    pub paradigm: ControlParadigm,
    pub mode: ControlMode,
    pub th_s_rad: f64,
    pub th_e_rad: f64,
    pub thdot_s_rads: f64,
    pub thdot_e_rads: f64,
    pub pos_x_m: f64,
    pub pos_y_m: f64,
    pub targ_x_m: f64,
    pub targ_y_m: f64,
    pub torque_s_nm: f64,
    pub torque_e_nm: f64,
    pub motor_s_nm: f64,
    pub motor_e_nm: f64,
    pub status: WorkspaceStatus,
    pub reached: bool,
    pub faulted: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Telemetry {
    pub fn to_record(&self) -> TelemetryRecord {
        TelemetryRecord {
            t_s: self.t_s,
            paradigm: self.paradigm,
            mode: self.mode,
            th_s_rad: self.th_rad[0],
            th_e_rad: self.th_rad[1],
            thdot_s_rads: self.thdot_rads[0],
            thdot_e_rads: self.thdot_rads[1],
            pos_x_m: self.pos_m[0],
            pos_y_m: self.pos_m[1],
            targ_x_m: self.targ_m[0],
            targ_y_m: self.targ_m[1],
            torque_s_nm: self.robot_torque_nm[0],
            torque_e_nm: self.robot_torque_nm[1],
            motor_s_nm: self.motor_torque_nm[0],
            motor_e_nm: self.motor_torque_nm[1],
            status: self.status,
            reached: self.reached,
            faulted: self.faulted,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use util::archive::Archiver;

    #[test]
    fn test_record_archives() {
        let tm = Telemetry {
            t_s: 1.5,
            paradigm: ControlParadigm::Joint,
            th_rad: [0.5, 1.25],
            ..Default::default()
        };

        let path = std::env::temp_dir().join("exo_telemetry_record_test.csv");
        let file = std::fs::File::create(&path).unwrap();
        let mut arch = Archiver::from_file(file);
        arch.serialise(tm.to_record()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("t_s,paradigm,mode,th_s_rad"));
        assert!(lines.next().unwrap().starts_with("1.5,Joint,Position,0.5,1.25"));

        std::fs::remove_file(path).ok();
    }
}
