//! # Hardware port
//!
//! The minimal set of operations the control core needs from the motor and encoder interface
//! card. Real drivers and the simulated rig both implement [`HardwarePort`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of actuated joints (and so encoder/motor channels) on the rig.
pub const NUM_JOINTS: usize = 2;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// IDs of the actuated joints.
///
/// The discriminant is the index of the joint in every 2-vector used by the software, and the
/// channel number of its encoder and motor.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum JointId {
    Shoulder = 0,
    Elbow = 1,
}

/// Errors reported by a hardware port.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HwError {
    #[error("Could not connect to the interface card: {0}")]
    ConnectFailed(String),

    #[error("The interface card is not connected")]
    NotConnected,

    #[error("Could not initialise the encoder on the {0:?} channel: {1}")]
    EncoderInitFailed(JointId, String),

    #[error("Could not initialise the motor on the {0:?} channel: {1}")]
    MotorInitFailed(JointId, String),

    #[error("I/O error on the {0:?} channel: {1}")]
    Io(JointId, String),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Operations the control core performs on the rig's interface card.
///
/// Calls block for as long as the underlying I/O takes, the control loop is rate limited by them.
pub trait HardwarePort: Send {
    /// Open the connection to the interface card.
    fn connect(&mut self) -> Result<(), HwError>;

    /// Close the connection. Implementations must leave the motors unpowered.
    fn disconnect(&mut self) -> Result<(), HwError>;

    /// Initialise the quadrature counter of the given channel.
    fn init_encoder(&mut self, joint: JointId) -> Result<(), HwError>;

    /// Initialise the motor amplifier output of the given channel.
    fn init_motor(&mut self, joint: JointId) -> Result<(), HwError>;

    /// Returns `true` if the channel's encoder is healthy, or `false` if it has reported a
    /// quadrature error.
    fn encoder_ok(&mut self, joint: JointId) -> Result<bool, HwError>;

    /// Read the raw counter value of the channel's encoder.
    fn read_counts(&mut self, joint: JointId) -> Result<i64, HwError>;

    /// Command a motor-side torque, in Nm, on the given channel.
    fn set_torque(&mut self, joint: JointId, torque_nm: f64) -> Result<(), HwError>;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointId {
    /// All joints in index order.
    pub const ALL: [JointId; NUM_JOINTS] = [JointId::Shoulder, JointId::Elbow];

    /// Index of this joint in 2-vectors.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl<T: HardwarePort + ?Sized> HardwarePort for Box<T> {
    fn connect(&mut self) -> Result<(), HwError> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<(), HwError> {
        (**self).disconnect()
    }

    fn init_encoder(&mut self, joint: JointId) -> Result<(), HwError> {
        (**self).init_encoder(joint)
    }

    fn init_motor(&mut self, joint: JointId) -> Result<(), HwError> {
        (**self).init_motor(joint)
    }

    fn encoder_ok(&mut self, joint: JointId) -> Result<bool, HwError> {
        (**self).encoder_ok(joint)
    }

    fn read_counts(&mut self, joint: JointId) -> Result<i64, HwError> {
        (**self).read_counts(joint)
    }

    fn set_torque(&mut self, joint: JointId, torque_nm: f64) -> Result<(), HwError> {
        (**self).set_torque(joint, torque_nm)
    }
}
