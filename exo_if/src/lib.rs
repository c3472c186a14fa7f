//! # Exoskeleton interface crate.
//!
//! Provides the types shared between the control core and its collaborators:
//! the hardware port the core drives, the subject geometry it is bound to, and
//! the control paradigm/mode vocabulary supervisory callers command it with.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Control paradigms, modes and workspace classification
pub mod ctrl;

/// Subject geometry and its provider
pub mod geometry;

/// Hardware port definitions
pub mod hw;
