//! Error taxonomy shared by the library components.
//!
//! Setup-time errors (`TaskError`) abort before any motion starts. Per-tick errors
//! (`ChannelError::MalformedMessage`, `PlanError::IkFailure` on a single primitive) are
//! logged by the caller and the loop keeps running.

use crate::types::Pose;
use thiserror::Error;

/// A caller broke a precondition (mismatched vector lengths, out-of-range parameter).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid argument: {0}")]
pub struct InvalidArgument(pub String);

impl InvalidArgument {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub(crate) fn length_mismatch(what: &str, expected: usize, actual: usize) -> Self {
        Self(format!("{what}: expected {expected} values, got {actual}"))
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("failed to send message: {0}")]
    Send(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("IK did not converge for pose {pose}")]
    IkFailure { pose: Pose },

    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("arity mismatch: {picks} pick poses but {places} place poses")]
    ArityMismatch { picks: usize, places: usize },

    #[error("scene object '{0}' not found")]
    MissingReference(String),

    #[error("malformed task file: {0}")]
    TaskFile(String),

    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),
}

/// Fewer pallet cells than objects. Reported next to a successful result, never as an `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncatedAllocation {
    pub requested: usize,
    pub available: usize,
}

impl std::fmt::Display for TruncatedAllocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pallet has {} cells for {} objects, only the first {} will be placed",
            self.available, self.requested, self.available
        )
    }
}
