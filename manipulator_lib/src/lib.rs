//! # Manipulator Library
//!
//! Shared types, planning and control loops for the pick-and-place manipulator.
//! This library is used by the supervisor and actuator dora nodes and by the task compiler.

pub mod channel;
pub mod control;
pub mod error;
pub mod placement;
pub mod planning;
pub mod sim;
pub mod types;
pub mod utils;

// Re-export everything for convenience
pub use channel::*;
pub use control::*;
pub use error::*;
pub use placement::*;
pub use planning::*;
pub use sim::*;
pub use types::*;
pub use utils::*;
