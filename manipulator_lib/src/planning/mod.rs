//! Task compilation and motion planning, all run before or outside the control tick.

pub mod pallet;
pub mod planner;
pub mod task_compiler;
pub mod trajectory;

pub use pallet::*;
pub use planner::*;
pub use task_compiler::*;
pub use trajectory::*;
