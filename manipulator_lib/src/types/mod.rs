pub mod config;
pub mod joints;
pub mod messages;
pub mod pose;
pub mod task;

pub use config::*;
pub use joints::*;
pub use messages::*;
pub use pose::*;
pub use task::*;
