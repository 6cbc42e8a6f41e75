pub mod actuator;
pub mod command_builder;
pub mod motion;
pub mod supervisor;

pub use actuator::*;
pub use command_builder::*;
pub use motion::*;
pub use supervisor::*;
