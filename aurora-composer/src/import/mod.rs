//! Sample import

pub mod robot_csv;

pub use robot_csv::{import_batch, parse, RobotRow};
