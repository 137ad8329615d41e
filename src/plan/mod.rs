//! Work-unit planning
//!
//! Maps a tree classification onto worker-declared boundaries and emits the
//! units each worker must carry out.

pub mod builder;
pub mod unit;

pub use crate::tree::Position;
pub use builder::PlanBuilder;
pub use unit::{WorkOp, WorkUnit};
