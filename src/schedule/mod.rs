//! Dependency translation, leveling and dispatch

pub mod deps;
pub mod dispatch;
pub mod level;

pub use deps::{
    build_dependency_graph, extract_dependencies, DependencyEdge, DependencyGraph, DependencyOp,
    UnitAction,
};
pub use dispatch::{CycleResult, LevelSummary, Schedule, Scheduler, SchedulerOptions, SchedulerState};
pub use level::level;
