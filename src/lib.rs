//! Attune: Desired-State Reconciliation
//!
//! Compares a desired configuration tree against the observed status of a
//! machine, turns the differences into work units owned by workers, orders
//! them by explicit and positional dependencies, and dispatches them level
//! by level before persisting the new status.

pub mod cli;
pub mod config;
pub mod diff;
pub mod error;
pub mod logging;
pub mod plan;
pub mod reconcile;
pub mod schedule;
pub mod schema;
pub mod status;
pub mod tree;
pub mod worker;
