//! Integration tests for the Attune reconciliation engine

mod cli_commands;
mod config_integration;
mod dependency_scheduling;
mod reconcile_cycle;
mod scenarios;
mod test_utils;

pub use test_utils::*;
