//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; single route table dispatches to domain services.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_classification, format_cycle_report, format_plan, format_validation_result,
    ValidationResult,
};
pub use route::RunContext;
