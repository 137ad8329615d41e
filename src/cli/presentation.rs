//! CLI presentation: text and json formatters per command family.

mod diff;
mod plan;
mod shared;

pub use diff::format_classification;
pub use plan::{format_cycle_report, format_plan};
pub use shared::{format_section_heading, format_validation_result, ValidationResult};
