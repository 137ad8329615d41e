//! Plan and cycle formatters for `attune plan` and `attune simulate`.

use super::shared::{format_section_heading, to_json};
use crate::error::ApiError;
use crate::plan::{Position, WorkUnit};
use crate::reconcile::{CycleReport, Plan};
use crate::worker::UnitStatus;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::path::Path;

fn position_label(unit: &WorkUnit) -> String {
    match unit.pos() {
        None => "-".to_string(),
        Some(Position::First) => "first".to_string(),
        Some(Position::After(sibling)) => format!("after {}", sibling),
    }
}

fn levels_table(levels: &[Vec<WorkUnit>]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Level", "Op", "Unit", "Position"]);
    for (index, level) in levels.iter().enumerate() {
        for unit in level {
            table.add_row(vec![
                index.to_string(),
                unit.op().to_string(),
                unit.id().to_string(),
                position_label(unit),
            ]);
        }
    }
    table
}

pub fn format_plan(plan: &Plan, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(&serde_json::json!({
            "summary": plan.classification.summary(),
            "dependencies": plan.dependencies.len(),
            "edges": plan.schedule.graph.edge_count(),
            "levels": plan.schedule.levels,
        }));
    }

    let mut out = format!("{}\n\n", format_section_heading("Plan"));
    if plan.is_empty() {
        out.push_str("  Nothing to do: observed state matches desired state.");
        return Ok(out);
    }
    out.push_str(&format!("{}\n\n", levels_table(&plan.schedule.levels)));
    out.push_str(&format!(
        "  {} units in {} levels ({} declared dependencies, {} ordering edges)",
        plan.units.len(),
        plan.schedule.levels.len(),
        plan.dependencies.len(),
        plan.schedule.graph.edge_count()
    ));
    Ok(out)
}

pub fn format_cycle_report(
    report: &CycleReport,
    status_path: &Path,
    format: &str,
) -> Result<String, ApiError> {
    let result = &report.result;
    if format == "json" {
        return to_json(&serde_json::json!({
            "summary": report.summary,
            "units": report.unit_count,
            "levels": result.level_summaries,
            "reports": result.reports,
            "failures": result.failures.iter().map(|a| a.to_string()).collect::<Vec<_>>(),
            "started_at": result.started_at.to_rfc3339(),
            "finished_at": result.finished_at.to_rfc3339(),
            "status_path": status_path.display().to_string(),
        }));
    }

    let mut out = format!("{}\n\n", format_section_heading("Cycle"));
    if result.reports.is_empty() {
        out.push_str("  Nothing to do: observed state matches desired state.\n");
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Unit", "Result"]);
        for r in &result.reports {
            let outcome = match &r.status {
                UnitStatus::Success => "success".to_string(),
                UnitStatus::Error(message) => format!("error: {}", message),
            };
            table.add_row(vec![r.unit.to_string(), outcome]);
        }
        out.push_str(&format!("{}\n", table));
    }

    let verdict = if result.is_success() {
        format!("{}", "ok".green().bold())
    } else {
        format!("{}", format!("{} failed", result.failures.len()).red().bold())
    };
    out.push_str(&format!(
        "\n  {} units in {} levels: {}\n  Status written to {}",
        report.unit_count,
        result.level_summaries.len(),
        verdict,
        status_path.display()
    ));
    Ok(out)
}
