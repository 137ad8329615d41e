//! Classification formatters for `attune diff`.

use super::shared::{format_section_heading, to_json};
use crate::diff::{Classification, DiffState};
use crate::error::ApiError;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;

fn state_label(state: DiffState) -> &'static str {
    match state {
        DiffState::Left => "left",
        DiffState::Right => "right",
        DiffState::DataDiff => "data-diff",
        DiffState::StructDiff => "struct-diff",
        DiffState::Unchanged => "unchanged",
    }
}

pub fn format_classification(
    classification: &Classification,
    include_unchanged: bool,
    format: &str,
) -> Result<String, ApiError> {
    let rows: Vec<(String, DiffState)> = classification
        .iter()
        .filter(|(_, state)| include_unchanged || *state != DiffState::Unchanged)
        .map(|(address, state)| (address.to_string(), state))
        .collect();
    let summary = classification.summary();

    if format == "json" {
        let addresses: Vec<serde_json::Value> = rows
            .iter()
            .map(|(address, state)| serde_json::json!({ "address": address, "state": state }))
            .collect();
        return to_json(&serde_json::json!({
            "summary": summary,
            "addresses": addresses,
        }));
    }

    let mut out = format!("{}\n\n", format_section_heading("Classification"));
    if rows.is_empty() {
        out.push_str("  No differences.\n");
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Address", "State"]);
        for (address, state) in &rows {
            table.add_row(vec![address.clone(), state_label(*state).to_string()]);
        }
        out.push_str(&format!("{}\n", table));
    }
    out.push_str(&format!(
        "\n  left: {}  right: {}  data-diff: {}  struct-diff: {}  unchanged: {}",
        summary.left, summary.right, summary.data_diff, summary.struct_diff, summary.unchanged
    ));
    Ok(out)
}
