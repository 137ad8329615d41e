//! Shared presentation: headings, json encoding, validation results.

use crate::error::{ApiError, StorageError};
use owo_colors::OwoColorize;
use serde::Serialize;

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

pub(super) fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::Storage(StorageError::Serialization(e.to_string())))
}

/// Outcome of `attune validate`
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    /// What was validated: a file path or "configuration"
    pub subject: String,
    /// Kind of document: tree, schema, configuration
    pub kind: String,
    pub errors: Vec<String>,
    pub notes: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn format_validation_result(result: &ValidationResult, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(&serde_json::json!({
            "subject": result.subject,
            "kind": result.kind,
            "valid": result.is_valid(),
            "errors": result.errors,
            "notes": result.notes,
        }));
    }
    let mut out = if result.is_valid() {
        format!(
            "{} {} ({})",
            "Valid".green().bold(),
            result.subject,
            result.kind
        )
    } else {
        format!(
            "{} {} ({})",
            "Invalid".red().bold(),
            result.subject,
            result.kind
        )
    };
    for note in &result.notes {
        out.push_str(&format!("\n  {}", note));
    }
    if !result.errors.is_empty() {
        out.push_str(&format!("\n\nErrors ({}):", result.errors.len()));
        for e in &result.errors {
            out.push_str(&format!("\n  - {}", e));
        }
    }
    Ok(out)
}
