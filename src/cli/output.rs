use colored::Colorize;
use serde_json::json;

use crate::detect::SensitiveSpan;
use crate::mapping::token::parse_token;
use crate::mapping::Mapping;
use crate::session::PopulateReport;
use crate::utils::{preview, truncate_or_pad, LABEL_WIDTH, PREVIEW_LEN};

/// Format detected spans for display
pub fn format_spans(spans: &[SensitiveSpan]) -> String {
    if spans.is_empty() {
        return format!("{}\n", "No sensitive data detected.".green());
    }

    let mut output = format!(
        "{} {} found:\n\n",
        "Sensitive spans".yellow(),
        spans.len()
    );
    for span in spans {
        output.push_str(&format!(
            "  {} {}\n",
            truncate_or_pad(&span.label, LABEL_WIDTH).cyan(),
            preview(&span.text, PREVIEW_LEN).red()
        ));
    }
    output
}

/// Format the mapping table for display, longest literal first
pub fn format_mapping(mapping: &Mapping, counter: u64) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{} {} entries, next sequence {}\n",
        "Mapping:".bold(),
        mapping.len(),
        counter
    ));
    output.push_str(&format!("{}\n", "─".repeat(70).dimmed()));

    for entry in mapping.iter() {
        let label = parse_token(&entry.token)
            .map(|(label, _)| label)
            .unwrap_or("?");
        output.push_str(&format!(
            " {} │ {} │ {}\n",
            truncate_or_pad(label, LABEL_WIDTH).cyan(),
            truncate_or_pad(&preview(&entry.literal, PREVIEW_LEN), PREVIEW_LEN),
            entry.token.yellow()
        ));
    }

    if mapping.is_empty() {
        output.push_str(&format!(" {}\n", "(empty)".dimmed()));
    }

    output
}

/// Format a detection run summary
pub fn format_report(report: &PopulateReport) -> String {
    let mut output = format!(
        "{} {} pattern spans, {} entity spans, {} new entries\n",
        "Detection:".bold(),
        report.pattern_spans,
        report.entity_spans,
        report.new_entries.len()
    );

    for entry in &report.new_entries {
        output.push_str(&format!(
            "  {} {} → {}\n",
            "+".green(),
            preview(&entry.literal, PREVIEW_LEN),
            entry.token.yellow()
        ));
    }

    if let Some(err) = &report.entity_error {
        output.push_str(&format!(
            "{} {} (pattern results were kept)\n",
            "Warning:".yellow().bold(),
            err
        ));
    }

    output
}

/// JSON form of a detection run summary
pub fn report_json(report: &PopulateReport) -> serde_json::Value {
    json!({
        "pattern_spans": report.pattern_spans,
        "entity_spans": report.entity_spans,
        "new_entries": report.new_entries,
        "entity_error": report.entity_error.as_ref().map(|e| e.to_string()),
    })
}
