//! Aligned plain-text rendering for tables, series and column profiles.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{profile::ColumnProfile, tools::MetadataResponse};

const COLUMN_GAP: &str = "  ";
const MAX_CELL_WIDTH: usize = 40;

/// Renders `rows` under `headers`; columns whose cells are all numeric are right-aligned.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| cell_width(h)).collect::<Vec<_>>();
    let mut numeric = vec![true; column_count];

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(cell_width(cell));
            if !cell.is_empty() && cell.parse::<f64>().is_err() {
                numeric[idx] = false;
            }
        }
    }
    for width in &mut widths {
        *width = (*width).max(3);
    }

    let mut output = String::new();
    let left = vec![false; column_count];
    let _ = writeln!(output, "{}", format_row(headers, &widths, &left));
    let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths, &left));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, &numeric));
    }
    output
}

/// One line per column: name, dtype, nulls, distinct values, cardinality and warnings.
pub fn render_profile(metadata: &MetadataResponse) -> String {
    let headers = ["column", "dtype", "nulls", "unique", "cardinality", "samples", "warnings"]
        .map(String::from);
    let rows = metadata.columns.iter().map(profile_row).collect::<Vec<_>>();
    let mut rendered = format!(
        "{} ({}): {} of {}{} row(s) profiled, {} column(s)\n\n",
        metadata.source.file_type,
        metadata.source.encoding.as_deref().unwrap_or("workbook"),
        metadata.row_count,
        if metadata.total_rows_estimated { "~" } else { "" },
        metadata.total_rows,
        metadata.column_count
    );
    rendered.push_str(&render_table(&headers, &rows));
    if !metadata.suggested_operations.is_empty() {
        rendered.push_str("\nSuggested operations:\n");
        for suggestion in &metadata.suggested_operations {
            let _ = writeln!(rendered, "  {}  # {}", suggestion.example, suggestion.reason);
        }
    }
    for warning in &metadata.warnings {
        let _ = writeln!(rendered, "warning: {warning}");
    }
    rendered
}

fn profile_row(profile: &ColumnProfile) -> Vec<String> {
    let samples = profile
        .sample_values
        .iter()
        .map(|value| match value {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    let warnings = match &profile.error {
        Some(message) => format!("error: {message}"),
        None => profile
            .warnings
            .iter()
            .map(|code| code.as_str())
            .collect::<Vec<_>>()
            .join(","),
    };
    vec![
        profile.name.clone(),
        profile.dtype.clone(),
        profile.null_count.to_string(),
        profile.unique_count.to_string(),
        format!("{:?}", profile.cardinality).to_lowercase(),
        samples,
        warnings,
    ]
}

fn format_row(values: &[String], widths: &[usize], right_align: &[bool]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .zip(right_align)
        .map(|((value, width), right)| {
            let cell = clip(sanitize_cell(value));
            let padding = " ".repeat(width.saturating_sub(cell.chars().count()));
            if *right {
                format!("{padding}{cell}")
            } else {
                format!("{cell}{padding}")
            }
        })
        .collect::<Vec<_>>()
        .join(COLUMN_GAP);
    while line.ends_with(' ') {
        line.pop();
    }
    line
}

fn cell_width(value: &str) -> usize {
    value.chars().count().min(MAX_CELL_WIDTH)
}

fn clip(value: Cow<'_, str>) -> String {
    if value.chars().count() <= MAX_CELL_WIDTH {
        return value.into_owned();
    }
    let mut clipped = value.chars().take(MAX_CELL_WIDTH - 3).collect::<String>();
    clipped.push_str("...");
    clipped
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
