//! Terminal rendering of previews for the CLI.

use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{Preview, RowMap};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Output format for `preview`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PreviewFormat {
    /// Pretty-printed JSON (default)
    #[default]
    Json,
    /// Boxed ASCII table
    Table,
    /// Markdown table
    Markdown,
}

/// Display text of one cell. NULL renders as `NULL`.
pub fn display_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render `preview` in `format`. `elapsed_ms` goes into the table footer.
pub fn render_preview(
    preview: &Preview,
    format: PreviewFormat,
    elapsed_ms: u64,
) -> ConnectorResult<String> {
    let names: Vec<&str> = preview.columns.iter().map(|c| c.name.as_str()).collect();
    match format {
        PreviewFormat::Json => serde_json::to_string_pretty(preview)
            .map_err(|e| ConnectorError::internal(format!("Failed to encode preview: {}", e))),
        PreviewFormat::Table => Ok(render_table(&names, &preview.rows, elapsed_ms)),
        PreviewFormat::Markdown => Ok(render_markdown(&names, &preview.rows)),
    }
}

fn pad(text: &str, width: usize, right_align: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(text.width()));
    if right_align {
        format!("{}{}", fill, text)
    } else {
        format!("{}{}", text, fill)
    }
}

fn render_table(names: &[&str], rows: &[RowMap], elapsed_ms: u64) -> String {
    if names.is_empty() {
        return "Empty set\n".to_string();
    }

    let cells: Vec<Vec<(String, bool)>> = rows
        .iter()
        .map(|row| {
            names
                .iter()
                .map(|name| {
                    let value = row.get(*name).unwrap_or(&JsonValue::Null);
                    (display_value(value), value.is_number())
                })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = names.iter().map(|n| n.width()).collect();
    for row in &cells {
        for (i, (text, _)) in row.iter().enumerate() {
            widths[i] = widths[i].max(text.width());
        }
    }

    let separator = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut out = separator.clone();
    for (name, w) in names.iter().zip(&widths) {
        out.push_str(&format!("| {} ", pad(name, *w, false)));
    }
    out.push_str("|\n");
    out.push_str(&separator);

    for row in &cells {
        for ((text, numeric), w) in row.iter().zip(&widths) {
            out.push_str(&format!("| {} ", pad(text, *w, *numeric)));
        }
        out.push_str("|\n");
    }
    out.push_str(&separator);

    let noun = if rows.len() == 1 { "row" } else { "rows" };
    out.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        rows.len(),
        noun,
        elapsed_ms as f64 / 1000.0
    ));
    out
}

fn render_markdown(names: &[&str], rows: &[RowMap]) -> String {
    if names.is_empty() {
        return "*Empty set*\n".to_string();
    }
    let escape = |s: &str| s.replace('|', "\\|").replace('\n', " ");

    let mut out = String::new();
    for name in names {
        out.push_str(&format!("| {} ", escape(name)));
    }
    out.push_str("|\n");
    out.push_str(&"|---".repeat(names.len()));
    out.push_str("|\n");

    for row in rows {
        for name in names {
            let value = row.get(*name).unwrap_or(&JsonValue::Null);
            out.push_str(&format!("| {} ", escape(&display_value(value))));
        }
        out.push_str("|\n");
    }
    out.push_str(&format!("\n*{} rows*\n", rows.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::ColumnType;
    use crate::models::ColumnSchema;
    use serde_json::json;

    fn preview() -> Preview {
        let mut first = RowMap::new();
        first.insert("id".into(), json!(1));
        first.insert("name".into(), json!("café"));
        let mut second = RowMap::new();
        second.insert("id".into(), json!(20));
        second.insert("name".into(), JsonValue::Null);
        Preview {
            columns: vec![
                ColumnSchema::new("id", ColumnType::UInt32),
                ColumnSchema::new("name", ColumnType::String.nullable()),
            ],
            rows: vec![first, second],
            row_count: 2,
        }
    }

    #[test]
    fn test_table_layout() {
        let out = render_preview(&preview(), PreviewFormat::Table, 1500).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "+----+------+");
        assert_eq!(lines[1], "| id | name |");
        assert_eq!(lines[3], "|  1 | café |");
        assert_eq!(lines[4], "| 20 | NULL |");
        assert_eq!(lines[6], "2 rows in set (1.50 sec)");
    }

    #[test]
    fn test_markdown_escapes_pipes() {
        let mut p = preview();
        p.rows[0].insert("name".into(), json!("a|b"));
        let out = render_preview(&p, PreviewFormat::Markdown, 0).unwrap();
        assert!(out.starts_with("| id | name |\n|---|---|\n"));
        assert!(out.contains("| 1 | a\\|b |"));
        assert!(out.ends_with("*2 rows*\n"));
    }

    #[test]
    fn test_json_output() {
        let out = render_preview(&preview(), PreviewFormat::Json, 0).unwrap();
        let parsed: JsonValue = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["row_count"], 2);
        assert_eq!(parsed["columns"][1]["type"], "Nullable(String)");
    }

    #[test]
    fn test_empty_columns() {
        let empty = Preview {
            columns: vec![],
            rows: vec![],
            row_count: 0,
        };
        assert_eq!(
            render_preview(&empty, PreviewFormat::Table, 0).unwrap(),
            "Empty set\n"
        );
    }
}
