//! LookML view rendering.
//!
//! One `view:` block per table. Column SQL types map onto LookML dimension
//! types; temporal columns become `dimension_group`s and every view gets a
//! `count` measure drilling into its primary key (when one is known).

use std::fmt::Write;

use crate::collaborators::{ColumnSchema, TableDescription, TableSchema};

const TIME_TIMEFRAMES: &str = "[raw, time, date, week, month, quarter, year]";
const DATE_TIMEFRAMES: &str = "[raw, date, week, month, quarter, year]";

/// Suffixes stripped from temporal column names to form the group name.
const TIME_SUFFIXES: [&str; 4] = ["_at", "_date", "_time", "_ts"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Number,
    String,
    YesNo,
    Time,
    Date,
}

/// Map a warehouse column type to a LookML field type.
pub fn field_type(data_type: &str) -> FieldType {
    let t = data_type.trim().to_lowercase();
    let base = t.split(['(', ' ']).next().unwrap_or_default();
    match base {
        "int" | "int2" | "int4" | "int8" | "integer" | "bigint" | "smallint" | "tinyint"
        | "numeric" | "decimal" | "float" | "float4" | "float8" | "float64" | "int64"
        | "double" | "real" | "number" | "money" => FieldType::Number,
        "bool" | "boolean" => FieldType::YesNo,
        "date" => FieldType::Date,
        "timestamp" | "timestamptz" | "datetime" | "time" | "timestamp_ntz" | "timestamp_tz"
        | "timestamp_ltz" => FieldType::Time,
        _ => FieldType::String,
    }
}

/// Lowercase LookML-safe identifier.
pub fn identifier(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn group_name(column: &str) -> String {
    let id = identifier(column);
    TIME_SUFFIXES
        .iter()
        .find_map(|suffix| id.strip_suffix(suffix).filter(|s| !s.is_empty()))
        .map(str::to_string)
        .unwrap_or(id)
}

fn quote(text: &str) -> String {
    let single_line: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("\"{}\"", single_line.replace('\\', "\\\\").replace('"', "\\\""))
}

fn render_column(out: &mut String, column: &ColumnSchema, description: Option<&str>) {
    let name = identifier(&column.name);
    let ty = field_type(&column.data_type);

    match ty {
        FieldType::Time | FieldType::Date => {
            let _ = writeln!(out, "  dimension_group: {} {{", group_name(&column.name));
            let _ = writeln!(out, "    type: time");
            let frames = if ty == FieldType::Date {
                DATE_TIMEFRAMES
            } else {
                TIME_TIMEFRAMES
            };
            let _ = writeln!(out, "    timeframes: {frames}");
            if ty == FieldType::Date {
                let _ = writeln!(out, "    convert_tz: no");
                let _ = writeln!(out, "    datatype: date");
            }
        }
        _ => {
            let _ = writeln!(out, "  dimension: {name} {{");
            if column.primary_key {
                let _ = writeln!(out, "    primary_key: yes");
            }
            let lookml_type = match ty {
                FieldType::Number => "number",
                FieldType::YesNo => "yesno",
                _ => "string",
            };
            let _ = writeln!(out, "    type: {lookml_type}");
        }
    }
    let _ = writeln!(out, "    sql: ${{TABLE}}.{} ;;", column.name);
    if let Some(desc) = description.filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(out, "    description: {}", quote(desc));
    }
    let _ = writeln!(out, "  }}");
}

/// Render a single view.
pub fn render_view(table: &TableSchema, description: Option<&TableDescription>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "view: {} {{", identifier(&table.name));
    let _ = writeln!(out, "  sql_table_name: {} ;;", table.qualified_name());
    if let Some(desc) = description.filter(|d| !d.description.trim().is_empty()) {
        let _ = writeln!(out, "  description: {}", quote(&desc.description));
    }

    for column in &table.columns {
        out.push('\n');
        render_column(&mut out, column, description.and_then(|d| d.column(&column.name)));
    }

    let keys: Vec<String> = table
        .columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| identifier(&c.name))
        .collect();
    out.push('\n');
    let _ = writeln!(out, "  measure: count {{");
    let _ = writeln!(out, "    type: count");
    if !keys.is_empty() {
        let _ = writeln!(out, "    drill_fields: [{}]", keys.join(", "));
    }
    let _ = writeln!(out, "  }}");
    let _ = writeln!(out, "}}");
    out
}

/// Render every table into one LookML file, views separated by blank lines.
pub fn render(tables: &[TableSchema], descriptions: &[TableDescription]) -> String {
    tables
        .iter()
        .map(|t| render_view(t, descriptions.iter().find(|d| d.table == t.name)))
        .collect::<Vec<_>>()
        .join("\n")
}
