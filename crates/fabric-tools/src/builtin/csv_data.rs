// SPDX-License-Identifier: MIT OR Apache-2.0
//! CSV parse/stringify.

use crate::{ToolError, ToolPlugin, object_schema, opt_bool, require_str};
use async_trait::async_trait;
use fabric_core::{ToolDescriptor, ToolProvider};
use std::collections::BTreeMap;

/// CSV parsing and serialization.
pub struct CsvTool;

#[async_trait]
impl ToolPlugin for CsvTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            tool_id: "data.csv".into(),
            category: "data".into(),
            description: "Parse CSV text and serialize rows back to CSV".into(),
            capabilities: BTreeMap::from([
                ("parse".to_string(), "do_parse".to_string()),
                ("stringify".to_string(), "do_stringify".to_string()),
            ]),
            provider: ToolProvider::Builtin,
            input_schemas: BTreeMap::from([
                (
                    "parse".to_string(),
                    object_schema(
                        &["csv"],
                        serde_json::json!({
                            "csv": {"type": "string"},
                            "headers": {"type": "boolean"},
                        }),
                    ),
                ),
                (
                    "stringify".to_string(),
                    object_schema(
                        &["rows"],
                        serde_json::json!({"rows": {"type": "array"}}),
                    ),
                ),
            ]),
        }
    }

    async fn execute(
        &self,
        capability: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        match capability {
            "parse" => {
                let csv_text = require_str(params, "csv")?;
                let headers = opt_bool(params, "headers").unwrap_or(true);

                let mut reader = csv::ReaderBuilder::new()
                    .has_headers(headers)
                    .from_reader(csv_text.as_bytes());

                if headers {
                    let header_row: Vec<String> = reader
                        .headers()
                        .map_err(|e| ToolError::new("CSV_PARSE_FAILED", e.to_string()))?
                        .iter()
                        .map(String::from)
                        .collect();
                    let mut rows = Vec::new();
                    for record in reader.records() {
                        let record =
                            record.map_err(|e| ToolError::new("CSV_PARSE_FAILED", e.to_string()))?;
                        let mut row = serde_json::Map::new();
                        for (key, value) in header_row.iter().zip(record.iter()) {
                            row.insert(key.clone(), serde_json::json!(value));
                        }
                        rows.push(serde_json::Value::Object(row));
                    }
                    let count = rows.len();
                    Ok(serde_json::json!({"rows": rows, "count": count}))
                } else {
                    let mut rows = Vec::new();
                    for record in reader.records() {
                        let record =
                            record.map_err(|e| ToolError::new("CSV_PARSE_FAILED", e.to_string()))?;
                        let row: Vec<String> = record.iter().map(String::from).collect();
                        rows.push(serde_json::json!(row));
                    }
                    let count = rows.len();
                    Ok(serde_json::json!({"rows": rows, "count": count}))
                }
            }
            "stringify" => {
                let rows = params
                    .get("rows")
                    .and_then(serde_json::Value::as_array)
                    .ok_or_else(|| ToolError::invalid_params("'rows' must be an array"))?;

                let mut writer = csv::Writer::from_writer(Vec::new());
                // Object rows get a header line from the first row's keys.
                if let Some(first) = rows.first().and_then(serde_json::Value::as_object) {
                    let keys: Vec<&String> = first.keys().collect();
                    writer
                        .write_record(keys.iter().map(|k| k.as_str()))
                        .map_err(|e| ToolError::new("CSV_WRITE_FAILED", e.to_string()))?;
                    for row in rows {
                        let obj = row.as_object().ok_or_else(|| {
                            ToolError::invalid_params("rows must all be objects")
                        })?;
                        let record: Vec<String> =
                            keys.iter().map(|k| cell_text(obj.get(*k))).collect();
                        writer
                            .write_record(&record)
                            .map_err(|e| ToolError::new("CSV_WRITE_FAILED", e.to_string()))?;
                    }
                } else {
                    for row in rows {
                        let cells = row.as_array().ok_or_else(|| {
                            ToolError::invalid_params("rows must all be arrays")
                        })?;
                        let record: Vec<String> =
                            cells.iter().map(|c| cell_text(Some(c))).collect();
                        writer
                            .write_record(&record)
                            .map_err(|e| ToolError::new("CSV_WRITE_FAILED", e.to_string()))?;
                    }
                }

                let bytes = writer
                    .into_inner()
                    .map_err(|e| ToolError::new("CSV_WRITE_FAILED", e.to_string()))?;
                let csv_text = String::from_utf8(bytes)
                    .map_err(|_| ToolError::new("CSV_WRITE_FAILED", "non-UTF-8 output"))?;
                Ok(serde_json::json!({"csv": csv_text}))
            }
            other => Err(ToolError::invalid_params(format!("unknown capability '{other}'"))),
        }
    }
}

fn cell_text(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
