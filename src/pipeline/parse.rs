//! Record parsing: normalised oracle text → schema-conformant records.
//!
//! Two wire shapes are accepted, chosen by [`OutputShape`]:
//!
//! * **Delimited** (default): one record per line, tab-separated, columns in
//!   schema order, no header line. A row with the wrong column count aborts
//!   the whole document: padding or truncating would silently shift values
//!   into the wrong columns.
//! * **JSON** (legacy): one object, or an array of objects, keyed by field
//!   key. Absent keys become null.
//!
//! In both shapes every cell goes through [`FieldValue::from_cell`], so the
//! null literal, the decimal-point rule and the date check are applied the
//! same way.

use crate::config::OutputShape;
use crate::record::{FieldValue, Record};
use crate::schema::{FieldSpec, Schema};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The text is not the expected structure at all (e.g. invalid JSON).
    #[error("malformed structure: {detail}")]
    Malformed { detail: String },

    /// The structure is readable but does not fit the schema.
    #[error("schema mismatch: {detail}")]
    SchemaMismatch { detail: String },
}

/// Parse a normalised reply in the configured shape.
pub fn parse_response(
    shape: OutputShape,
    text: &str,
    schema: &'static Schema,
    null_literal: &str,
) -> Result<Vec<Record>, ParseError> {
    match shape {
        OutputShape::Delimited => parse_delimited(text, schema, null_literal),
        OutputShape::Json => parse_json(text, schema, null_literal),
    }
}

/// Parse header-less tab-separated rows.
///
/// Lines that are empty or hold only spaces are skipped. A line of bare tabs
/// is a row of empty cells and must match the column count like any other.
/// Surrounding spaces are trimmed from each cell; tabs are the only separator.
pub fn parse_delimited(
    text: &str,
    schema: &'static Schema,
    null_literal: &str,
) -> Result<Vec<Record>, ParseError> {
    let mut records = Vec::new();

    for (line_idx, line) in text.split('\n').enumerate() {
        if line.trim_matches([' ', '\r']).is_empty() {
            continue;
        }
        let row = line_idx + 1;
        let cells: Vec<&str> = line.split('\t').collect();
        if cells.len() != schema.len() {
            return Err(ParseError::SchemaMismatch {
                detail: format!(
                    "row {} has {} columns, expected {}",
                    row,
                    cells.len(),
                    schema.len()
                ),
            });
        }

        let values = schema
            .fields()
            .iter()
            .zip(cells)
            .map(|(field, cell)| cell_value(field, cell.trim(), null_literal, row))
            .collect::<Result<Vec<_>, _>>()?;

        records.push(build_record(schema, values)?);
    }

    debug!("Parsed {} delimited rows", records.len());
    Ok(records)
}

/// Parse one JSON object, or an array of objects.
pub fn parse_json(
    text: &str,
    schema: &'static Schema,
    null_literal: &str,
) -> Result<Vec<Record>, ParseError> {
    let value: Value = serde_json::from_str(text).map_err(|e| ParseError::Malformed {
        detail: format!("invalid JSON: {e}"),
    })?;

    let objects: Vec<Map<String, Value>> = match value {
        Value::Object(obj) => vec![obj],
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(obj) => Ok(obj),
                other => Err(ParseError::Malformed {
                    detail: format!(
                        "array element {} is {}, expected an object",
                        i + 1,
                        json_type(&other)
                    ),
                }),
            })
            .collect::<Result<_, _>>()?,
        other => {
            return Err(ParseError::Malformed {
                detail: format!("expected a JSON object, got {}", json_type(&other)),
            })
        }
    };

    let mut records = Vec::with_capacity(objects.len());
    for (i, obj) in objects.iter().enumerate() {
        let row = i + 1;
        for key in obj.keys() {
            if schema.index_of(key).is_none() {
                debug!("Ignoring unknown key '{}' in record {}", key, row);
            }
        }
        let values = schema
            .fields()
            .iter()
            .map(|field| json_value(field, obj.get(field.key), null_literal, row))
            .collect::<Result<Vec<_>, _>>()?;
        records.push(build_record(schema, values)?);
    }

    debug!("Parsed {} JSON records", records.len());
    Ok(records)
}

fn json_value(
    field: &FieldSpec,
    value: Option<&Value>,
    null_literal: &str,
    row: usize,
) -> Result<FieldValue, ParseError> {
    match value {
        None | Some(Value::Null) => Ok(FieldValue::Null),
        Some(Value::String(s)) => cell_value(field, s.trim(), null_literal, row),
        Some(Value::Number(n)) => cell_value(field, &n.to_string(), null_literal, row),
        Some(Value::Bool(b)) => cell_value(field, &b.to_string(), null_literal, row),
        Some(other) => Err(ParseError::SchemaMismatch {
            detail: format!(
                "record {}: field '{}' is {}, expected a scalar",
                row,
                field.key,
                json_type(other)
            ),
        }),
    }
}

fn cell_value(
    field: &FieldSpec,
    cell: &str,
    null_literal: &str,
    row: usize,
) -> Result<FieldValue, ParseError> {
    FieldValue::from_cell(cell, field, null_literal).map_err(|e| ParseError::SchemaMismatch {
        detail: format!("row {row}: {e}"),
    })
}

fn build_record(schema: &'static Schema, values: Vec<FieldValue>) -> Result<Record, ParseError> {
    Record::from_values(schema, values).map_err(|e| ParseError::SchemaMismatch {
        detail: e.to_string(),
    })
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
