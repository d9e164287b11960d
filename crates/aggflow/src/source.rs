//! Record sources: JSON arrays, newline-delimited JSON and CSV text.

use serde_json::Value as JsonValue;

use crate::error::{ExecError, ExecErrorKind};
use crate::model::{ColumnType, CsvInput, InputFormat, InputSpec};
use crate::path::{self, FieldPath};
use crate::value::{Number, Record, Value};

pub fn read_records(text: &str, spec: &InputSpec) -> Result<Vec<Record>, ExecError> {
    let records = match spec.format {
        InputFormat::Json => read_json(text)?,
        InputFormat::Ndjson => read_ndjson(text)?,
        InputFormat::Csv => read_csv(text, &spec.csv.clone().unwrap_or_default())?,
    };
    tracing::debug!(format = ?spec.format, records = records.len(), "records loaded");
    Ok(records)
}

fn invalid_input(message: impl Into<String>) -> ExecError {
    ExecError::new(ExecErrorKind::InvalidInput, message)
}

fn into_record(value: JsonValue, location: &str) -> Result<Record, ExecError> {
    match Value::from(value) {
        Value::Record(record) => Ok(record),
        other => Err(invalid_input(format!(
            "{} must be an object, found {}",
            location,
            other.type_name()
        ))),
    }
}

/// A JSON array of objects, or a single object.
fn read_json(text: &str) -> Result<Vec<Record>, ExecError> {
    match serde_json::from_str::<JsonValue>(text)? {
        JsonValue::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| into_record(item, &format!("records[{}]", i)))
            .collect(),
        object @ JsonValue::Object(_) => Ok(vec![into_record(object, "record")?]),
        other => Err(invalid_input(format!(
            "expected an array of records, found {}",
            Value::from(other).type_name()
        ))),
    }
}

fn read_ndjson(text: &str) -> Result<Vec<Record>, ExecError> {
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: JsonValue = serde_json::from_str(line)
            .map_err(|err| invalid_input(format!("line {}: {}", index + 1, err)))?;
        records.push(into_record(value, &format!("line {}", index + 1))?);
    }
    Ok(records)
}

/// Where a CSV column lands in the output record.
struct CsvTarget {
    name: String,
    field: Option<FieldPath>,
    kind: CellKind,
}

/// One kind per column, so cells of a column always compare by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Declared(ColumnType),
    Number,
    Bool,
    Text,
}

fn read_csv(text: &str, csv_input: &CsvInput) -> Result<Vec<Record>, ExecError> {
    let delimiter = match csv_input.delimiter.as_bytes() {
        [byte] => *byte,
        _ => return Err(invalid_input("csv delimiter must be a single byte")),
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(csv_input.has_header)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let headers: Option<Vec<String>> = if csv_input.has_header {
        Some(reader.headers()?.iter().map(str::to_string).collect())
    } else {
        None
    };
    let rows = reader.records().collect::<Result<Vec<_>, _>>()?;

    let names: Vec<String> = match (&csv_input.columns, headers) {
        (Some(columns), _) => columns.iter().map(|column| column.name.clone()).collect(),
        (None, Some(names)) => names,
        (None, None) => {
            let width = rows.first().map_or(0, |row| row.len());
            (1..=width).map(|i| format!("column_{}", i)).collect()
        }
    };
    let targets: Vec<CsvTarget> = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let declared = csv_input
                .columns
                .as_ref()
                .and_then(|columns| columns.get(i))
                .and_then(|column| column.value_type);
            let kind = match declared {
                Some(value_type) => CellKind::Declared(value_type),
                None => infer_kind(rows.iter().filter_map(|row| row.get(i))),
            };
            // dotted names build nested records
            let field = FieldPath::parse(&name).ok();
            CsvTarget { name, field, kind }
        })
        .collect();

    let mut records = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        if row.len() != targets.len() {
            return Err(invalid_input(format!(
                "csv record {} has {} fields; expected {}",
                index + 1,
                row.len(),
                targets.len()
            )));
        }
        let mut record = Record::with_capacity(targets.len());
        for (target, cell) in targets.iter().zip(row.iter()) {
            let value = convert_cell(cell, target.kind).map_err(|expected| {
                invalid_input(format!(
                    "csv record {}, column {}: expected {}, found {:?}",
                    index + 1,
                    target.name,
                    expected,
                    cell
                ))
            })?;
            match &target.field {
                Some(field) => path::set(&mut record, field, value),
                None => {
                    record.insert(target.name.clone(), value);
                }
            }
        }
        records.push(record);
    }
    Ok(records)
}

/// A column of booleans is `Bool` and a column of numbers is `Number`,
/// unless one of them has a leading zero such as `0905`, which makes the
/// whole column text.
fn infer_kind<'a>(cells: impl Iterator<Item = &'a str>) -> CellKind {
    let mut seen = false;
    let mut all_bool = true;
    let mut all_number = true;
    let mut leading_zero = false;
    for cell in cells.map(str::trim).filter(|cell| !cell.is_empty()) {
        seen = true;
        all_bool &= parse_bool(cell).is_some();
        all_number &= parse_number(cell).is_some();
        leading_zero |= has_leading_zero(cell);
    }
    if !seen {
        CellKind::Text
    } else if all_bool {
        CellKind::Bool
    } else if all_number && !leading_zero {
        CellKind::Number
    } else {
        CellKind::Text
    }
}

/// Empty cells are null in every kind. The error names the expected type.
fn convert_cell(cell: &str, kind: CellKind) -> Result<Value, &'static str> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    let text = || Value::String(cell.to_string());
    match kind {
        CellKind::Text | CellKind::Declared(ColumnType::String) => Ok(text()),
        CellKind::Number => Ok(parse_number(trimmed).map(Value::from).unwrap_or_else(text)),
        CellKind::Bool => Ok(parse_bool(trimmed).map(Value::Bool).unwrap_or_else(text)),
        CellKind::Declared(ColumnType::Int) => trimmed.parse::<i64>().map(Value::Int).map_err(|_| ColumnType::Int.as_str()),
        CellKind::Declared(ColumnType::Float) => parse_number(trimmed)
            .map(|number| Value::Float(number.as_f64()))
            .ok_or(ColumnType::Float.as_str()),
        CellKind::Declared(ColumnType::Bool) => parse_bool(trimmed).map(Value::Bool).ok_or(ColumnType::Bool.as_str()),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<Number> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::Int(i));
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && s.bytes().any(|b| b.is_ascii_digit()) => Some(Number::Float(f)),
        _ => None,
    }
}

fn has_leading_zero(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    let bytes = digits.as_bytes();
    bytes.len() > 1 && bytes[0] == b'0' && bytes[1].is_ascii_digit()
}

pub fn records_to_json(records: &[Record]) -> JsonValue {
    JsonValue::Array(
        records
            .iter()
            .map(|record| {
                JsonValue::Object(
                    record
                        .iter()
                        .map(|(name, value)| (name.clone(), JsonValue::from(value)))
                        .collect(),
                )
            })
            .collect(),
    )
}
