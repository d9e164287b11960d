use std::fmt;

use crate::value::{Record, Value};

/// A dotted field path such as `dest.code` or `_id.airline`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    Empty,
    EmptySegment(usize),
    DollarPrefix(String),
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::Empty => write!(f, "field path is empty"),
            PathError::EmptySegment(index) => {
                write!(f, "field path has an empty segment at position {}", index)
            }
            PathError::DollarPrefix(segment) => {
                write!(f, "field path segment '{}' must not start with '$'", segment)
            }
        }
    }
}

impl std::error::Error for PathError {}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        let mut segments = Vec::new();
        for (index, segment) in path.split('.').enumerate() {
            if segment.is_empty() {
                return Err(PathError::EmptySegment(index));
            }
            if segment.starts_with('$') {
                return Err(PathError::DollarPrefix(segment.to_string()));
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The first segment, i.e. the top-level field this path lives under.
    pub fn head(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Looks up `path` in `record`; `None` means the field is missing.
pub fn resolve(record: &Record, path: &FieldPath) -> Option<Value> {
    let (first, rest) = path.segments.split_first()?;
    resolve_value(record.get(first)?, rest)
}

/// Walks `segments` below `value`.
///
/// A numeric segment indexes an array; any other segment applied to an
/// array is mapped over its elements, dropping elements where it is missing.
pub fn resolve_value(value: &Value, segments: &[String]) -> Option<Value> {
    let Some((segment, rest)) = segments.split_first() else {
        return Some(value.clone());
    };
    match value {
        Value::Record(fields) => resolve_value(fields.get(segment)?, rest),
        Value::Array(items) => {
            if let Ok(index) = segment.parse::<usize>() {
                return resolve_value(items.get(index)?, rest);
            }
            let mapped = items
                .iter()
                .filter(|item| matches!(item, Value::Record(_) | Value::Array(_)))
                .filter_map(|item| resolve_value(item, segments))
                .collect();
            Some(Value::Array(mapped))
        }
        _ => None,
    }
}

/// Sets `path` in `record`, creating (or replacing non-record) intermediate
/// fields. An existing field keeps its position.
pub fn set(record: &mut Record, path: &FieldPath, value: Value) {
    let Some((last, parents)) = path.segments.split_last() else {
        return;
    };
    let mut current = record;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Record(Record::new()));
        if !matches!(entry, Value::Record(_)) {
            *entry = Value::Record(Record::new());
        }
        match entry {
            Value::Record(fields) => current = fields,
            _ => return,
        }
    }
    current.insert(last.clone(), value);
}

/// Removes `path` from `record`, preserving the order of remaining fields.
pub fn remove(record: &mut Record, path: &FieldPath) -> Option<Value> {
    let (last, parents) = path.segments.split_last()?;
    let mut current = record;
    for segment in parents {
        match current.get_mut(segment) {
            Some(Value::Record(fields)) => current = fields,
            _ => return None,
        }
    }
    current.shift_remove(last)
}

#[cfg(test)]
mod path_tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Value::from(value).into_record().expect("record")
    }

    fn path(s: &str) -> FieldPath {
        FieldPath::parse(s).expect("valid path")
    }

    #[test]
    fn parse_rejects_malformed_paths() {
        assert_eq!(FieldPath::parse(""), Err(PathError::Empty));
        assert_eq!(FieldPath::parse("a..b"), Err(PathError::EmptySegment(1)));
        assert!(matches!(FieldPath::parse("a.$b"), Err(PathError::DollarPrefix(_))));
        assert_eq!(path("dest.code").to_string(), "dest.code");
    }

    #[test]
    fn resolve_nested_and_missing() {
        let rec = record(json!({"dest": {"code": "SFO"}, "year": 2020}));
        assert_eq!(resolve(&rec, &path("dest.code")), Some(Value::from("SFO")));
        assert_eq!(resolve(&rec, &path("dest.state")), None);
        assert_eq!(resolve(&rec, &path("year.value")), None);
    }

    #[test]
    fn resolve_through_arrays() {
        let rec = record(json!({"flights": [{"airline": "X"}, {"airline": "Y"}, 3, {"other": 1}]}));
        assert_eq!(
            resolve(&rec, &path("flights.airline")),
            Some(Value::from(json!(["X", "Y"])))
        );
        assert_eq!(resolve(&rec, &path("flights.1.airline")), Some(Value::from("Y")));
        assert_eq!(resolve(&rec, &path("flights.9")), None);
    }

    #[test]
    fn set_creates_intermediate_records() {
        let mut rec = record(json!({"a": 1, "b": 2}));
        set(&mut rec, &path("a"), Value::Int(10));
        set(&mut rec, &path("c.d"), Value::Bool(true));
        assert_eq!(Value::Record(rec), Value::from(json!({"a": 10, "b": 2, "c": {"d": true}})));
    }

    #[test]
    fn remove_preserves_order() {
        let mut rec = record(json!({"a": 1, "b": {"x": 1, "y": 2}, "c": 3}));
        assert_eq!(remove(&mut rec, &path("a")), Some(Value::Int(1)));
        assert_eq!(remove(&mut rec, &path("b.x")), Some(Value::Int(1)));
        assert_eq!(remove(&mut rec, &path("z.q")), None);
        assert_eq!(Value::Record(rec), Value::from(json!({"b": {"y": 2}, "c": 3})));
    }
}
