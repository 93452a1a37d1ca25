//! Records keyed by column name, and the schema-driven operations on them: body coercion,
//! zero tests, override patching and Set equivalence.

use crate::config::{FieldInfo, FieldKind, ModelSchema, SetMatch};
use crate::error::ApiError;
use crate::query::filter::parse_timestamp;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

pub type Record = Map<String, Value>;

/// Zero value in the "not set" sense: null, false, 0, empty string or empty container.
pub fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Typed value for a query-string token (filters, path keys).
pub fn value_from_str(field: &FieldInfo, s: &str) -> Value {
    match field.kind {
        FieldKind::Int => {
            if let Ok(n) = s.parse::<i64>() {
                return Value::Number(n.into());
            }
        }
        FieldKind::Float => {
            if let Some(n) = s.parse::<f64>().ok().and_then(Number::from_f64) {
                return Value::Number(n);
            }
        }
        FieldKind::Bool => {
            if s.eq_ignore_ascii_case("true") || s == "1" {
                return Value::Bool(true);
            }
            if s.eq_ignore_ascii_case("false") || s == "0" {
                return Value::Bool(false);
            }
        }
        FieldKind::Uuid => {
            if let Ok(u) = uuid::Uuid::parse_str(s) {
                return Value::String(u.to_string());
            }
        }
        _ => {}
    }
    Value::String(s.to_string())
}

/// Primary key path segment, rejected when it does not fit the column kind.
pub fn parse_key(field: &FieldInfo, s: &str) -> Result<Value, ApiError> {
    Ok(match field.kind {
        FieldKind::Uuid => {
            let u = uuid::Uuid::parse_str(s).map_err(|_| ApiError::BadRequest("invalid uuid".into()))?;
            Value::String(u.to_string())
        }
        FieldKind::Int => {
            let n: i64 = s.parse().map_err(|_| ApiError::BadRequest("invalid id".into()))?;
            Value::Number(n.into())
        }
        _ => value_from_str(field, s),
    })
}

fn type_error(field: &FieldInfo) -> ApiError {
    ApiError::BadRequest(format!("invalid value for {}: expected {}", field.column, field.kind.name()))
}

/// Converts one JSON body value to the column's kind. Null passes through.
pub fn coerce_value(field: &FieldInfo, value: Value) -> Result<Value, ApiError> {
    let out = match (field.kind, value) {
        (_, Value::Null) => Value::Null,
        (FieldKind::Int, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                Value::Number(n)
            } else {
                return Err(type_error(field));
            }
        }
        (FieldKind::Int, Value::String(s)) => {
            let n: i64 = s.trim().parse().map_err(|_| type_error(field))?;
            Value::Number(n.into())
        }
        (FieldKind::Float, Value::Number(n)) => Value::Number(n),
        (FieldKind::Float, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| type_error(field))?,
        (FieldKind::Decimal, Value::Number(n)) => Value::Number(n),
        (FieldKind::Decimal, Value::String(s)) => {
            s.trim().parse::<f64>().map_err(|_| type_error(field))?;
            Value::String(s.trim().to_string())
        }
        (FieldKind::Bool, Value::Bool(b)) => Value::Bool(b),
        (FieldKind::Bool, Value::String(s)) => match s.to_lowercase().as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" | "" => Value::Bool(false),
            _ => return Err(type_error(field)),
        },
        (FieldKind::Uuid, Value::String(s)) => {
            if s.is_empty() {
                Value::String(s)
            } else {
                let u = uuid::Uuid::parse_str(&s).map_err(|_| type_error(field))?;
                Value::String(u.to_string())
            }
        }
        (FieldKind::Timestamp | FieldKind::Date, Value::String(s)) => {
            if !s.is_empty() && parse_timestamp(&s).is_none() {
                return Err(type_error(field));
            }
            Value::String(s)
        }
        (FieldKind::String, Value::String(s)) => Value::String(s),
        (FieldKind::Json, v) => v,
        _ => return Err(type_error(field)),
    };
    Ok(out)
}

fn body_field<'a>(schema: &'a ModelSchema, key: &str) -> Option<&'a FieldInfo> {
    schema.field(key).or_else(|| schema.fields.iter().find(|f| f.name == key))
}

/// Builds a record from a JSON object body. Keys may be column or field names; keys that
/// name no column (relations included) are dropped, so associations are never written.
pub fn coerce_body(schema: &ModelSchema, value: Value) -> Result<Record, ApiError> {
    let Value::Object(body) = value else {
        return Err(ApiError::BadRequest("body must be a JSON object".into()));
    };
    let mut record = Record::new();
    for (key, v) in body {
        if let Some(field) = body_field(schema, &key) {
            record.insert(field.column.clone(), coerce_value(field, v)?);
        }
    }
    Ok(record)
}

pub fn coerce_array(schema: &ModelSchema, value: Value) -> Result<Vec<Record>, ApiError> {
    let Value::Array(items) = value else {
        return Err(ApiError::BadRequest("body must be a JSON array".into()));
    };
    items.into_iter().map(|item| coerce_body(schema, item)).collect()
}

/// Copies every non-zero field of `patch` onto `target`.
pub fn merge_non_zero(target: &mut Record, patch: &Record) {
    for (k, v) in patch {
        if !is_zero(v) {
            target.insert(k.clone(), v.clone());
        }
    }
}

/// Override patch: its non-zero fields clobber whatever the record holds. A zero-valued
/// override field cannot be told apart from "not overridden".
pub fn apply_override(record: &mut Record, override_: Option<&Record>) {
    if let Some(o) = override_ {
        merge_non_zero(record, o);
    }
}

/// Ordering of two scalar values: numerically when both are numeric, as instants when
/// both are timestamps, otherwise by string form.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => {
            if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
                return x.partial_cmp(&y);
            }
            let (sa, sb) = (scalar_string(a), scalar_string(b));
            if let (Some(x), Some(y)) = (parse_timestamp(&sa), parse_timestamp(&sb)) {
                return Some(x.cmp(&y));
            }
            Some(sa.cmp(&sb))
        }
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Some(Ordering::Equal)
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn scalar_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether a stored row and a submitted entry count as the same member of a Set.
/// Only the model's own columns take part; nested values are skipped.
pub fn records_equivalent(schema: &ModelSchema, stored: &Record, submitted: &Record, policy: SetMatch) -> bool {
    let null = Value::Null;
    for field in &schema.fields {
        let a = stored.get(&field.column).unwrap_or(&null);
        let b = submitted.get(&field.column).unwrap_or(&null);
        if field.kind != FieldKind::Json && (a.is_object() || b.is_object()) {
            continue;
        }
        match policy {
            SetMatch::IgnoreZero => {
                if is_zero(a) || is_zero(b) {
                    continue;
                }
            }
            SetMatch::PresentFields => {
                if !submitted.contains_key(&field.column) {
                    continue;
                }
                if a.is_null() && b.is_null() {
                    continue;
                }
            }
        }
        let same = if field.kind == FieldKind::Json {
            a == b
        } else {
            values_equal(a, b)
        };
        if !same {
            return false;
        }
    }
    true
}

/// Response form of a stored record: hidden columns removed.
pub fn to_response(schema: &ModelSchema, mut record: Record) -> Value {
    for field in schema.fields.iter().filter(|f| f.hidden) {
        record.remove(&field.column);
    }
    Value::Object(record)
}
