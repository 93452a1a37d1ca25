//! Record validation from field rules. Every failing field is reported, not just the first.

use crate::config::{FieldInfo, ModelSchema, ValidationRule};
use crate::error::{ApiError, FieldError};
use crate::record::{is_zero, Record};
use regex::Regex;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationMode {
    /// Create and full update: every field with rules is checked, `required` included.
    Full,
    /// Partial update: only fields holding a non-zero value are checked.
    NonZero,
}

/// Checks `record` against the schema's rules; 412 with the collected list on failure.
pub fn validate_record(schema: &ModelSchema, record: &Record, mode: ValidationMode) -> Result<(), ApiError> {
    let mut errors = Vec::new();
    for field in schema.fields.iter().filter(|f| !f.validation.is_empty()) {
        let value = record.get(&field.column).unwrap_or(&Value::Null);
        if mode == ValidationMode::NonZero && is_zero(value) {
            continue;
        }
        if let Some(message) = check_field(field, value, &field.validation) {
            errors.push(FieldError::new(&field.column, message));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        tracing::debug!(table = %schema.table, count = errors.len(), "validation failed");
        Err(ApiError::Validation(errors))
    }
}

/// First rule `value` breaks, as a message.
fn check_field(field: &FieldInfo, v: &Value, rule: &ValidationRule) -> Option<String> {
    let col = &field.column;
    if is_zero(v) {
        if rule.required == Some(true) && !(field.primary_key && field.is_generated()) {
            return Some(format!("{} is required", col));
        }
        if v.is_null() {
            return None;
        }
    }
    if let Some(format) = &rule.format {
        if let Some(message) = check_format(col, v, format) {
            return Some(message);
        }
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                return Some(format!("{} must be at most {} characters", col, max));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                return Some(format!("{} must be at least {} characters", col, min));
            }
        }
        if let Some(exact) = rule.length {
            if len != exact as usize {
                return Some(format!("{} must be exactly {} characters", col, exact));
            }
        }
        if let Some(ref pattern) = rule.pattern {
            match Regex::new(pattern) {
                Ok(re) if re.is_match(s) => {}
                Ok(_) => return Some(format!("{} does not match required pattern", col)),
                Err(_) => return Some(format!("invalid pattern for {}", col)),
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Some(format!(
                "{} must be one of: {}",
                col,
                allowed.iter().take(5).map(Value::to_string).collect::<Vec<_>>().join(", ")
            ));
        }
    }
    let number = v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()));
    if let Some(n) = number {
        if let Some(min) = rule.minimum {
            if n < min {
                return Some(format!("{} must be at least {}", col, min));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Some(format!("{} must be at most {}", col, max));
            }
        }
    }
    None
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn check_format(col: &str, v: &Value, format: &str) -> Option<String> {
    let s = v.as_str()?;
    let ok = match format.to_lowercase().as_str() {
        "email" => {
            let mut parts = s.splitn(2, '@');
            let local = parts.next().unwrap_or_default();
            let domain = parts.next().unwrap_or_default();
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        "uuid" => uuid::Uuid::parse_str(s).is_ok(),
        "alpha" => s.chars().all(char::is_alphabetic),
        "alphanumeric" => s.chars().all(char::is_alphanumeric),
        "numeric" => s.parse::<f64>().is_ok(),
        _ => true,
    };
    if ok {
        None
    } else {
        Some(format!("{} must be a valid {}", col, format.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldKind;
    use serde_json::json;

    fn customer() -> ModelSchema {
        ModelSchema::new("customer")
            .with_field(FieldInfo::new("customer_id", FieldKind::Int).primary_key().auto_increment().validate(
                ValidationRule {
                    required: Some(true),
                    ..Default::default()
                },
            ))
            .with_field(FieldInfo::new("email", FieldKind::String).validate(ValidationRule {
                required: Some(true),
                format: Some("email".into()),
                ..Default::default()
            }))
            .with_field(FieldInfo::new("country", FieldKind::String).validate(ValidationRule {
                length: Some(2),
                ..Default::default()
            }))
            .with_field(FieldInfo::new("age", FieldKind::Int).validate(ValidationRule {
                minimum: Some(18.0),
                maximum: Some(120.0),
                ..Default::default()
            }))
    }

    fn rec(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn collects_every_failing_field() {
        let err = validate_record(
            &customer(),
            &rec(json!({ "email": "nope", "country": "DEU", "age": 30 })),
            ValidationMode::Full,
        )
        .unwrap_err();
        match err {
            ApiError::Validation(list) => {
                let fields: Vec<_> = list.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["email", "country"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn required_applies_only_in_full_mode() {
        let schema = customer();
        let patch = rec(json!({ "age": 40 }));
        assert!(validate_record(&schema, &patch, ValidationMode::Full).is_err());
        assert!(validate_record(&schema, &patch, ValidationMode::NonZero).is_ok());
        let bad_patch = rec(json!({ "age": 12 }));
        assert!(validate_record(&schema, &bad_patch, ValidationMode::NonZero).is_err());
    }

    #[test]
    fn generated_primary_key_is_not_required_on_create() {
        let ok = rec(json!({ "email": "a@b.io" }));
        assert!(validate_record(&customer(), &ok, ValidationMode::Full).is_ok());
    }
}
