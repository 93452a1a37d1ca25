//! Optional input sanitisation for string values of request bodies.

use crate::record::Record;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn suspicious_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            ("sql", r"(?i)(union\s+select|drop\s+table|delete\s+from|insert\s+into|update\s+set)"),
            ("sql", r"(?i)(exec\s*\(|execute\s*\(|sp_executesql)"),
            ("xss", r"(?i)(<\s*script|<\s*iframe|<\s*object|<\s*embed|<\s*applet)"),
            ("xss", r"(?i)(javascript:|vbscript:|onload=|onerror=|onclick=)"),
        ]
        .into_iter()
        .map(|(kind, p)| (kind, Regex::new(p).expect("sanitize pattern")))
        .collect()
    })
}

/// HTML-escapes, strips NUL bytes and trims.
pub fn sanitize_str(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            '\0' => {}
            c => out.push(c),
        }
    }
    out.trim().to_string()
}

/// Sanitises every string of the record in place, nested values included. Suspicious
/// input is logged, not rejected.
pub fn sanitize_record(table: &str, record: &mut Record) {
    for (column, value) in record.iter_mut() {
        sanitize_value(table, column, value);
    }
}

fn sanitize_value(table: &str, column: &str, value: &mut Value) {
    match value {
        Value::String(s) => {
            if let Some((kind, _)) = suspicious_patterns().iter().find(|(_, re)| re.is_match(s)) {
                tracing::warn!(table = %table, column = %column, kind = %kind, "suspicious input");
            }
            *s = sanitize_str(s);
        }
        Value::Array(items) => items.iter_mut().for_each(|v| sanitize_value(table, column, v)),
        Value::Object(map) => map.values_mut().for_each(|v| sanitize_value(table, column, v)),
        _ => {}
    }
}
