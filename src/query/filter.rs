//! Filter grammar: `column[operator]=value` pairs in the query string.

use crate::error::ApiError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
    Between,
    Contains,
    IsNull,
    NotNull,
    Search,
}

impl FromStr for Operator {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "eq" => Operator::Eq,
            "neq" => Operator::Neq,
            "gt" => Operator::Gt,
            "lt" => Operator::Lt,
            "gte" => Operator::Gte,
            "lte" => Operator::Lte,
            "in" => Operator::In,
            "notin" => Operator::NotIn,
            "between" => Operator::Between,
            "contains" => Operator::Contains,
            "isnull" => Operator::IsNull,
            "notnull" => Operator::NotNull,
            "search" => Operator::Search,
            other => return Err(ApiError::InvalidFilterCondition(other.to_string())),
        };
        Ok(op)
    }
}

impl Operator {
    pub fn token(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::NotIn => "notin",
            Operator::Between => "between",
            Operator::Contains => "contains",
            Operator::IsNull => "isnull",
            Operator::NotNull => "notnull",
            Operator::Search => "search",
        }
    }

    pub const ALL: [Operator; 13] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Lt,
        Operator::Gte,
        Operator::Lte,
        Operator::In,
        Operator::NotIn,
        Operator::Between,
        Operator::Contains,
        Operator::IsNull,
        Operator::NotNull,
        Operator::Search,
    ];
}

/// One parsed `column[operator]=value` term. `value` is already URL-decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterClause {
    pub column: String,
    pub operator: Operator,
    pub value: String,
}

impl FilterClause {
    /// Comma-separated members for `in`/`notin`. Embedded commas cannot be escaped.
    pub fn list(&self) -> Vec<&str> {
        self.value.split(',').collect()
    }

    /// Both `between` bounds, formatted `YYYY-MM-DD HH:MM:SS`.
    pub fn between_bounds(&self) -> Result<(String, String), ApiError> {
        let parts = self.list();
        if parts.len() != 2 {
            return Err(ApiError::BadRequest(format!(
                "invalid filter value for between operator, expected 2 values got {}",
                parts.len()
            )));
        }
        let parse = |p: &str| {
            parse_timestamp(p)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .ok_or_else(|| {
                    ApiError::BadRequest(format!(
                        "invalid filter value for between operator, expected date got {p}"
                    ))
                })
        };
        Ok((parse(parts[0])?, parse(parts[1])?))
    }
}

fn clause_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_-]*)\[([^\]]*)\]$").expect("filter key pattern"))
}

/// Parses every bracketed filter term of a raw query string, in order of appearance.
/// Keys without brackets (`order`, `page`, ...) are not filters and are skipped.
/// Any unknown operator or malformed `between` fails the whole parse.
pub fn parse_filters(raw_query: &str) -> Result<Vec<FilterClause>, ApiError> {
    let re = clause_key_regex();
    let mut clauses = Vec::new();
    for (key, value) in form_urlencoded::parse(raw_query.as_bytes()) {
        let Some(caps) = re.captures(&key) else {
            continue;
        };
        let operator: Operator = caps[2].parse()?;
        let clause = FilterClause {
            column: caps[1].to_string(),
            operator,
            value: value.into_owned(),
        };
        if operator == Operator::Between {
            clause.between_bounds()?;
        }
        clauses.push(clause);
    }
    Ok(clauses)
}

/// Accepts RFC 3339, `YYYY-MM-DD[ T]HH:MM:SS[.fff]` and bare dates.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clause(column: &str, operator: Operator, value: &str) -> FilterClause {
        FilterClause {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    #[test]
    fn parses_clauses_and_skips_plain_params() {
        let got = parse_filters("unit_price[gte]=50&order=name.asc&name[contains]=Milk%20Chocolate&deleted_at[isnull]").unwrap();
        assert_eq!(
            got,
            vec![
                clause("unit_price", Operator::Gte, "50"),
                clause("name", Operator::Contains, "Milk Chocolate"),
                clause("deleted_at", Operator::IsNull, ""),
            ]
        );
    }

    #[test]
    fn clause_order_does_not_change_triples() {
        let a = parse_filters("a[eq]=1&b[in]=x,y").unwrap();
        let mut b = parse_filters("b[in]=x,y&a[eq]=1").unwrap();
        b.reverse();
        assert_eq!(a, b);
        assert_eq!(a[1].list(), vec!["x", "y"]);
    }

    #[test]
    fn brackets_may_arrive_percent_encoded() {
        let got = parse_filters("price%5Blt%5D=3").unwrap();
        assert_eq!(got, vec![clause("price", Operator::Lt, "3")]);
    }

    #[test]
    fn every_operator_token_round_trips() {
        for op in Operator::ALL {
            assert_eq!(op.token().parse::<Operator>().unwrap(), op);
        }
    }

    #[test]
    fn unknown_operator_rejects_whole_query() {
        let err = parse_filters("a[eq]=1&b[like]=x").unwrap_err();
        assert!(matches!(err, ApiError::InvalidFilterCondition(ref op) if op == "like"));
        assert!(parse_filters("a[EQ]=1").is_err());
        assert!(parse_filters("a[]=1").is_err());
    }

    #[test]
    fn between_requires_two_timestamps() {
        let ok = parse_filters("created[between]=2024-01-01,2024-02-01T10:00:00Z").unwrap();
        assert_eq!(
            ok[0].between_bounds().unwrap(),
            ("2024-01-01 00:00:00".to_string(), "2024-02-01 10:00:00".to_string())
        );
        for bad in [
            "created[between]=2024-01-01",
            "created[between]=2024-01-01,2024-01-02,2024-01-03",
            "created[between]=2024-01-01,yesterday",
            "created[between]=",
        ] {
            let err = parse_filters(bad).unwrap_err();
            assert_eq!(err.status().as_u16(), 400, "{bad}");
        }
    }
}
