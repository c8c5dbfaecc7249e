//! Evaluate predicates against record documents in memory, with the same
//! results the rendered SQL gives in PostgreSQL.

use super::predicate::{CompareOp, Pattern, Predicate, Test};
use crate::ident::json_text;
use serde_json::Value;

impl Predicate {
    /// Whether `document` passes the filter. A comparison against a missing
    /// or null key is SQL NULL and never matches.
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Predicate::True => true,
            Predicate::And(parts) => parts.iter().all(|p| p.matches(document)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(document)),
            Predicate::Condition { field, test } => {
                let text = document.get(field.as_str()).and_then(json_text);
                test_text(test, text.as_deref())
            }
        }
    }
}

fn test_text(test: &Test, text: Option<&str>) -> bool {
    match (test, text) {
        (Test::Empty { negated }, text) => text.is_none_or(str::is_empty) != *negated,
        (_, None) => false,
        (Test::Equals(v), Some(text)) => text == v,
        (Test::NotEquals(v), Some(text)) => text != v,
        (Test::Like { pattern, negated }, Some(text)) => like(text, pattern) != *negated,
        (Test::Compare { op, value }, Some(text)) => compare(text, *op, value),
        (Test::In { values, negated }, Some(text)) => values.iter().any(|v| v == text) != *negated,
    }
}

fn like(text: &str, pattern: &Pattern) -> bool {
    let text = text.to_lowercase();
    let needle = pattern.text().to_lowercase();
    match pattern {
        Pattern::Contains(_) => text.contains(&needle),
        Pattern::Prefix(_) => text.starts_with(&needle),
        Pattern::Suffix(_) => text.ends_with(&needle),
    }
}

/// Non-numeric text would make the SQL cast fail; here it simply does not
/// match.
fn compare(text: &str, op: CompareOp, value: &str) -> bool {
    let (Ok(lhs), Ok(rhs)) = (text.trim().parse::<f64>(), value.parse::<f64>()) else {
        return false;
    };
    match op {
        CompareOp::Gt => lhs > rhs,
        CompareOp::Lt => lhs < rhs,
        CompareOp::Ge => lhs >= rhs,
        CompareOp::Le => lhs <= rhs,
    }
}
