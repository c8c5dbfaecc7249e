//! Identifier normalization and literal quoting.
//!
//! Every piece of user text that ends up inside generated SQL passes through
//! one of these functions.

use crate::error::CompileError;
use serde_json::Value;

/// PostgreSQL truncates identifiers longer than this.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Lowercase `name` and collapse each whitespace run into a single `_`.
/// A name with nothing but whitespace and underscores is rejected.
pub fn normalize_identifier(name: &str) -> Result<String, CompileError> {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;

    for c in name.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
                in_space = true;
            }
        } else {
            out.extend(c.to_lowercase());
            in_space = false;
        }
    }

    if out.chars().any(|c| c != '_') && is_valid_identifier(&out) {
        Ok(out)
    } else {
        Err(CompileError::InvalidIdentifier(name.to_string()))
    }
}

/// Keywords PostgreSQL refuses as unquoted table or column names.
const RESERVED: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "between", "binary", "both", "case", "cast", "check", "collate",
    "collation", "column", "concurrently", "constraint", "create", "cross",
    "current_catalog", "current_date", "current_role", "current_schema", "current_time",
    "current_timestamp", "current_user", "default", "deferrable", "desc", "distinct", "do",
    "else", "end", "except", "false", "fetch", "for", "foreign", "freeze", "from", "full",
    "grant", "group", "having", "ilike", "in", "initially", "inner", "intersect", "into",
    "is", "isnull", "join", "lateral", "leading", "left", "like", "limit", "localtime",
    "localtimestamp", "natural", "not", "notnull", "null", "offset", "on", "only", "or",
    "order", "outer", "overlaps", "placing", "primary", "references", "returning", "right",
    "select", "session_user", "similar", "some", "symmetric", "table", "tablesample", "then",
    "to", "trailing", "true", "union", "unique", "user", "using", "variadic", "verbose",
    "when", "where", "window", "with",
];

/// ASCII letters, digits and underscores, not starting with a digit and
/// not a reserved keyword.
pub fn is_valid_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if ident.len() > MAX_IDENTIFIER_LEN || first.is_ascii_digit() || RESERVED.contains(&ident) {
        return false;
    }
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Double every single quote so `value` can sit inside a `'...'` literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Escape and wrap in single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", escape_literal(value))
}

/// Return the trimmed text if it is a finite decimal literal safe to splice
/// into SQL unquoted.
pub fn numeric_literal(text: &str) -> Option<&str> {
    let text = text.trim();
    let charset_ok = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    match text.parse::<f64>() {
        Ok(n) if charset_ok && n.is_finite() => Some(text),
        _ => None,
    }
}

/// Text form of a JSON value as PostgreSQL's `->>` operator yields it.
/// `None` stands for SQL NULL.
pub fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize_identifier("Customer").unwrap(), "customer");
        assert_eq!(
            normalize_identifier("Customer Profile").unwrap(),
            "customer_profile"
        );
        assert_eq!(
            normalize_identifier("Order  \t Line").unwrap(),
            "order_line"
        );
    }

    #[test]
    fn test_normalize_keeps_edge_whitespace_as_underscore() {
        assert_eq!(normalize_identifier(" Lead ").unwrap(), "_lead_");
        assert_eq!(normalize_identifier("_id").unwrap(), "_id");
    }

    #[test]
    fn test_normalize_rejects_invalid() {
        for bad in ["", "   ", " \t ", "_", " _ ", "123", "2fa codes", "first-name", "naïve", "a;drop", "Order", "USER"] {
            let err = normalize_identifier(bad).unwrap_err();
            assert!(
                matches!(err, CompileError::InvalidIdentifier(ref s) if s == bad),
                "expected InvalidIdentifier for {bad:?}"
            );
        }
    }

    #[test]
    fn test_normalize_rejects_overlong() {
        let name = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(normalize_identifier(&name).is_err());
        assert!(normalize_identifier(&name[1..]).is_ok());
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
        assert_eq!(quote_literal("''"), "''''''");
        assert_eq!(escape_literal("plain"), "plain");
    }

    #[test]
    fn test_numeric_literal() {
        assert_eq!(numeric_literal(" 42 "), Some("42"));
        assert_eq!(numeric_literal("-1.5e3"), Some("-1.5e3"));
        assert_eq!(numeric_literal("1; DROP TABLE x"), None);
        assert_eq!(numeric_literal("NaN"), None);
        assert_eq!(numeric_literal("inf"), None);
        assert_eq!(numeric_literal(""), None);
    }

    #[test]
    fn test_json_text() {
        assert_eq!(json_text(&Value::from("a")), Some("a".to_string()));
        assert_eq!(json_text(&Value::from(3)), Some("3".to_string()));
        assert_eq!(json_text(&Value::from(true)), Some("true".to_string()));
        assert_eq!(json_text(&Value::Null), None);
        assert_eq!(
            json_text(&serde_json::json!({"a": 1})),
            Some("{\"a\":1}".to_string())
        );
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(name in "[A-Za-z_][A-Za-z0-9_ \t]{0,40}") {
            if let Ok(once) = normalize_identifier(&name) {
                prop_assert_eq!(normalize_identifier(&once).unwrap(), once);
            }
        }

        #[test]
        fn escaped_literal_has_only_paired_quotes(value in ".*") {
            let escaped = escape_literal(&value);
            prop_assert_eq!(escaped.replace("''", "").contains('\''), false);
        }
    }
}
