//! Render predicates to PostgreSQL `WHERE` fragments over a JSONB `data`
//! column.

use super::predicate::{Pattern, Predicate, Test};
use crate::ident::{escape_literal, quote_literal};

/// Column holding the record document.
pub const DATA_COLUMN: &str = "data";

/// `data->>'key'`, the text value of one document key.
pub fn field_path(field: &str) -> String {
    format!("{DATA_COLUMN}->>{}", quote_literal(field))
}

impl Predicate {
    pub fn to_sql(&self) -> String {
        match self {
            Predicate::True => "TRUE".to_string(),
            Predicate::And(parts) => join_parts(parts, " AND "),
            Predicate::Or(parts) => join_parts(parts, " OR "),
            Predicate::Condition { field, test } => render_condition(field, test),
        }
    }
}

fn join_parts(parts: &[Predicate], sep: &str) -> String {
    parts
        .iter()
        .map(|p| match p {
            Predicate::And(_) | Predicate::Or(_) => format!("({})", p.to_sql()),
            _ => p.to_sql(),
        })
        .collect::<Vec<_>>()
        .join(sep)
}

fn render_condition(field: &str, test: &Test) -> String {
    let path = field_path(field);
    match test {
        Test::Equals(v) => format!("{path} = {}", quote_literal(v)),
        Test::NotEquals(v) => format!("{path} != {}", quote_literal(v)),
        Test::Like { pattern, negated } => {
            let not = if *negated { "NOT " } else { "" };
            format!("{path} {not}ILIKE '{}'", like_pattern(pattern))
        }
        Test::Compare { op, value } => format!("CAST({path} AS NUMERIC) {} {value}", op.as_sql()),
        Test::In { values, negated } => {
            let not = if *negated { "NOT " } else { "" };
            let list: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
            format!("{path} {not}IN ({})", list.join(","))
        }
        Test::Empty { negated: false } => format!("({path} IS NULL OR {path} = '')"),
        Test::Empty { negated: true } => format!("({path} IS NOT NULL AND {path} != '')"),
    }
}

/// LIKE pattern body with the user's text matched literally.
fn like_pattern(pattern: &Pattern) -> String {
    let text = escape_literal(&escape_like(pattern.text()));
    match pattern {
        Pattern::Contains(_) => format!("%{text}%"),
        Pattern::Prefix(_) => format!("{text}%"),
        Pattern::Suffix(_) => format!("%{text}"),
    }
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
