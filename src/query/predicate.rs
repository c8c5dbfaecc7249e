//! Structured filter predicate over a record's JSON document.

use super::rule::Combinator;

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// No filtering.
    True,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Condition { field: String, test: Test },
}

/// Comparison applied to the text value of one document key.
#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    Equals(String),
    NotEquals(String),
    /// Case-insensitive pattern match.
    Like { pattern: Pattern, negated: bool },
    /// Numeric comparison; `value` is a validated decimal literal.
    Compare { op: CompareOp, value: String },
    In { values: Vec<String>, negated: bool },
    /// NULL or empty string.
    Empty { negated: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Contains(String),
    Prefix(String),
    Suffix(String),
}

impl Pattern {
    pub fn text(&self) -> &str {
        match self {
            Self::Contains(s) | Self::Prefix(s) | Self::Suffix(s) => s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }
}

impl Predicate {
    pub fn condition(field: impl Into<String>, test: Test) -> Self {
        Self::Condition {
            field: field.into(),
            test,
        }
    }

    /// Join `parts` under `combinator`. No parts means no filtering.
    pub fn join(combinator: Combinator, parts: Vec<Predicate>) -> Self {
        if parts.is_empty() {
            return Self::True;
        }
        match combinator {
            Combinator::And => Self::And(parts),
            Combinator::Or => Self::Or(parts),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Self::True)
    }
}
