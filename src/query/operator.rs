//! Query-builder operator names.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    BeginsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    In,
    NotIn,
    IsEmpty,
    IsNotEmpty,
}

impl Operator {
    /// Accepts the report builder's camelCase names, the symbolic forms
    /// react-query-builder emits, and the snake_case names older saved
    /// reports use.
    pub fn parse(s: &str) -> Option<Self> {
        let op = match s {
            "equals" | "=" => Self::Equals,
            "notEquals" | "not_equals" | "!=" => Self::NotEquals,
            "contains" => Self::Contains,
            "notContains" | "not_contains" | "doesNotContain" => Self::NotContains,
            "beginsWith" => Self::BeginsWith,
            "endsWith" => Self::EndsWith,
            "greaterThan" | "gt" | ">" => Self::GreaterThan,
            "lessThan" | "lt" | "<" => Self::LessThan,
            "greaterThanOrEqual" | "gte" | ">=" => Self::GreaterThanOrEqual,
            "lessThanOrEqual" | "lte" | "<=" => Self::LessThanOrEqual,
            "in" => Self::In,
            "notIn" => Self::NotIn,
            "isEmpty" => Self::IsEmpty,
            "isNotEmpty" => Self::IsNotEmpty,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::Contains => "contains",
            Self::NotContains => "notContains",
            Self::BeginsWith => "beginsWith",
            Self::EndsWith => "endsWith",
            Self::GreaterThan => "greaterThan",
            Self::LessThan => "lessThan",
            Self::GreaterThanOrEqual => "greaterThanOrEqual",
            Self::LessThanOrEqual => "lessThanOrEqual",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::IsEmpty => "isEmpty",
            Self::IsNotEmpty => "isNotEmpty",
        }
    }
}
