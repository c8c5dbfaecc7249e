//! Rule trees as the report builder sends them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Root of a report filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryBuilderValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combinator: Option<String>,
    #[serde(default)]
    pub rules: Vec<QueryRule>,
}

impl QueryBuilderValue {
    pub fn new(combinator: Combinator, rules: Vec<QueryRule>) -> Self {
        Self {
            combinator: Some(combinator.as_sql().to_ascii_lowercase()),
            rules,
        }
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// One node of the tree. Every attribute is optional on the wire; see
/// [`QueryRule::node`] for how a node is classified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combinator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<QueryRule>>,
}

/// Borrowed, classified view of a [`QueryRule`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleNode<'a> {
    Leaf {
        field: Option<&'a str>,
        operator: Option<&'a str>,
        value: &'a Value,
    },
    Group {
        combinator: Option<&'a str>,
        rules: &'a [QueryRule],
    },
}

impl QueryRule {
    pub fn leaf(field: &str, operator: &str, value: impl Into<Value>) -> Self {
        Self {
            field: Some(field.to_string()),
            operator: Some(operator.to_string()),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn group(combinator: Combinator, rules: Vec<QueryRule>) -> Self {
        Self {
            combinator: Some(combinator.as_sql().to_ascii_lowercase()),
            rules: Some(rules),
            ..Self::default()
        }
    }

    /// A node with child rules is a group. A node carrying an empty child
    /// list and no field or operator is an empty group. Everything else is
    /// a leaf, whether or not it is well formed.
    pub fn node(&self) -> RuleNode<'_> {
        let is_group = match &self.rules {
            Some(rules) if !rules.is_empty() => true,
            Some(_) => self.field.is_none() && self.operator.is_none(),
            None => false,
        };

        if is_group {
            RuleNode::Group {
                combinator: self.combinator.as_deref(),
                rules: self.rules.as_deref().unwrap_or_default(),
            }
        } else {
            RuleNode::Leaf {
                field: self.field.as_deref(),
                operator: self.operator.as_deref(),
                value: &self.value,
            }
        }
    }
}
