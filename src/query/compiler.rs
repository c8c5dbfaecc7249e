//! Query predicate compiler: rule trees to predicates.
//!
//! Permissive by default: malformed leaves, unknown operators and unknown
//! combinators are dropped or defaulted and logged at debug level. With
//! `strict` set they are reported as errors instead. Nesting depth is
//! bounded in both modes.

use super::operator::Operator;
use super::predicate::{CompareOp, Pattern, Predicate, Test};
use super::rule::{Combinator, QueryBuilderValue, QueryRule, RuleNode};
use crate::config::CompilerOptions;
use crate::error::CompileError;
use crate::ident::{json_text, numeric_literal};
use serde_json::Value;

/// Compiled report filter. The tenant filter is added separately by
/// [`CompiledQuery::select_sql`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub predicate: Predicate,
}

/// Where a compiled query runs: the table, and the columns the caller binds
/// as `$1` (tenant) and `$2` (schema, if scoped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryScope {
    pub table: String,
    pub tenant_column: String,
    pub schema_column: Option<String>,
    pub exclude_deleted: bool,
}

impl Default for QueryScope {
    fn default() -> Self {
        Self {
            table: "erb_records".to_string(),
            tenant_column: "tenant_id".to_string(),
            schema_column: None,
            exclude_deleted: true,
        }
    }
}

impl CompiledQuery {
    /// The user filter alone.
    pub fn to_sql(&self) -> String {
        self.predicate.to_sql()
    }

    pub fn select_sql(&self, scope: &QueryScope) -> String {
        let mut sql = format!(
            "SELECT data FROM {} WHERE {} = $1",
            scope.table, scope.tenant_column
        );
        if let Some(column) = &scope.schema_column {
            sql.push_str(&format!(" AND {column} = $2"));
        }
        if scope.exclude_deleted {
            sql.push_str(" AND is_deleted = FALSE");
        }
        if !self.predicate.is_true() {
            sql.push_str(&format!(" AND ({})", self.predicate.to_sql()));
        }
        sql
    }
}

/// Compile with default (permissive) options.
pub fn compile_query(query: &QueryBuilderValue) -> Result<CompiledQuery, CompileError> {
    QueryCompiler::default().compile_query(query)
}

#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    options: CompilerOptions,
}

impl QueryCompiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    pub fn compile_query(&self, query: &QueryBuilderValue) -> Result<CompiledQuery, CompileError> {
        let predicate = self.compile_group(&query.rules, query.combinator.as_deref())?;
        Ok(CompiledQuery { predicate })
    }

    /// An empty group, or one whose children were all dropped, is
    /// [`Predicate::True`].
    pub fn compile_group(
        &self,
        rules: &[QueryRule],
        combinator: Option<&str>,
    ) -> Result<Predicate, CompileError> {
        self.group_at(rules, combinator, 1)
    }

    fn group_at(
        &self,
        rules: &[QueryRule],
        combinator: Option<&str>,
        depth: usize,
    ) -> Result<Predicate, CompileError> {
        if depth > self.options.max_depth {
            return Err(CompileError::DepthExceeded(self.options.max_depth));
        }
        let combinator = self.combinator(combinator)?;

        let mut parts = Vec::with_capacity(rules.len());
        for rule in rules {
            match rule.node() {
                RuleNode::Group { combinator, rules } => {
                    let child = self.group_at(rules, combinator, depth + 1)?;
                    if !child.is_true() {
                        parts.push(child);
                    }
                }
                RuleNode::Leaf {
                    field,
                    operator,
                    value,
                } => {
                    let field = field.map(str::trim).filter(|f| !f.is_empty());
                    let operator = operator.map(str::trim).filter(|o| !o.is_empty());
                    let (Some(field), Some(operator)) = (field, operator) else {
                        self.malformed("rule is missing a field or operator")?;
                        continue;
                    };
                    if let Some(p) = self.compile_condition(field, operator, value)? {
                        parts.push(p);
                    }
                }
            }
        }

        Ok(Predicate::join(combinator, parts))
    }

    fn combinator(&self, raw: Option<&str>) -> Result<Combinator, CompileError> {
        let Some(raw) = raw else {
            return Ok(Combinator::And);
        };
        match Combinator::parse(raw) {
            Some(c) => Ok(c),
            None if self.options.strict => Err(CompileError::UnknownCombinator(raw.to_string())),
            None => {
                tracing::debug!(combinator = %raw, "Unknown combinator, using AND");
                Ok(Combinator::And)
            }
        }
    }

    /// Compile one leaf. `Ok(None)` means the leaf was dropped.
    pub fn compile_condition(
        &self,
        field: &str,
        operator: &str,
        value: &Value,
    ) -> Result<Option<Predicate>, CompileError> {
        let Some(op) = Operator::parse(operator) else {
            if self.options.strict {
                return Err(CompileError::UnknownOperator(operator.to_string()));
            }
            tracing::debug!(%field, %operator, "Dropping rule with unknown operator");
            return Ok(None);
        };

        let test = match op {
            Operator::Equals => Test::Equals(text_operand(value)),
            Operator::NotEquals => Test::NotEquals(text_operand(value)),
            Operator::Contains => like(Pattern::Contains(text_operand(value)), false),
            Operator::NotContains => like(Pattern::Contains(text_operand(value)), true),
            Operator::BeginsWith => like(Pattern::Prefix(text_operand(value)), false),
            Operator::EndsWith => like(Pattern::Suffix(text_operand(value)), false),
            Operator::GreaterThan => return self.compare(field, CompareOp::Gt, value),
            Operator::LessThan => return self.compare(field, CompareOp::Lt, value),
            Operator::GreaterThanOrEqual => return self.compare(field, CompareOp::Ge, value),
            Operator::LessThanOrEqual => return self.compare(field, CompareOp::Le, value),
            Operator::In | Operator::NotIn => {
                let values = list_operand(value);
                if values.is_empty() {
                    self.malformed(&format!("{} on {field} needs at least one value", op.as_str()))?;
                    return Ok(None);
                }
                Test::In {
                    values,
                    negated: op == Operator::NotIn,
                }
            }
            Operator::IsEmpty => Test::Empty { negated: false },
            Operator::IsNotEmpty => Test::Empty { negated: true },
        };

        Ok(Some(Predicate::condition(field, test)))
    }

    fn compare(
        &self,
        field: &str,
        op: CompareOp,
        value: &Value,
    ) -> Result<Option<Predicate>, CompileError> {
        let literal = match value {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => numeric_literal(s).map(str::to_string),
            _ => None,
        };
        match literal {
            Some(value) => Ok(Some(Predicate::condition(field, Test::Compare { op, value }))),
            None => {
                self.malformed(&format!("{field} {} {value} is not numeric", op.as_sql()))?;
                Ok(None)
            }
        }
    }

    /// Error in strict mode; otherwise log and let the caller drop the rule.
    fn malformed(&self, reason: &str) -> Result<(), CompileError> {
        if self.options.strict {
            return Err(CompileError::MalformedRule(reason.to_string()));
        }
        tracing::debug!(%reason, "Dropping malformed rule");
        Ok(())
    }
}

fn like(pattern: Pattern, negated: bool) -> Test {
    Test::Like { pattern, negated }
}

/// Null compares as the empty string.
fn text_operand(value: &Value) -> String {
    json_text(value).unwrap_or_default()
}

/// A scalar is a one-element list.
fn list_operand(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(text_operand).collect(),
        scalar => vec![text_operand(scalar)],
    }
}
