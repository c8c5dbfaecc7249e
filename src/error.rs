//! Compiler error taxonomy.

use thiserror::Error;

/// Short code reported to callers for any rejected schema or query input.
pub const INVALID_INPUT: &str = "INVALID_INPUT";

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("Duplicate column: {0}")]
    DuplicateIdentifier(String),
    #[error("Unknown field {field:?} referenced by {context}")]
    UnknownField { field: String, context: &'static str },
    #[error("Unmapped field type: {0}")]
    UnmappedType(String),
    #[error("Default value {value} does not fit field {field} of type {typ}")]
    InvalidDefault {
        field: String,
        typ: String,
        value: String,
    },
    #[error("Malformed rule: {0}")]
    MalformedRule(String),
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),
    #[error("Unknown combinator: {0}")]
    UnknownCombinator(String),
    #[error("Rule nesting exceeds maximum depth of {0}")]
    DepthExceeded(usize),
    #[error("Invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompileError {
    pub fn code(&self) -> &'static str {
        INVALID_INPUT
    }
}
