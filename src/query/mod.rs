//! Report filters: react-query-builder rule trees compiled to SQL `WHERE`
//! predicates over the record document column.

pub mod compiler;
mod eval;
pub mod operator;
pub mod predicate;
mod render;
pub mod rule;

pub use compiler::{compile_query, CompiledQuery, QueryCompiler, QueryScope};
pub use operator::Operator;
pub use predicate::{Predicate, Test};
pub use render::{field_path, DATA_COLUMN};
pub use rule::{Combinator, QueryBuilderValue, QueryRule};
