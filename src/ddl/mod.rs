//! Schema compiler: user-defined field lists to physical storage definitions.

pub mod ast;
mod compiler;
mod render;
pub mod types;

pub use ast::{ColumnConstraint, ColumnDef, DefaultExpr, Statement, StorageDefinition};
pub use compiler::{
    compile_field, compile_table, SchemaCompiler, CREATED_AT_COLUMN, ID_COLUMN, SCHEMA_COLUMN, UPDATED_AT_COLUMN,
};
pub use render::{render_column, render_default};
pub use types::{map_field_type, StorageType};
