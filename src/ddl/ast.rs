//! Structured storage definition produced by the schema compiler.

use super::types::StorageType;

#[derive(Debug, Clone, PartialEq)]
pub struct StorageDefinition {
    pub table_name: String,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(Table),
    CreateIndex(Index),
    AddForeignKey(ForeignKey),
    EnableRowSecurity { table: String },
    CreatePolicy(Policy),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Table-level composite primary key, when no column carries `PrimaryKey`.
    pub primary_key: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub typ: StorageType,
    pub constraints: Vec<ColumnConstraint>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, typ: StorageType) -> Self {
        Self {
            name: name.into(),
            typ,
            constraints: Vec::new(),
        }
    }

    pub fn with(mut self, constraint: ColumnConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn has(&self, constraint: &ColumnConstraint) -> bool {
        self.constraints.contains(constraint)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnConstraint {
    PrimaryKey,
    NotNull,
    Unique,
    Default(DefaultExpr),
    References {
        table: String,
        column: String,
        on_delete: Option<RefAction>,
    },
}

/// A column default, kept typed until rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultExpr {
    Text(String),
    /// Already validated as a finite decimal literal.
    Numeric(String),
    Boolean(bool),
    Json(String),
    TextArray(Vec<String>),
    GeneratedUuid,
    UtcNow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefAction {
    Cascade,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    /// Partial index over rows where every indexed column is set.
    pub sparse: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub name: String,
    pub table: String,
    pub column: String,
    pub target_table: String,
    pub target_column: String,
    pub on_delete: Option<RefAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub name: String,
    pub table: String,
    pub using: PolicyExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PolicyExpr {
    /// Row's tenant column equals the tenant of the authenticated user.
    TenantMatch {
        column: String,
        user_table: String,
    },
}

impl StorageDefinition {
    pub fn table(&self) -> Option<&Table> {
        self.statements.iter().find_map(|s| match s {
            Statement::CreateTable(t) if t.name == self.table_name => Some(t),
            _ => None,
        })
    }

    pub fn indexes(&self) -> impl Iterator<Item = &Index> {
        self.statements.iter().filter_map(|s| match s {
            Statement::CreateIndex(i) => Some(i),
            _ => None,
        })
    }
}
