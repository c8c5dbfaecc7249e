//! Schema compiler: user schema definitions to storage definitions.

use super::ast::*;
use super::types::{lookup_field_type, StorageType, FALLBACK_TYPE};
use crate::config::{CompilerOptions, StorageLayout};
use crate::error::CompileError;
use crate::ident::{json_text, normalize_identifier, numeric_literal};
use crate::schema::{FieldType, RelationKind, SchemaDefinition, SchemaField, SchemaIndex, SchemaRelation};
use serde_json::Value;
use std::collections::HashSet;

pub const ID_COLUMN: &str = "id";
pub const SCHEMA_COLUMN: &str = "schema_id";
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Compile a schema with default options and layout.
pub fn compile_table(
    schema_name: &str,
    definition: &SchemaDefinition,
) -> Result<StorageDefinition, CompileError> {
    SchemaCompiler::default().compile_table(schema_name, definition)
}

/// Compile one field with default options.
pub fn compile_field(field: &SchemaField) -> Result<ColumnDef, CompileError> {
    SchemaCompiler::default().compile_field(field)
}

#[derive(Debug, Clone, Default)]
pub struct SchemaCompiler {
    options: CompilerOptions,
    layout: StorageLayout,
}

impl SchemaCompiler {
    pub fn new(options: CompilerOptions, layout: StorageLayout) -> Self {
        Self { options, layout }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn map_field_type(&self, typ: &FieldType) -> Result<StorageType, CompileError> {
        match lookup_field_type(typ) {
            Some(t) => Ok(t),
            None if self.options.strict => Err(CompileError::UnmappedType(typ.to_string())),
            None => {
                tracing::debug!(declared = %typ, fallback = %FALLBACK_TYPE, "Unmapped field type");
                Ok(FALLBACK_TYPE)
            }
        }
    }

    /// Column for a single field: name, mapped type, then NOT NULL, UNIQUE
    /// and DEFAULT in that order.
    pub fn compile_field(&self, field: &SchemaField) -> Result<ColumnDef, CompileError> {
        let name = normalize_identifier(&field.name)?;
        let typ = self.map_field_type(&field.typ)?;
        let mut column = ColumnDef::new(name, typ);

        if field.required {
            column.constraints.push(ColumnConstraint::NotNull);
        }
        if field.unique {
            column.constraints.push(ColumnConstraint::Unique);
        }
        if let Some(value) = &field.default_value {
            if let Some(expr) = self.default_expr(field, typ, value)? {
                column.constraints.push(ColumnConstraint::Default(expr));
            }
        }

        Ok(column)
    }

    fn default_expr(
        &self,
        field: &SchemaField,
        typ: StorageType,
        value: &Value,
    ) -> Result<Option<DefaultExpr>, CompileError> {
        if value.is_null() {
            return Ok(None);
        }

        let typed = match (typ, value) {
            (StorageType::Numeric, Value::Number(n)) => Some(DefaultExpr::Numeric(n.to_string())),
            (StorageType::Numeric, Value::String(s)) => {
                numeric_literal(s).map(|n| DefaultExpr::Numeric(n.to_string()))
            }
            (StorageType::Boolean, Value::Bool(b)) => Some(DefaultExpr::Boolean(*b)),
            (StorageType::Boolean, Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" => Some(DefaultExpr::Boolean(true)),
                "false" => Some(DefaultExpr::Boolean(false)),
                _ => None,
            },
            (StorageType::Jsonb, Value::String(s)) if serde_json::from_str::<Value>(s).is_ok() => {
                Some(DefaultExpr::Json(s.clone()))
            }
            (StorageType::Jsonb, v) => Some(DefaultExpr::Json(v.to_string())),
            (StorageType::TextArray, Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Array(_) | Value::Object(_) | Value::Null => None,
                    scalar => json_text(scalar),
                })
                .collect::<Option<Vec<_>>>()
                .map(DefaultExpr::TextArray),
            (StorageType::TextArray, Value::String(s)) => {
                Some(DefaultExpr::TextArray(vec![s.clone()]))
            }
            (StorageType::Text | StorageType::Date | StorageType::TimestampTz | StorageType::Uuid, v)
                if !v.is_array() && !v.is_object() =>
            {
                json_text(v).map(DefaultExpr::Text)
            }
            _ => None,
        };

        match typed {
            Some(expr) => Ok(Some(expr)),
            None if self.options.strict => Err(CompileError::InvalidDefault {
                field: field.name.clone(),
                typ: typ.to_string(),
                value: value.to_string(),
            }),
            None => {
                tracing::debug!(field = %field.name, %typ, %value, "Default does not fit column type, quoting as text");
                Ok(json_text(value).map(DefaultExpr::Text))
            }
        }
    }

    /// Full storage definition for a schema: table, indexes, relation
    /// constraints and the tenant isolation policy.
    pub fn compile_table(
        &self,
        schema_name: &str,
        definition: &SchemaDefinition,
    ) -> Result<StorageDefinition, CompileError> {
        let table_name = normalize_identifier(schema_name)?;
        let tenant_column = self.layout.tenant_column.as_str();

        let mut columns = vec![
            ColumnDef::new(ID_COLUMN, StorageType::Uuid)
                .with(ColumnConstraint::PrimaryKey)
                .with(ColumnConstraint::Default(DefaultExpr::GeneratedUuid)),
            ColumnDef::new(SCHEMA_COLUMN, StorageType::Uuid).with(ColumnConstraint::References {
                table: self.layout.schema_table.clone(),
                column: ID_COLUMN.to_string(),
                on_delete: None,
            }),
            ColumnDef::new(tenant_column, StorageType::Uuid)
                .with(ColumnConstraint::NotNull)
                .with(ColumnConstraint::References {
                    table: self.layout.tenant_table.clone(),
                    column: ID_COLUMN.to_string(),
                    on_delete: Some(RefAction::Cascade),
                }),
        ];

        let mut taken: HashSet<String> = [ID_COLUMN, SCHEMA_COLUMN, tenant_column, CREATED_AT_COLUMN, UPDATED_AT_COLUMN]
            .into_iter()
            .map(str::to_string)
            .collect();

        for field in &definition.fields {
            let column = self.compile_field(field)?;
            if !taken.insert(column.name.clone()) {
                return Err(CompileError::DuplicateIdentifier(column.name));
            }
            columns.push(column);
        }

        for name in [CREATED_AT_COLUMN, UPDATED_AT_COLUMN] {
            columns.push(
                ColumnDef::new(name, StorageType::TimestampTz)
                    .with(ColumnConstraint::Default(DefaultExpr::UtcNow)),
            );
        }

        let mut statements = Vec::new();
        let mut trailing = Vec::new();

        for relation in &definition.relations {
            self.compile_relation(&table_name, relation, &columns, &mut statements, &mut trailing)?;
        }

        statements.insert(
            0,
            Statement::CreateTable(Table {
                name: table_name.clone(),
                columns,
                primary_key: Vec::new(),
            }),
        );

        for column in [tenant_column, CREATED_AT_COLUMN] {
            statements.push(Statement::CreateIndex(Index {
                name: format!("idx_{table_name}_{column}"),
                table: table_name.clone(),
                columns: vec![column.to_string()],
                unique: false,
                sparse: false,
            }));
        }

        for index in &definition.indexes {
            if let Some(index) = self.compile_index(&table_name, index, &taken)? {
                statements.push(Statement::CreateIndex(index));
            }
        }

        statements.append(&mut trailing);

        statements.push(Statement::EnableRowSecurity {
            table: table_name.clone(),
        });
        statements.push(Statement::CreatePolicy(Policy {
            name: format!("{table_name}_tenant_isolation"),
            table: table_name.clone(),
            using: PolicyExpr::TenantMatch {
                column: tenant_column.to_string(),
                user_table: self.layout.user_table.clone(),
            },
        }));

        Ok(StorageDefinition {
            table_name,
            statements,
        })
    }

    fn compile_index(
        &self,
        table: &str,
        index: &SchemaIndex,
        known: &HashSet<String>,
    ) -> Result<Option<Index>, CompileError> {
        let mut columns = Vec::with_capacity(index.fields.len());
        for field in &index.fields {
            let column = normalize_identifier(field)?;
            if !known.contains(&column) {
                if self.options.strict {
                    return Err(CompileError::UnknownField {
                        field: field.clone(),
                        context: "index",
                    });
                }
                tracing::debug!(%table, %field, "Dropping index on unknown field");
                return Ok(None);
            }
            columns.push(column);
        }

        if columns.is_empty() {
            return Ok(None);
        }

        let prefix = if index.unique { "uidx" } else { "idx" };
        Ok(Some(Index {
            name: format!("{prefix}_{table}_{}", columns.join("_")),
            table: table.to_string(),
            columns,
            unique: index.unique,
            sparse: index.sparse,
        }))
    }

    /// One-to-one and one-to-many relations become a foreign key on the
    /// declaring table. Many-to-many relations get a link table.
    fn compile_relation(
        &self,
        table: &str,
        relation: &SchemaRelation,
        columns: &[ColumnDef],
        link_tables: &mut Vec<Statement>,
        constraints: &mut Vec<Statement>,
    ) -> Result<(), CompileError> {
        let from = normalize_identifier(&relation.from_field)?;
        let target_table = normalize_identifier(&relation.to_schema)?;
        let target_column = normalize_identifier(&relation.to_field)?;
        let on_delete = relation.cascade_delete.then_some(RefAction::Cascade);

        let Some(source) = columns.iter().find(|c| c.name == from) else {
            if self.options.strict {
                return Err(CompileError::UnknownField {
                    field: relation.from_field.clone(),
                    context: "relation",
                });
            }
            tracing::debug!(%table, relation = %relation.name, "Dropping relation on unknown field");
            return Ok(());
        };

        match relation.kind {
            RelationKind::OneToMany | RelationKind::OneToOne => {
                constraints.push(Statement::AddForeignKey(ForeignKey {
                    name: format!("fk_{table}_{from}"),
                    table: table.to_string(),
                    column: from.clone(),
                    target_table,
                    target_column,
                    on_delete,
                }));
                if relation.kind == RelationKind::OneToOne && !source.has(&ColumnConstraint::Unique) {
                    constraints.push(Statement::CreateIndex(Index {
                        name: format!("uidx_{table}_{from}"),
                        table: table.to_string(),
                        columns: vec![from],
                        unique: true,
                        sparse: false,
                    }));
                }
            }
            RelationKind::ManyToMany => {
                let tenant_column = self.layout.tenant_column.as_str();
                let link = Table {
                    name: format!("{table}_{target_table}_link"),
                    columns: vec![
                        ColumnDef::new("source_id", source.typ)
                            .with(ColumnConstraint::NotNull)
                            .with(ColumnConstraint::References {
                                table: table.to_string(),
                                column: from,
                                on_delete: Some(RefAction::Cascade),
                            }),
                        ColumnDef::new("target_id", source.typ)
                            .with(ColumnConstraint::NotNull)
                            .with(ColumnConstraint::References {
                                table: target_table,
                                column: target_column,
                                on_delete,
                            }),
                        ColumnDef::new(tenant_column, StorageType::Uuid)
                            .with(ColumnConstraint::NotNull)
                            .with(ColumnConstraint::References {
                                table: self.layout.tenant_table.clone(),
                                column: ID_COLUMN.to_string(),
                                on_delete: Some(RefAction::Cascade),
                            }),
                    ],
                    primary_key: vec!["source_id".to_string(), "target_id".to_string()],
                };
                link_tables.push(Statement::CreateTable(link));
            }
        }

        Ok(())
    }
}
