//! Render storage definitions to PostgreSQL DDL.

use super::ast::*;
use crate::ident::quote_literal;

impl StorageDefinition {
    /// The whole definition as one script, statements in order.
    pub fn to_sql(&self) -> String {
        let mut output = String::new();
        for statement in &self.statements {
            render_statement(&mut output, statement);
        }
        output
    }

    /// Each statement rendered on its own, in script order.
    pub fn statement_sql(&self) -> Vec<String> {
        self.statements
            .iter()
            .map(|statement| {
                let mut sql = String::new();
                render_statement(&mut sql, statement);
                sql
            })
            .collect()
    }
}

pub fn render_statement(output: &mut String, statement: &Statement) {
    match statement {
        Statement::CreateTable(table) => render_table(output, table),
        Statement::CreateIndex(index) => render_index(output, index),
        Statement::AddForeignKey(fk) => render_foreign_key(output, fk),
        Statement::EnableRowSecurity { table } => {
            output.push_str(&format!("ALTER TABLE {table} ENABLE ROW LEVEL SECURITY;\n"));
        }
        Statement::CreatePolicy(policy) => render_policy(output, policy),
    }
}

fn render_table(output: &mut String, table: &Table) {
    output.push_str(&format!("CREATE TABLE IF NOT EXISTS {} (\n", table.name));

    let mut lines: Vec<String> = table.columns.iter().map(render_column).collect();
    if !table.primary_key.is_empty() {
        lines.push(format!("PRIMARY KEY ({})", table.primary_key.join(", ")));
    }

    for (i, line) in lines.iter().enumerate() {
        output.push_str("  ");
        output.push_str(line);
        if i + 1 < lines.len() {
            output.push(',');
        }
        output.push('\n');
    }

    output.push_str(");\n");
}

/// `name TYPE` followed by the column's constraints in declaration order.
pub fn render_column(column: &ColumnDef) -> String {
    let mut sql = format!("{} {}", column.name, column.typ);
    for constraint in &column.constraints {
        sql.push(' ');
        sql.push_str(&render_constraint(constraint));
    }
    sql
}

fn render_constraint(constraint: &ColumnConstraint) -> String {
    match constraint {
        ColumnConstraint::PrimaryKey => "PRIMARY KEY".to_string(),
        ColumnConstraint::NotNull => "NOT NULL".to_string(),
        ColumnConstraint::Unique => "UNIQUE".to_string(),
        ColumnConstraint::Default(expr) => format!("DEFAULT {}", render_default(expr)),
        ColumnConstraint::References {
            table,
            column,
            on_delete,
        } => {
            let mut sql = format!("REFERENCES {table}({column})");
            if let Some(action) = on_delete {
                sql.push_str(&format!(" ON DELETE {}", render_action(*action)));
            }
            sql
        }
    }
}

pub fn render_default(expr: &DefaultExpr) -> String {
    match expr {
        DefaultExpr::Text(s) => quote_literal(s),
        DefaultExpr::Numeric(n) => n.clone(),
        DefaultExpr::Boolean(true) => "TRUE".to_string(),
        DefaultExpr::Boolean(false) => "FALSE".to_string(),
        DefaultExpr::Json(json) => format!("{}::jsonb", quote_literal(json)),
        DefaultExpr::TextArray(items) if items.is_empty() => "'{}'::text[]".to_string(),
        DefaultExpr::TextArray(items) => {
            let items: Vec<String> = items.iter().map(|s| quote_literal(s)).collect();
            format!("ARRAY[{}]::text[]", items.join(", "))
        }
        DefaultExpr::GeneratedUuid => "gen_random_uuid()".to_string(),
        DefaultExpr::UtcNow => "TIMEZONE('utc', NOW())".to_string(),
    }
}

fn render_action(action: RefAction) -> &'static str {
    match action {
        RefAction::Cascade => "CASCADE",
    }
}

fn render_index(output: &mut String, index: &Index) {
    let unique = if index.unique { "UNIQUE " } else { "" };
    output.push_str(&format!(
        "CREATE {unique}INDEX IF NOT EXISTS {} ON {}({})",
        index.name,
        index.table,
        index.columns.join(", ")
    ));
    if index.sparse {
        let conditions: Vec<String> = index
            .columns
            .iter()
            .map(|c| format!("{c} IS NOT NULL"))
            .collect();
        output.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
    }
    output.push_str(";\n");
}

fn render_foreign_key(output: &mut String, fk: &ForeignKey) {
    output.push_str(&format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
        fk.table, fk.name, fk.column, fk.target_table, fk.target_column
    ));
    if let Some(action) = fk.on_delete {
        output.push_str(&format!(" ON DELETE {}", render_action(action)));
    }
    output.push_str(";\n");
}

fn render_policy(output: &mut String, policy: &Policy) {
    output.push_str(&format!(
        "CREATE POLICY \"{}\" ON {}\n",
        policy.name, policy.table
    ));
    match &policy.using {
        PolicyExpr::TenantMatch { column, user_table } => {
            output.push_str(&format!(
                "  USING ({column} IN (SELECT {column} FROM {user_table} WHERE id = auth.uid()));\n"
            ));
        }
    }
}
