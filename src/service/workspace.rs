//! Tenant workspace: schema lifecycle, record CRUD and report execution on
//! top of the compilers and the storage collaborators.

use super::error::ServiceError;
use crate::config::Config;
use crate::ddl::{SchemaCompiler, SCHEMA_COLUMN};
use crate::model::{
    AuditAction, AuditLog, ChartConfig, ErbSchema, Principal, Record, Report, SchemaStatus, VisualizationType,
};
use crate::query::{CompiledQuery, QueryBuilderValue, QueryCompiler, QueryScope};
use crate::schema::SchemaDefinition;
use crate::store::{
    AuditQuery, AuditSink, MemoryAuditSink, MemoryRecordStore, MemoryStorage, Page, Pagination, RecordQuery,
    RecordStore, StorageError, StorageExecutor,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

const SCHEMA_ENTITY: &str = "schema";
const RECORD_ENTITY: &str = "record";
const REPORT_ENTITY: &str = "report";
const AUDIT_ENTITY: &str = "audit_log";

#[derive(Debug, Clone, Default)]
pub struct NewSchema {
    pub name: String,
    pub description: Option<String>,
    pub definition: SchemaDefinition,
}

#[derive(Debug, Clone)]
pub struct NewRecord {
    pub schema_id: Uuid,
    pub data: Value,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct NewReport {
    pub name: String,
    pub description: Option<String>,
    pub schema_id: Option<Uuid>,
    pub query: QueryBuilderValue,
    pub visualization_type: VisualizationType,
    pub chart_config: Option<ChartConfig>,
    pub looker_studio_url: Option<String>,
    pub is_shared: bool,
    pub shared_with: Vec<Uuid>,
}

/// Partial report update. `None` leaves the field as it is.
#[derive(Debug, Clone, Default)]
pub struct ReportChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub query: Option<QueryBuilderValue>,
    pub visualization_type: Option<VisualizationType>,
    pub chart_config: Option<ChartConfig>,
    pub looker_studio_url: Option<String>,
    pub is_shared: Option<bool>,
    pub shared_with: Option<Vec<Uuid>>,
}

/// Result of a publish. `sql` is `None` when the schema was already
/// published and nothing ran. `failed` counts statements storage rejected
/// for a reason other than the object already existing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub schema: ErbSchema,
    pub sql: Option<String>,
    pub applied: bool,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResult {
    pub report_id: Uuid,
    pub sql: String,
    pub page: Page<Record>,
}

#[derive(Debug, Clone)]
struct CachedQuery {
    source: QueryBuilderValue,
    compiled: CompiledQuery,
}

pub struct Workspace<S = MemoryStorage, R = MemoryRecordStore, A = MemoryAuditSink> {
    config: Config,
    schema_compiler: SchemaCompiler,
    query_compiler: QueryCompiler,
    storage: S,
    records: R,
    audit: A,
    schemas: HashMap<Uuid, ErbSchema>,
    reports: HashMap<Uuid, Report>,
    compiled_reports: HashMap<Uuid, CachedQuery>,
}

impl Workspace {
    pub fn in_memory(config: Config) -> Self {
        Self::new(config, MemoryStorage::new(), MemoryRecordStore::new(), MemoryAuditSink::new())
    }
}

impl<S: StorageExecutor, R: RecordStore, A: AuditSink> Workspace<S, R, A> {
    pub fn new(config: Config, storage: S, records: R, audit: A) -> Self {
        Self {
            schema_compiler: SchemaCompiler::new(config.compiler.clone(), config.storage.clone()),
            query_compiler: QueryCompiler::new(config.compiler.clone()),
            config,
            storage,
            records,
            audit,
            schemas: HashMap::new(),
            reports: HashMap::new(),
            compiled_reports: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn records(&self) -> &R {
        &self.records
    }

    pub fn audit(&self) -> &A {
        &self.audit
    }

    // Schemas

    /// New draft schema. The definition must compile, but no storage is
    /// created until publish.
    pub fn create_schema(&mut self, who: &Principal, input: NewSchema) -> Result<ErbSchema, ServiceError> {
        authorize_write(who)?;
        self.schema_compiler.compile_table(&input.name, &input.definition)?;

        let mut schema = ErbSchema::new(who.tenant_id, who.user_id, &input.name, input.definition)?;
        schema.description = input.description;

        tracing::debug!(schema = %schema.id, table = %schema.table_name, "Created schema");
        self.record_audit(AuditLog::new(
            who,
            AuditAction::Create,
            SCHEMA_ENTITY,
            schema.id,
            AuditLog::changes::<ErbSchema, _>(None, Some(&schema)),
        ));
        self.schemas.insert(schema.id, schema.clone());
        Ok(schema)
    }

    pub fn get_schema(&self, who: &Principal, id: Uuid) -> Result<&ErbSchema, ServiceError> {
        self.schemas
            .get(&id)
            .filter(|s| s.tenant_id == who.tenant_id)
            .ok_or(ServiceError::NotFound {
                entity: SCHEMA_ENTITY,
                id,
            })
    }

    /// The caller's schemas, newest first.
    pub fn list_schemas(&self, who: &Principal) -> Vec<&ErbSchema> {
        let mut schemas: Vec<&ErbSchema> = self.schemas.values().filter(|s| s.tenant_id == who.tenant_id).collect();
        schemas.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
        schemas
    }

    pub fn update_schema_definition(
        &mut self,
        who: &Principal,
        id: Uuid,
        definition: SchemaDefinition,
    ) -> Result<ErbSchema, ServiceError> {
        authorize_write(who)?;
        let before = self.get_schema(who, id)?.clone();
        if !before.is_editable() {
            return Err(ServiceError::SchemaNotEditable {
                id,
                status: before.status,
            });
        }
        self.schema_compiler.compile_table(&before.name, &definition)?;

        let mut after = before.clone();
        after.definition = definition;
        after.touch();

        self.record_audit(AuditLog::new(
            who,
            AuditAction::Update,
            SCHEMA_ENTITY,
            id,
            AuditLog::changes(Some(&before.definition), Some(&after.definition)),
        ));
        self.schemas.insert(id, after.clone());
        Ok(after)
    }

    /// Compile the schema, run the DDL statement by statement and mark it
    /// published. A statement whose object already exists counts as applied.
    /// Other storage failures are logged and do not stop the remaining
    /// statements or the status change.
    pub fn publish_schema(&mut self, who: &Principal, id: Uuid) -> Result<PublishOutcome, ServiceError> {
        authorize_write(who)?;
        let mut schema = self.get_schema(who, id)?.clone();
        if schema.status == SchemaStatus::Published {
            return Ok(PublishOutcome {
                schema,
                sql: None,
                applied: false,
                failed: 0,
            });
        }
        schema.transition(SchemaStatus::Published)?;

        let storage = self.schema_compiler.compile_table(&schema.name, &schema.definition)?;
        let mut failed = 0;
        for statement in storage.statement_sql() {
            match self.storage.execute(&statement) {
                Ok(()) => {}
                Err(StorageError::AlreadyExists) => {
                    tracing::debug!(schema = %id, statement = statement.trim_end(), "Already exists");
                }
                Err(err) => {
                    tracing::warn!(schema = %id, statement = statement.trim_end(), error = %err, "Failed to apply statement");
                    failed += 1;
                }
            }
        }
        let applied = failed == 0;

        tracing::info!(schema = %id, table = %schema.table_name, applied, failed, "Published schema");
        self.record_audit(AuditLog::new(
            who,
            AuditAction::Publish,
            SCHEMA_ENTITY,
            id,
            serde_json::json!({ "table_name": schema.table_name, "applied": applied, "failed": failed }),
        ));
        self.schemas.insert(id, schema.clone());
        Ok(PublishOutcome {
            schema,
            sql: Some(storage.to_sql()),
            applied,
            failed,
        })
    }

    /// Drafts only. The schema is archived rather than removed.
    pub fn delete_schema(&mut self, who: &Principal, id: Uuid) -> Result<ErbSchema, ServiceError> {
        authorize_write(who)?;
        let mut schema = self.get_schema(who, id)?.clone();
        if schema.status != SchemaStatus::Draft {
            return Err(ServiceError::SchemaNotDeletable {
                id,
                status: schema.status,
            });
        }
        schema.transition(SchemaStatus::Archived)?;

        self.record_audit(AuditLog::new(
            who,
            AuditAction::Delete,
            SCHEMA_ENTITY,
            id,
            serde_json::json!({ "before": { "status": SchemaStatus::Draft }, "after": { "status": schema.status } }),
        ));
        self.schemas.insert(id, schema.clone());
        Ok(schema)
    }

    pub fn archive_schema(&mut self, who: &Principal, id: Uuid) -> Result<ErbSchema, ServiceError> {
        self.move_schema(who, id, SchemaStatus::Archived)
    }

    /// Archived back to draft.
    pub fn restore_schema(&mut self, who: &Principal, id: Uuid) -> Result<ErbSchema, ServiceError> {
        self.move_schema(who, id, SchemaStatus::Draft)
    }

    fn move_schema(&mut self, who: &Principal, id: Uuid, next: SchemaStatus) -> Result<ErbSchema, ServiceError> {
        authorize_write(who)?;
        let mut schema = self.get_schema(who, id)?.clone();
        let from = schema.status;
        schema.transition(next)?;

        self.record_audit(AuditLog::new(
            who,
            AuditAction::Update,
            SCHEMA_ENTITY,
            id,
            serde_json::json!({ "before": { "status": from }, "after": { "status": next } }),
        ));
        self.schemas.insert(id, schema.clone());
        Ok(schema)
    }

    // Records

    pub fn create_record(&mut self, who: &Principal, input: NewRecord) -> Result<Record, ServiceError> {
        authorize_write(who)?;
        let schema = self.get_schema(who, input.schema_id)?;
        if schema.status != SchemaStatus::Published {
            return Err(ServiceError::SchemaNotPublished(schema.id));
        }
        check_document(&input.data)?;

        let mut record = Record::new(input.schema_id, who.tenant_id, who.user_id, input.data);
        if let Some(parent_id) = input.parent_id {
            let parent = self.get_record(who, parent_id)?;
            if parent.schema_id != input.schema_id {
                return Err(ServiceError::InvalidRecord(format!(
                    "parent {parent_id} belongs to another schema"
                )));
            }
            record = record.with_parent(parent_id);
        }

        self.records.insert(record.clone())?;
        self.record_audit(AuditLog::new(
            who,
            AuditAction::Create,
            RECORD_ENTITY,
            record.id,
            AuditLog::changes::<Value, _>(None, Some(&record.data)),
        ));
        Ok(record)
    }

    /// Live record by id. Tombstoned records are not found.
    pub fn get_record(&self, who: &Principal, id: Uuid) -> Result<Record, ServiceError> {
        self.records
            .get(who.tenant_id, id)?
            .filter(|r| !r.is_deleted)
            .ok_or(ServiceError::NotFound {
                entity: RECORD_ENTITY,
                id,
            })
    }

    pub fn update_record(&mut self, who: &Principal, id: Uuid, data: Value) -> Result<Record, ServiceError> {
        authorize_write(who)?;
        check_document(&data)?;
        let mut record = self.get_record(who, id)?;
        let before = record.data.clone();
        record.apply_update(data);

        self.records.update(record.clone())?;
        self.record_audit(AuditLog::new(
            who,
            AuditAction::Update,
            RECORD_ENTITY,
            id,
            AuditLog::changes(Some(&before), Some(&record.data)),
        ));
        Ok(record)
    }

    pub fn delete_record(&mut self, who: &Principal, id: Uuid) -> Result<(), ServiceError> {
        authorize_write(who)?;
        let mut record = self.get_record(who, id)?;
        record.mark_deleted();

        self.records.update(record.clone())?;
        self.record_audit(AuditLog::new(
            who,
            AuditAction::Delete,
            RECORD_ENTITY,
            id,
            AuditLog::changes::<_, Value>(Some(&record.data), None),
        ));
        Ok(())
    }

    /// One page of a schema's live records, optionally filtered by a rule
    /// tree.
    pub fn list_records(
        &self,
        who: &Principal,
        schema_id: Uuid,
        filter: Option<&QueryBuilderValue>,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Page<Record>, ServiceError> {
        self.get_schema(who, schema_id)?;
        let mut query = RecordQuery::new(who.tenant_id, self.pagination(page, limit)).in_schema(schema_id);
        if let Some(filter) = filter {
            let compiled = self.query_compiler.compile_query(filter)?;
            if !compiled.predicate.is_true() {
                query = query.filtered(compiled.predicate);
            }
        }
        Ok(self.records.query(&query)?)
    }

    // Reports

    pub fn create_report(&mut self, who: &Principal, input: NewReport) -> Result<Report, ServiceError> {
        authorize_write(who)?;
        if let Some(schema_id) = input.schema_id {
            self.get_schema(who, schema_id)?;
        }
        let compiled = self.query_compiler.compile_query(&input.query)?;

        let mut report = Report::new(who.tenant_id, who.user_id, input.name, input.query);
        report.description = input.description;
        report.schema_id = input.schema_id;
        report.visualization_type = input.visualization_type;
        report.chart_config = input.chart_config;
        report.looker_studio_url = input.looker_studio_url;
        report.is_shared = input.is_shared;
        report.shared_with = input.shared_with;

        self.record_audit(AuditLog::new(
            who,
            AuditAction::Create,
            REPORT_ENTITY,
            report.id,
            AuditLog::changes::<Report, _>(None, Some(&report)),
        ));
        self.compiled_reports.insert(
            report.id,
            CachedQuery {
                source: report.query.clone(),
                compiled,
            },
        );
        self.reports.insert(report.id, report.clone());
        Ok(report)
    }

    pub fn get_report(&self, who: &Principal, id: Uuid) -> Result<&Report, ServiceError> {
        self.reports
            .get(&id)
            .filter(|r| r.is_visible_to(who))
            .ok_or(ServiceError::NotFound {
                entity: REPORT_ENTITY,
                id,
            })
    }

    /// Reports the caller can see, newest first.
    pub fn list_reports(&self, who: &Principal) -> Vec<&Report> {
        let mut reports: Vec<&Report> = self.reports.values().filter(|r| r.is_visible_to(who)).collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
        reports
    }

    /// Replace a report's rule tree.
    pub fn update_report_query(
        &mut self,
        who: &Principal,
        id: Uuid,
        query: QueryBuilderValue,
    ) -> Result<Report, ServiceError> {
        self.update_report(
            who,
            id,
            ReportChanges {
                query: Some(query),
                ..ReportChanges::default()
            },
        )
    }

    /// Apply `changes` to a report. A new rule tree must compile and drops
    /// the cached predicate.
    pub fn update_report(&mut self, who: &Principal, id: Uuid, changes: ReportChanges) -> Result<Report, ServiceError> {
        let before = self.editable_report(who, id)?;
        if let Some(query) = &changes.query {
            self.query_compiler.compile_query(query)?;
        }

        let mut after = before.clone();
        if let Some(name) = changes.name {
            after.name = name;
        }
        if let Some(description) = changes.description {
            after.description = Some(description);
        }
        if let Some(query) = changes.query {
            after.query = query;
            self.compiled_reports.remove(&id);
        }
        if let Some(visualization_type) = changes.visualization_type {
            after.visualization_type = visualization_type;
        }
        if let Some(chart_config) = changes.chart_config {
            after.chart_config = Some(chart_config);
        }
        if let Some(url) = changes.looker_studio_url {
            after.looker_studio_url = Some(url);
        }
        if let Some(is_shared) = changes.is_shared {
            after.is_shared = is_shared;
        }
        if let Some(shared_with) = changes.shared_with {
            after.shared_with = shared_with;
        }
        after.updated_at = chrono::Utc::now();

        self.record_audit(AuditLog::new(
            who,
            AuditAction::Update,
            REPORT_ENTITY,
            id,
            AuditLog::changes(Some(&before), Some(&after)),
        ));
        self.reports.insert(id, after.clone());
        Ok(after)
    }

    pub fn delete_report(&mut self, who: &Principal, id: Uuid) -> Result<(), ServiceError> {
        let report = self.editable_report(who, id)?;
        self.reports.remove(&id);
        self.compiled_reports.remove(&id);
        self.record_audit(AuditLog::new(
            who,
            AuditAction::Delete,
            REPORT_ENTITY,
            id,
            AuditLog::changes::<_, Report>(Some(&report), None),
        ));
        Ok(())
    }

    /// The report, if the caller may change it. Admins and owners reach
    /// every report in their tenant; anyone else who cannot see the report
    /// gets `NotFound`.
    fn editable_report(&self, who: &Principal, id: Uuid) -> Result<Report, ServiceError> {
        authorize_write(who)?;
        let report = self
            .reports
            .get(&id)
            .filter(|r| r.is_editable_by(who) || r.is_visible_to(who))
            .ok_or(ServiceError::NotFound {
                entity: REPORT_ENTITY,
                id,
            })?;
        if !report.is_editable_by(who) {
            return Err(ServiceError::Forbidden(who.role));
        }
        Ok(report.clone())
    }

    /// Run a report's filter over the tenant's records.
    pub fn execute_report(
        &mut self,
        who: &Principal,
        id: Uuid,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<ReportResult, ServiceError> {
        let report = self.get_report(who, id)?.clone();
        let compiled = self.compiled_report(&report)?;

        let scope = QueryScope {
            table: self.config.storage.records_table.clone(),
            tenant_column: self.config.storage.tenant_column.clone(),
            schema_column: report.schema_id.map(|_| SCHEMA_COLUMN.to_string()),
            exclude_deleted: true,
        };
        let mut query = RecordQuery::new(who.tenant_id, self.pagination(page, limit));
        if let Some(schema_id) = report.schema_id {
            query = query.in_schema(schema_id);
        }
        if !compiled.predicate.is_true() {
            query = query.filtered(compiled.predicate.clone());
        }

        Ok(ReportResult {
            report_id: id,
            sql: compiled.select_sql(&scope),
            page: self.records.query(&query)?,
        })
    }

    fn compiled_report(&mut self, report: &Report) -> Result<CompiledQuery, ServiceError> {
        if let Some(cached) = self.compiled_reports.get(&report.id)
            && cached.source == report.query
        {
            return Ok(cached.compiled.clone());
        }
        tracing::debug!(report = %report.id, "Compiling report query");
        let compiled = self.query_compiler.compile_query(&report.query)?;
        self.compiled_reports.insert(
            report.id,
            CachedQuery {
                source: report.query.clone(),
                compiled: compiled.clone(),
            },
        );
        Ok(compiled)
    }

    // Audit trail

    pub fn audit_entry(&self, who: &Principal, id: Uuid) -> Result<AuditLog, ServiceError> {
        self.audit.get(who.tenant_id, id)?.ok_or(ServiceError::NotFound {
            entity: AUDIT_ENTITY,
            id,
        })
    }

    /// The caller's tenant trail, newest first, optionally narrowed to one
    /// entity type or entity.
    pub fn audit_trail(
        &self,
        who: &Principal,
        entity_type: Option<&str>,
        entity_id: Option<Uuid>,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Page<AuditLog>, ServiceError> {
        let mut query = AuditQuery::new(who.tenant_id).paged(self.pagination(page, limit));
        query.entity_type = entity_type.map(str::to_string);
        query.entity_id = entity_id;
        Ok(self.audit.list(&query)?)
    }

    fn pagination(&self, page: Option<usize>, limit: Option<usize>) -> Pagination {
        Pagination::clamped(page, limit, &self.config.records)
    }

    /// Audit failures are logged and never fail the operation.
    fn record_audit(&mut self, entry: AuditLog) {
        let (action, entity) = (entry.action, entry.entity_id);
        if let Err(err) = self.audit.append(entry) {
            tracing::warn!(%action, %entity, error = %err, "Failed to write audit log");
        }
    }
}

fn authorize_write(who: &Principal) -> Result<(), ServiceError> {
    if who.role.can_write() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(who.role))
    }
}

fn check_document(data: &Value) -> Result<(), ServiceError> {
    if data.is_object() {
        Ok(())
    } else {
        Err(ServiceError::InvalidRecord("record data must be a JSON object".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerOptions;
    use crate::error::CompileError;
    use crate::model::Role;
    use crate::query::{Combinator, QueryRule};
    use crate::schema::{RelationKind, SchemaField, SchemaRelation};
    use serde_json::json;

    fn principal(role: Role) -> Principal {
        Principal::new(Uuid::new_v4(), Uuid::new_v4(), role)
    }

    fn colleague(of: &Principal, role: Role) -> Principal {
        Principal::new(Uuid::new_v4(), of.tenant_id, role)
    }

    fn customer_schema() -> NewSchema {
        NewSchema {
            name: "Customer".into(),
            description: Some("People we bill".into()),
            definition: SchemaDefinition::new(vec![
                SchemaField::new("Name", "text").required(),
                SchemaField::new("Status", "select"),
                SchemaField::new("Spend", "number"),
            ]),
        }
    }

    fn published(ws: &mut Workspace, who: &Principal) -> Uuid {
        let schema = ws.create_schema(who, customer_schema()).unwrap();
        ws.publish_schema(who, schema.id).unwrap();
        schema.id
    }

    fn status_is(value: &str) -> QueryBuilderValue {
        QueryBuilderValue::new(Combinator::And, vec![QueryRule::leaf("status", "equals", value)])
    }

    #[test]
    fn test_schema_lifecycle() {
        let mut ws = Workspace::in_memory(Config::default());
        let who = principal(Role::Owner);

        let schema = ws.create_schema(&who, customer_schema()).unwrap();
        assert_eq!(schema.status, SchemaStatus::Draft);
        assert_eq!(schema.table_name, "customer");
        assert!(ws.storage().executed().is_empty());

        let edited = SchemaDefinition::new(vec![SchemaField::new("Name", "text").required().unique()]);
        ws.update_schema_definition(&who, schema.id, edited).unwrap();

        let outcome = ws.publish_schema(&who, schema.id).unwrap();
        assert!(outcome.applied);
        let sql = outcome.sql.unwrap();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS customer ("));
        assert!(sql.contains("name TEXT NOT NULL UNIQUE"));
        assert_eq!(ws.storage().executed().len(), 5);
        assert_eq!(ws.storage().executed().concat(), sql);

        let again = ws.publish_schema(&who, schema.id).unwrap();
        assert_eq!(again.sql, None);
        assert_eq!(ws.storage().executed().len(), 5);

        let err = ws
            .update_schema_definition(&who, schema.id, SchemaDefinition::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::SchemaNotEditable { status: SchemaStatus::Published, .. }));
        assert_eq!(err.code(), "INVALID_STATE");

        ws.archive_schema(&who, schema.id).unwrap();
        assert!(matches!(
            ws.publish_schema(&who, schema.id).unwrap_err(),
            ServiceError::InvalidTransition(_)
        ));
        let restored = ws.restore_schema(&who, schema.id).unwrap();
        assert_eq!(restored.status, SchemaStatus::Draft);
    }

    #[test]
    fn test_republish_after_restore_tolerates_existing_storage() {
        let mut ws = Workspace::in_memory(Config::default());
        let who = principal(Role::Admin);
        let id = published(&mut ws, &who);
        ws.archive_schema(&who, id).unwrap();
        ws.restore_schema(&who, id).unwrap();

        let outcome = ws.publish_schema(&who, id).unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.failed, 0);
        assert_eq!(ws.storage().executed().len(), 5);
    }

    fn deal_schema(relations: &[(&str, &str)]) -> SchemaDefinition {
        let mut def = SchemaDefinition::new(relations.iter().map(|(field, _)| SchemaField::new(*field, "text")).collect());
        def.relations = relations
            .iter()
            .map(|(field, target)| SchemaRelation {
                id: String::new(),
                name: format!("{field} to {target}"),
                from_field: field.to_string(),
                to_schema: target.to_string(),
                to_field: "id".into(),
                kind: RelationKind::OneToMany,
                cascade_delete: false,
            })
            .collect();
        def
    }

    #[test]
    fn test_republish_runs_statements_added_since_last_publish() {
        let mut ws = Workspace::in_memory(Config::default());
        let who = principal(Role::Owner);
        let input = NewSchema {
            name: "Deal".into(),
            definition: deal_schema(&[("owner_id", "Member")]),
            ..NewSchema::default()
        };
        let id = ws.create_schema(&who, input).unwrap().id;
        ws.publish_schema(&who, id).unwrap();
        let first = ws.storage().executed().len();

        ws.archive_schema(&who, id).unwrap();
        ws.restore_schema(&who, id).unwrap();
        ws.update_schema_definition(&who, id, deal_schema(&[("owner_id", "Member"), ("team_id", "Team")]))
            .unwrap();
        let outcome = ws.publish_schema(&who, id).unwrap();

        assert!(outcome.applied);
        assert_eq!(outcome.failed, 0);
        let executed = ws.storage().executed();
        let team_fk = "ALTER TABLE deal ADD CONSTRAINT fk_deal_team_id FOREIGN KEY (team_id) REFERENCES team(id);\n";
        assert!(executed[first..].iter().any(|s| s == team_fk));
        let owner_fk = executed.iter().filter(|s| s.contains("fk_deal_owner_id")).count();
        assert_eq!(owner_fk, 1);
    }

    /// Rejects any statement containing `marker`, runs the rest.
    #[derive(Default)]
    struct RejectingStorage {
        marker: &'static str,
        executed: Vec<String>,
    }

    impl StorageExecutor for RejectingStorage {
        fn execute(&mut self, statement: &str) -> Result<(), StorageError> {
            if statement.contains(self.marker) {
                return Err(StorageError::Rejected("permission denied".into()));
            }
            self.executed.push(statement.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_publish_runs_every_statement_past_a_failure() {
        let storage = RejectingStorage {
            marker: "ENABLE ROW LEVEL SECURITY",
            ..RejectingStorage::default()
        };
        let mut ws = Workspace::new(Config::default(), storage, MemoryRecordStore::new(), MemoryAuditSink::new());
        let who = principal(Role::Owner);
        let schema = ws.create_schema(&who, customer_schema()).unwrap();

        let outcome = ws.publish_schema(&who, schema.id).unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.schema.status, SchemaStatus::Published);
        assert_eq!(ws.storage().executed.len(), 4);
        assert!(ws.storage().executed[3].starts_with("CREATE POLICY"));

        let entry = &ws.audit().entries()[1];
        assert_eq!(entry.action, AuditAction::Publish);
        assert_eq!(entry.changes["failed"], 1);
    }

    #[test]
    fn test_invalid_definitions_are_rejected_up_front() {
        let mut ws = Workspace::in_memory(Config::default());
        let who = principal(Role::Member);

        let dup = NewSchema {
            name: "Lead".into(),
            definition: SchemaDefinition::new(vec![
                SchemaField::new("Full Name", "text"),
                SchemaField::new("full name", "text"),
            ]),
            ..NewSchema::default()
        };
        let err = ws.create_schema(&who, dup).unwrap_err();
        assert!(matches!(err, ServiceError::Compile(CompileError::DuplicateIdentifier(_))));
        assert_eq!(err.code(), "INVALID_INPUT");

        let bad_name = NewSchema {
            name: "2024 Leads".into(),
            ..NewSchema::default()
        };
        assert!(ws.create_schema(&who, bad_name).is_err());
        assert!(ws.list_schemas(&who).is_empty());
    }

    #[test]
    fn test_strict_config_reaches_compilers() {
        let config = Config {
            compiler: CompilerOptions::strict(),
            ..Config::default()
        };
        let mut ws = Workspace::in_memory(config);
        let who = principal(Role::Owner);
        let input = NewSchema {
            name: "Asset".into(),
            definition: SchemaDefinition::new(vec![SchemaField::new("Location", "geopoint")]),
            ..NewSchema::default()
        };
        assert!(matches!(
            ws.create_schema(&who, input).unwrap_err(),
            ServiceError::Compile(CompileError::UnmappedType(_))
        ));
    }

    #[test]
    fn test_publish_continues_when_storage_fails() {
        let mut ws = Workspace::new(
            Config::default(),
            MemoryStorage::failing(StorageError::Unavailable("connection refused".into())),
            MemoryRecordStore::new(),
            MemoryAuditSink::new(),
        );
        let who = principal(Role::Owner);
        let schema = ws.create_schema(&who, customer_schema()).unwrap();

        let outcome = ws.publish_schema(&who, schema.id).unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.failed, 5);
        assert_eq!(outcome.schema.status, SchemaStatus::Published);
        assert_eq!(ws.get_schema(&who, schema.id).unwrap().status, SchemaStatus::Published);

        let record = ws
            .create_record(&who, NewRecord { schema_id: schema.id, data: json!({"name": "Ada"}), parent_id: None })
            .unwrap();
        assert_eq!(record.version, 1);
    }

    #[test]
    fn test_audit_failures_do_not_fail_operations() {
        let mut ws = Workspace::new(
            Config::default(),
            MemoryStorage::new(),
            MemoryRecordStore::new(),
            MemoryAuditSink::failing(StorageError::Rejected("read-only".into())),
        );
        let who = principal(Role::Owner);
        let schema = ws.create_schema(&who, customer_schema()).unwrap();
        ws.publish_schema(&who, schema.id).unwrap();
        assert!(ws.audit().entries().is_empty());
    }

    #[test]
    fn test_record_crud_with_versions_and_tombstones() {
        let mut ws = Workspace::in_memory(Config::default());
        let who = principal(Role::Member);
        let schema_id = published(&mut ws, &who);

        let record = ws
            .create_record(&who, NewRecord { schema_id, data: json!({"name": "Ada", "status": "lead"}), parent_id: None })
            .unwrap();
        let updated = ws.update_record(&who, record.id, json!({"name": "Ada", "status": "active"})).unwrap();
        assert_eq!(updated.version, 2);
        let updated = ws.update_record(&who, record.id, json!({"name": "Ada", "status": "vip"})).unwrap();
        assert_eq!(updated.version, 3);

        ws.delete_record(&who, record.id).unwrap();
        assert!(matches!(
            ws.get_record(&who, record.id).unwrap_err(),
            ServiceError::NotFound { entity: "record", .. }
        ));
        assert!(matches!(
            ws.update_record(&who, record.id, json!({})).unwrap_err(),
            ServiceError::NotFound { .. }
        ));
        assert!(ws.delete_record(&who, record.id).is_err());
        assert_eq!(ws.records().len(), 1);

        let trail = ws.audit_trail(&who, Some("record"), Some(record.id), None, None).unwrap();
        let actions: Vec<AuditAction> = trail.rows.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            [AuditAction::Delete, AuditAction::Update, AuditAction::Update, AuditAction::Create]
        );
        assert_eq!(trail.rows[1].changes["before"]["status"], "active");
        assert_eq!(trail.rows[1].changes["after"]["status"], "vip");
    }

    #[test]
    fn test_records_need_a_published_schema_and_object_data() {
        let mut ws = Workspace::in_memory(Config::default());
        let who = principal(Role::Member);
        let draft = ws.create_schema(&who, customer_schema()).unwrap();

        let err = ws
            .create_record(&who, NewRecord { schema_id: draft.id, data: json!({}), parent_id: None })
            .unwrap_err();
        assert!(matches!(err, ServiceError::SchemaNotPublished(_)));

        ws.publish_schema(&who, draft.id).unwrap();
        let err = ws
            .create_record(&who, NewRecord { schema_id: draft.id, data: json!([1, 2]), parent_id: None })
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRecord(_)));
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[test]
    fn test_sub_records() {
        let mut ws = Workspace::in_memory(Config::default());
        let who = principal(Role::Member);
        let schema_id = published(&mut ws, &who);
        let parent = ws
            .create_record(&who, NewRecord { schema_id, data: json!({"name": "Acme"}), parent_id: None })
            .unwrap();
        let child = ws
            .create_record(&who, NewRecord { schema_id, data: json!({"name": "Acme EU"}), parent_id: Some(parent.id) })
            .unwrap();
        assert_eq!(child.parent_id, Some(parent.id));

        let missing = ws
            .create_record(&who, NewRecord { schema_id, data: json!({}), parent_id: Some(Uuid::new_v4()) })
            .unwrap_err();
        assert!(matches!(missing, ServiceError::NotFound { .. }));
    }

    #[test]
    fn test_tenants_are_isolated() {
        let mut ws = Workspace::in_memory(Config::default());
        let who = principal(Role::Owner);
        let schema_id = published(&mut ws, &who);
        let record = ws
            .create_record(&who, NewRecord { schema_id, data: json!({"name": "Ada"}), parent_id: None })
            .unwrap();

        let stranger = principal(Role::Owner);
        assert!(matches!(ws.get_schema(&stranger, schema_id), Err(ServiceError::NotFound { .. })));
        assert!(matches!(ws.get_record(&stranger, record.id), Err(ServiceError::NotFound { .. })));
        assert!(ws.list_schemas(&stranger).is_empty());
        assert!(ws.delete_record(&stranger, record.id).is_err());
        assert!(ws.get_record(&who, record.id).is_ok());
    }

    #[test]
    fn test_viewers_cannot_mutate() {
        let mut ws = Workspace::in_memory(Config::default());
        let owner = principal(Role::Owner);
        let schema_id = published(&mut ws, &owner);
        let viewer = colleague(&owner, Role::Viewer);

        let err = ws.create_schema(&viewer, customer_schema()).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        assert!(ws.archive_schema(&viewer, schema_id).is_err());
        assert!(ws
            .create_record(&viewer, NewRecord { schema_id, data: json!({}), parent_id: None })
            .is_err());
        assert!(ws.list_records(&viewer, schema_id, None, None, None).is_ok());
    }

    #[test]
    fn test_list_records_with_filter_and_pagination() {
        let mut ws = Workspace::in_memory(Config::default());
        let who = principal(Role::Member);
        let schema_id = published(&mut ws, &who);
        for n in 0..5 {
            let status = if n % 2 == 0 { "active" } else { "closed" };
            ws.create_record(&who, NewRecord { schema_id, data: json!({"n": n, "status": status}), parent_id: None })
                .unwrap();
        }

        let all = ws.list_records(&who, schema_id, None, Some(1), Some(2)).unwrap();
        assert_eq!(all.meta.total, 5);
        assert_eq!(all.rows.len(), 2);
        assert!(all.meta.has_more);

        let active = ws
            .list_records(&who, schema_id, Some(&status_is("active")), None, None)
            .unwrap();
        assert_eq!(active.meta.total, 3);
        assert_eq!(active.meta.limit, 50);
        assert!(active.rows.iter().all(|r| r.data["status"] == "active"));
    }

    #[test]
    fn test_reports_compile_once_and_recompile_on_change() {
        let mut ws = Workspace::in_memory(Config::default());
        let who = principal(Role::Member);
        let schema_id = published(&mut ws, &who);
        for status in ["active", "active", "closed"] {
            ws.create_record(&who, NewRecord { schema_id, data: json!({"status": status}), parent_id: None })
                .unwrap();
        }

        let report = ws
            .create_report(
                &who,
                NewReport {
                    name: "Active customers".into(),
                    schema_id: Some(schema_id),
                    query: status_is("active"),
                    ..NewReport::default()
                },
            )
            .unwrap();
        assert!(ws.compiled_reports.contains_key(&report.id));

        let result = ws.execute_report(&who, report.id, None, None).unwrap();
        assert_eq!(result.page.meta.total, 2);
        assert_eq!(
            result.sql,
            "SELECT data FROM erb_records WHERE tenant_id = $1 AND schema_id = $2 AND is_deleted = FALSE AND (data->>'status' = 'active')"
        );

        ws.update_report_query(&who, report.id, status_is("closed")).unwrap();
        assert!(!ws.compiled_reports.contains_key(&report.id));

        let result = ws.execute_report(&who, report.id, None, None).unwrap();
        assert_eq!(result.page.meta.total, 1);
        assert!(result.sql.ends_with("(data->>'status' = 'closed')"));
        assert!(ws.compiled_reports.contains_key(&report.id));
    }

    #[test]
    fn test_report_sharing_and_permissions() {
        let mut ws = Workspace::in_memory(Config::default());
        let author = principal(Role::Member);
        let peer = colleague(&author, Role::Member);
        let admin = colleague(&author, Role::Admin);

        let private = ws
            .create_report(&author, NewReport { name: "Mine".into(), ..NewReport::default() })
            .unwrap();
        assert!(ws.get_report(&peer, private.id).is_err());
        assert!(ws.execute_report(&peer, private.id, None, None).is_err());

        let shared = ws
            .create_report(&author, NewReport { name: "Ours".into(), is_shared: true, ..NewReport::default() })
            .unwrap();
        let result = ws.execute_report(&peer, shared.id, None, None).unwrap();
        assert_eq!(result.sql, "SELECT data FROM erb_records WHERE tenant_id = $1 AND is_deleted = FALSE");

        assert!(matches!(
            ws.update_report_query(&peer, shared.id, status_is("x")).unwrap_err(),
            ServiceError::Forbidden(Role::Member)
        ));
        assert!(ws.update_report_query(&admin, shared.id, status_is("x")).is_ok());
    }

    #[test]
    fn test_report_queries_are_validated() {
        let config = Config {
            compiler: CompilerOptions::strict(),
            ..Config::default()
        };
        let mut ws = Workspace::in_memory(config);
        let who = principal(Role::Member);
        let query = QueryBuilderValue::new(Combinator::Or, vec![QueryRule::leaf("age", "between", json!([1, 2]))]);
        let err = ws
            .create_report(&who, NewReport { name: "Broken".into(), query, ..NewReport::default() })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Compile(CompileError::UnknownOperator(_))));
    }

    #[test]
    fn test_delete_schema_only_archives_drafts() {
        let mut ws = Workspace::in_memory(Config::default());
        let who = principal(Role::Admin);
        let draft = ws.create_schema(&who, customer_schema()).unwrap();
        let live = published(&mut ws, &who);

        let deleted = ws.delete_schema(&who, draft.id).unwrap();
        assert_eq!(deleted.status, SchemaStatus::Archived);
        assert_eq!(ws.get_schema(&who, draft.id).unwrap().status, SchemaStatus::Archived);

        let err = ws.delete_schema(&who, live).unwrap_err();
        assert!(matches!(err, ServiceError::SchemaNotDeletable { status: SchemaStatus::Published, .. }));
        assert_eq!(err.code(), "INVALID_STATE");
        assert!(ws.delete_schema(&who, draft.id).is_err());

        let trail = ws.audit_trail(&who, Some("schema"), Some(draft.id), None, None).unwrap();
        assert_eq!(trail.rows[0].action, AuditAction::Delete);
        assert_eq!(trail.rows[0].changes["after"]["status"], "archived");
    }

    #[test]
    fn test_list_update_and_delete_reports() {
        let mut ws = Workspace::in_memory(Config::default());
        let author = principal(Role::Member);
        let peer = colleague(&author, Role::Member);

        let private = ws
            .create_report(&author, NewReport { name: "Mine".into(), ..NewReport::default() })
            .unwrap();
        let shared = ws
            .create_report(
                &author,
                NewReport {
                    name: "Revenue".into(),
                    visualization_type: VisualizationType::Chart,
                    chart_config: Some(ChartConfig {
                        x_axis: Some("month".into()),
                        y_axis: vec!["revenue".into()],
                        ..ChartConfig::default()
                    }),
                    is_shared: true,
                    ..NewReport::default()
                },
            )
            .unwrap();

        let names: Vec<&str> = ws.list_reports(&author).into_iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Mine") && names.contains(&"Revenue"));
        let seen: Vec<Uuid> = ws.list_reports(&peer).into_iter().map(|r| r.id).collect();
        assert_eq!(seen, [shared.id]);
        assert!(ws.list_reports(&principal(Role::Owner)).is_empty());

        let changes = ReportChanges {
            name: Some("Revenue by month".into()),
            is_shared: Some(false),
            shared_with: Some(vec![peer.user_id]),
            chart_config: Some(ChartConfig {
                y_axis: vec!["revenue".into(), "cost".into()],
                ..ChartConfig::default()
            }),
            ..ReportChanges::default()
        };
        let updated = ws.update_report(&author, shared.id, changes).unwrap();
        assert_eq!(updated.name, "Revenue by month");
        assert_eq!(updated.visualization_type, VisualizationType::Chart);
        assert_eq!(updated.chart_config.unwrap().y_axis, ["revenue", "cost"]);
        assert!(ws.compiled_reports.contains_key(&shared.id));
        assert!(ws.get_report(&peer, shared.id).is_ok());

        assert!(matches!(ws.delete_report(&peer, shared.id).unwrap_err(), ServiceError::Forbidden(Role::Member)));
        assert!(matches!(ws.delete_report(&peer, private.id).unwrap_err(), ServiceError::NotFound { .. }));

        ws.delete_report(&author, shared.id).unwrap();
        assert!(ws.get_report(&author, shared.id).is_err());
        assert!(!ws.compiled_reports.contains_key(&shared.id));
        assert!(ws.execute_report(&peer, shared.id, None, None).is_err());

        let trail = ws.audit_trail(&author, Some("report"), Some(shared.id), None, None).unwrap();
        let actions: Vec<AuditAction> = trail.rows.iter().map(|e| e.action).collect();
        assert_eq!(actions, [AuditAction::Delete, AuditAction::Update, AuditAction::Create]);
    }

    #[test]
    fn test_admins_edit_reports_not_shared_with_them() {
        let mut ws = Workspace::in_memory(Config::default());
        let author = principal(Role::Member);
        let admin = colleague(&author, Role::Admin);
        let owner = colleague(&author, Role::Owner);
        let private = ws
            .create_report(&author, NewReport { name: "Mine".into(), ..NewReport::default() })
            .unwrap();

        assert!(ws.get_report(&admin, private.id).is_err());
        let edited = ws.update_report_query(&admin, private.id, status_is("active")).unwrap();
        assert_eq!(edited.query, status_is("active"));
        ws.delete_report(&owner, private.id).unwrap();

        let stranger = principal(Role::Owner);
        let other = ws
            .create_report(&author, NewReport { name: "Other".into(), ..NewReport::default() })
            .unwrap();
        assert!(matches!(
            ws.update_report_query(&stranger, other.id, status_is("x")).unwrap_err(),
            ServiceError::NotFound { .. }
        ));
    }

    #[test]
    fn test_audit_entry_lookup() {
        let mut ws = Workspace::in_memory(Config::default());
        let who = principal(Role::Owner);
        let schema = ws.create_schema(&who, customer_schema()).unwrap();

        let trail = ws.audit_trail(&who, None, None, None, None).unwrap();
        assert_eq!(trail.meta.total, 1);
        let entry = ws.audit_entry(&who, trail.rows[0].id).unwrap();
        assert_eq!(entry.entity_id, schema.id);
        assert_eq!(entry.action, AuditAction::Create);
        assert_eq!(entry.entity_type, "schema");

        let err = ws.audit_entry(&principal(Role::Owner), entry.id).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "audit_log", .. }));
        assert!(ws.audit_entry(&who, Uuid::new_v4()).is_err());
    }
}
