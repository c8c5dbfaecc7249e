//! Collaborators the service layer talks to, plus in-memory adapters.

mod memory;
mod page;

pub use memory::{MemoryAuditSink, MemoryRecordStore, MemoryStorage};
pub use page::{Page, PageMeta, Pagination};

use crate::model::{AuditLog, Record};
use crate::query::Predicate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The object being created is already there. Callers treat this as
    /// success.
    #[error("Already exists")]
    AlreadyExists,
    #[error("Rejected by storage: {0}")]
    Rejected(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Runs generated DDL against the tenant database, one statement per call.
pub trait StorageExecutor {
    fn execute(&mut self, statement: &str) -> Result<(), StorageError>;
}

/// Record documents, scoped by tenant.
pub trait RecordStore {
    fn insert(&mut self, record: Record) -> Result<(), StorageError>;

    /// Tombstoned records are returned; callers decide what that means.
    fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Record>, StorageError>;

    /// Replace a stored record by id.
    fn update(&mut self, record: Record) -> Result<(), StorageError>;

    /// Live records matching the query, newest first.
    fn query(&self, query: &RecordQuery) -> Result<Page<Record>, StorageError>;
}

/// Append-only audit trail.
pub trait AuditSink {
    fn append(&mut self, entry: AuditLog) -> Result<(), StorageError>;

    fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<AuditLog>, StorageError>;

    /// Matching entries, newest first.
    fn list(&self, query: &AuditQuery) -> Result<Page<AuditLog>, StorageError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub tenant_id: Uuid,
    pub schema_id: Option<Uuid>,
    pub filter: Option<Predicate>,
    pub pagination: Pagination,
}

impl RecordQuery {
    pub fn new(tenant_id: Uuid, pagination: Pagination) -> Self {
        Self {
            tenant_id,
            schema_id: None,
            filter: None,
            pagination,
        }
    }

    pub fn in_schema(mut self, schema_id: Uuid) -> Self {
        self.schema_id = Some(schema_id);
        self
    }

    pub fn filtered(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.tenant_id == self.tenant_id
            && !record.is_deleted
            && self.schema_id.is_none_or(|id| record.schema_id == id)
            && self.filter.as_ref().is_none_or(|f| f.matches(&record.data))
    }
}

/// Filter for reading the audit trail back.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditQuery {
    pub tenant_id: Uuid,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub pagination: Pagination,
}

impl AuditQuery {
    pub fn new(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            entity_type: None,
            entity_id: None,
            pagination: Pagination::default(),
        }
    }

    pub fn entity(mut self, entity_type: impl Into<String>, entity_id: Option<Uuid>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = entity_id;
        self
    }

    pub fn paged(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn matches(&self, entry: &AuditLog) -> bool {
        entry.tenant_id == self.tenant_id
            && self.entity_type.as_deref().is_none_or(|t| entry.entity_type == t)
            && self.entity_id.is_none_or(|id| entry.entity_id == id)
    }
}
