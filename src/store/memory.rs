//! In-memory adapters for tests, the CLI and the browser build.

use super::{AuditQuery, AuditSink, Page, RecordQuery, RecordStore, StorageError, StorageExecutor};
use crate::model::{AuditLog, Record};
use uuid::Uuid;

/// Records every statement it runs. Running a statement it has already
/// run reports `AlreadyExists`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    executed: Vec<String>,
    fail_with: Option<StorageError>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A storage that rejects every statement with `error`.
    pub fn failing(error: StorageError) -> Self {
        Self {
            executed: Vec::new(),
            fail_with: Some(error),
        }
    }

    pub fn executed(&self) -> &[String] {
        &self.executed
    }
}

impl StorageExecutor for MemoryStorage {
    fn execute(&mut self, statement: &str) -> Result<(), StorageError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        if self.executed.iter().any(|done| done == statement) {
            return Err(StorageError::AlreadyExists);
        }
        self.executed.push(statement.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: Vec<Record>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored rows including tombstones.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryRecordStore {
    fn insert(&mut self, record: Record) -> Result<(), StorageError> {
        if self.records.iter().any(|r| r.id == record.id) {
            return Err(StorageError::AlreadyExists);
        }
        self.records.push(record);
        Ok(())
    }

    fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Record>, StorageError> {
        Ok(self
            .records
            .iter()
            .find(|r| r.id == id && r.tenant_id == tenant_id)
            .cloned())
    }

    fn update(&mut self, record: Record) -> Result<(), StorageError> {
        let slot = self
            .records
            .iter_mut()
            .find(|r| r.id == record.id && r.tenant_id == record.tenant_id)
            .ok_or_else(|| StorageError::Rejected(format!("no record {}", record.id)))?;
        *slot = record;
        Ok(())
    }

    fn query(&self, query: &RecordQuery) -> Result<Page<Record>, StorageError> {
        // Newest first; among equal timestamps the later insert wins.
        let mut rows: Vec<Record> = self.records.iter().rev().filter(|r| query.matches(r)).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(rows, query.pagination))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    entries: Vec<AuditLog>,
    fail_with: Option<StorageError>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: StorageError) -> Self {
        Self {
            entries: Vec::new(),
            fail_with: Some(error),
        }
    }

    pub fn entries(&self) -> &[AuditLog] {
        &self.entries
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&mut self, entry: AuditLog) -> Result<(), StorageError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.entries.push(entry);
        Ok(())
    }

    fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<AuditLog>, StorageError> {
        Ok(self
            .entries
            .iter()
            .find(|e| e.id == id && e.tenant_id == tenant_id)
            .cloned())
    }

    fn list(&self, query: &AuditQuery) -> Result<Page<AuditLog>, StorageError> {
        let rows: Vec<AuditLog> = self.entries.iter().rev().filter(|e| query.matches(e)).cloned().collect();
        Ok(Page::slice(rows, query.pagination))
    }
}
