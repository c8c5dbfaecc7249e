use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Whether a record is a top-level entry or a child of another record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    #[default]
    Main,
    Sub,
}

/// One JSON document stored under a published schema. Records are never
/// removed; deletion sets the tombstone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub schema_id: Uuid,
    pub tenant_id: Uuid,
    pub module_type: ModuleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    pub data: Value,
    pub version: u32,
    pub is_deleted: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(schema_id: Uuid, tenant_id: Uuid, created_by: Uuid, data: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            schema_id,
            tenant_id,
            module_type: ModuleType::Main,
            parent_id: None,
            data,
            version: 1,
            is_deleted: false,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.module_type = ModuleType::Sub;
        self.parent_id = Some(parent_id);
        self
    }

    /// Replace the document and bump the version.
    pub fn apply_update(&mut self, data: Value) {
        self.data = data;
        self.version += 1;
        self.updated_at = Utc::now();
    }

    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
        self.updated_at = Utc::now();
    }
}
