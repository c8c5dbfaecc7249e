use super::principal::Principal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Publish,
    Sync,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Publish => "publish",
            Self::Sync => "sync",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub changes: Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(
        who: &Principal,
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: Uuid,
        changes: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: who.tenant_id,
            user_id: who.user_id,
            action,
            entity_type: entity_type.into(),
            entity_id,
            changes,
            created_at: Utc::now(),
        }
    }

    /// `{"before": .., "after": ..}`, with null for a missing side.
    pub fn changes<B: Serialize, A: Serialize>(before: Option<&B>, after: Option<&A>) -> Value {
        json!({
            "before": before.and_then(|b| serde_json::to_value(b).ok()),
            "after": after.and_then(|a| serde_json::to_value(a).ok()),
        })
    }
}
