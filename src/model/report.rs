use super::principal::{Principal, Role};
use crate::query::QueryBuilderValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationType {
    #[default]
    Table,
    Chart,
    Map,
    Timeline,
}

/// Chart settings. Keys the builder adds beyond the known ones are kept in
/// `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub y_axis: Vec<String>,
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Saved report. The rule tree is the source of truth; compiled predicates
/// are derived from it on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<Uuid>,
    pub query: QueryBuilderValue,
    pub visualization_type: VisualizationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_config: Option<ChartConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub looker_studio_url: Option<String>,
    pub is_shared: bool,
    #[serde(default)]
    pub shared_with: Vec<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    pub fn new(tenant_id: Uuid, created_by: Uuid, name: impl Into<String>, query: QueryBuilderValue) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.into(),
            description: None,
            schema_id: None,
            query,
            visualization_type: VisualizationType::Table,
            chart_config: None,
            looker_studio_url: None,
            is_shared: false,
            shared_with: Vec::new(),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// The creator, anyone in `shared_with`, and the whole tenant once the
    /// report is shared.
    pub fn is_visible_to(&self, who: &Principal) -> bool {
        who.tenant_id == self.tenant_id
            && (self.created_by == who.user_id || self.is_shared || self.shared_with.contains(&who.user_id))
    }

    /// The creator, plus the tenant's admins and owners whether or not the
    /// report is shared with them.
    pub fn is_editable_by(&self, who: &Principal) -> bool {
        who.tenant_id == self.tenant_id
            && (self.created_by == who.user_id || matches!(who.role, Role::Owner | Role::Admin))
    }
}
