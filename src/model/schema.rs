use crate::error::CompileError;
use crate::ident::normalize_identifier;
use crate::schema::SchemaDefinition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl SchemaStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    /// Publishing a published schema is accepted so publish can be retried.
    pub fn can_transition_to(self, next: SchemaStatus) -> bool {
        use SchemaStatus::*;
        matches!(
            (self, next),
            (Draft, Published) | (Published, Published) | (Published, Archived) | (Draft, Archived) | (Archived, Draft)
        )
    }
}

impl fmt::Display for SchemaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot move schema from {from} to {to}")]
pub struct InvalidTransition {
    pub from: SchemaStatus,
    pub to: SchemaStatus,
}

/// A tenant's schema and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErbSchema {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub table_name: String,
    pub status: SchemaStatus,
    pub definition: SchemaDefinition,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ErbSchema {
    /// New draft schema. Fails if the name does not normalize to a table
    /// name.
    pub fn new(
        tenant_id: Uuid,
        created_by: Uuid,
        name: &str,
        definition: SchemaDefinition,
    ) -> Result<Self, CompileError> {
        let table_name = normalize_identifier(name)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.to_string(),
            slug: slugify(name),
            description: None,
            table_name,
            status: SchemaStatus::Draft,
            definition,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_editable(&self) -> bool {
        self.status == SchemaStatus::Draft
    }

    pub fn transition(&mut self, next: SchemaStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if self.status != next {
            self.status = next;
            self.touch();
        }
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// URL slug: lowercase alphanumerics separated by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
