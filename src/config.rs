//! Process-wide configuration, built once at startup and passed down.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub compiler: CompilerOptions,
    pub storage: StorageLayout,
    pub records: RecordDefaults,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

/// Knobs shared by the schema and query compilers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Turn silently absorbed input (unknown types, malformed rules, bad
    /// defaults) into errors.
    pub strict: bool,
    /// Maximum rule-group nesting accepted from a query tree.
    pub max_depth: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_depth: 32,
        }
    }
}

impl CompilerOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }
}

/// Names of the platform tables and columns generated DDL refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageLayout {
    pub schema_table: String,
    pub tenant_table: String,
    pub user_table: String,
    pub tenant_column: String,
    pub records_table: String,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            schema_table: "erb_schemas".to_string(),
            tenant_table: "tenants".to_string(),
            user_table: "auth_users".to_string(),
            tenant_column: "tenant_id".to_string(),
            records_table: "erb_records".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordDefaults {
    pub page_size: usize,
    pub max_page_size: usize,
}

impl Default for RecordDefaults {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_page_size: 500,
        }
    }
}
