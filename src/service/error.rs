use crate::error::{CompileError, INVALID_INPUT};
use crate::model::{InvalidTransition, Role, SchemaStatus};
use crate::store::StorageError;
use thiserror::Error;
use uuid::Uuid;

pub const NOT_FOUND: &str = "NOT_FOUND";
pub const FORBIDDEN: &str = "FORBIDDEN";
pub const INVALID_STATE: &str = "INVALID_STATE";
pub const STORAGE_ERROR: &str = "STORAGE_ERROR";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("Invalid record data: {0}")]
    InvalidRecord(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("Role {0} cannot modify workspace data")]
    Forbidden(Role),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("Schema {id} is {status}; only draft schemas can be edited")]
    SchemaNotEditable { id: Uuid, status: SchemaStatus },
    #[error("Schema {id} is {status}; only draft schemas can be deleted")]
    SchemaNotDeletable { id: Uuid, status: SchemaStatus },
    #[error("Schema {0} is not published")]
    SchemaNotPublished(Uuid),
    #[error(transparent)]
    Store(#[from] StorageError),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Compile(err) => err.code(),
            Self::InvalidRecord(_) => INVALID_INPUT,
            Self::NotFound { .. } => NOT_FOUND,
            Self::Forbidden(_) => FORBIDDEN,
            Self::InvalidTransition(_)
            | Self::SchemaNotEditable { .. }
            | Self::SchemaNotDeletable { .. }
            | Self::SchemaNotPublished(_) => INVALID_STATE,
            Self::Store(_) => STORAGE_ERROR,
        }
    }
}
