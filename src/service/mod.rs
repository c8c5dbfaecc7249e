//! Workspace operations over the compilers and the storage collaborators.

mod error;
mod workspace;

pub use error::{ServiceError, FORBIDDEN, INVALID_STATE, NOT_FOUND, STORAGE_ERROR};
pub use workspace::{NewRecord, NewReport, NewSchema, PublishOutcome, ReportChanges, ReportResult, Workspace};
