//! Tenant-owned entities the service layer manages.

mod audit;
mod principal;
mod record;
mod report;
mod schema;

pub use audit::{AuditAction, AuditLog};
pub use principal::{Principal, Role};
pub use record::{ModuleType, Record};
pub use report::{ChartConfig, Report, VisualizationType};
pub use schema::{slugify, ErbSchema, InvalidTransition, SchemaStatus};
