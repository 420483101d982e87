//! Host side of the file access engine: configuration, audit trail, the gateway tool
//! handlers call through, and the `fileguard` command line.

pub mod audit;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod logging;

pub use audit::{AuditAction, AuditLogger, AuditOutcome, AuditRecord};
pub use config::{Config, ConfigPolicySource};
pub use errors::{AppError, AppResult, ToolError, ToolResult};
pub use gateway::{AccessIntent, InspectReport, ToolGateway};
