//! Centralized error handling for the fileguard host
//!
//! # Error Categories
//!
//! - **Configuration Errors**: unreadable files, bad environment overrides, invalid values
//! - **Policy Errors**: relative or missing roots, blocked patterns that do not compile
//! - **Rejections**: typed refusals from the path pipeline, surfaced to tool callers as
//!   [`ToolError`]
//!
//! # Usage
//!
//! ```rust
//! use fileguard::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for tool handler Results
pub type ToolResult<T> = Result<T, ToolError>;
