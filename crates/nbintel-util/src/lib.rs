//! Shared utilities for nbintel.
//!
//! Identifier generation, logging setup, tolerant JSON parsing and
//! small text helpers used across the workspace.

pub mod id;
pub mod json;
pub mod log;
pub mod text;

pub use id::{IdPrefix, Identifier};
pub use json::parse_tolerant;
pub use text::extract_generated_code;
