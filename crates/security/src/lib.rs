//! Security module for Crm — filesystem sandboxing for tool calls.
//!
//! Provides path validation so `crm_tools`'s file-read/file-write tools
//! cannot escape the configured workspace roots or touch forbidden paths.

pub mod path;

pub use path::{validate_path, PathValidationError};
