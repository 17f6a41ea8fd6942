//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod entities;
pub mod import;

// Re-export all handlers for use in router
pub use entities::*;
pub use import::*;
