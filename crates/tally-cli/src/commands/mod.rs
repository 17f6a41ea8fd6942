//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Database setup (init) and shared utilities (open_db, load_config)
//! - `entities` - Entity listings (accounts, categories, counterparties, tags)
//! - `import` - File import and preview
//! - `serve` - Web server command

pub mod core;
pub mod entities;
pub mod import;
pub mod serve;

// Re-export command functions for main.rs
pub use core::*;
pub use entities::*;
pub use import::*;
pub use serve::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
