//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Import configuration with the override file applied
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{Database, ImportConfig};
use tracing::debug;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", db_path.display()))?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load the import configuration, preferring an explicit `--config` file
pub fn load_config(config_path: Option<&Path>) -> Result<ImportConfig> {
    let config = ImportConfig::load(config_path).context("Failed to load import config")?;
    debug!(
        max_file_size = config.max_import_file_size,
        max_transactions = config.max_transactions_per_import,
        duplicate_check = config.duplicate_check_enabled,
        "Loaded import config"
    );
    Ok(config)
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;

    if db.is_encrypted()? {
        println!("   🔒 Encryption: ENABLED");
    } else {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Preview a file: tally preview --file export.csv --format custom_csv");
    println!("  2. Import it: tally import --file export.csv --format custom_csv");
    println!("  3. Start web UI: tally serve");

    Ok(())
}
