//! Import configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override (explicit path, or ~/.local/share/tally/config/import.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Missing keys in an override keep their default values.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/import.toml");

/// Presentation attributes applied to auto-created entities
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDefaults {
    pub account_currency: String,
    pub account_icon: i64,
    pub account_color: String,
    pub category_icon: i64,
    pub category_color: String,
    pub counterparty_icon: i64,
    pub counterparty_color: String,
}

impl Default for EntityDefaults {
    fn default() -> Self {
        Self {
            account_currency: "USD".to_string(),
            account_icon: 1,
            account_color: "588a6a".to_string(),
            category_icon: 1,
            category_color: "588a6a".to_string(),
            counterparty_icon: 0,
            counterparty_color: "588a6a".to_string(),
        }
    }
}

/// How often batch persistence reports progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSettings {
    pub min_update_step: usize,
    pub step_divisor: usize,
}

impl ProgressSettings {
    /// Number of rows between two progress reports for a batch of `len` rows
    pub fn update_step(&self, len: usize) -> usize {
        let divided = len / self.step_divisor.max(1);
        self.min_update_step.max(divided).max(1)
    }
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            min_update_step: 100,
            step_divisor: 100,
        }
    }
}

/// Limits applied by batch persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_transactions: usize,
    pub progress: ProgressSettings,
}

impl Default for BatchLimits {
    fn default() -> Self {
        ImportConfig::default().batch_limits()
    }
}

/// Import pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    pub max_import_file_size: usize,
    pub max_tags_per_transaction: usize,
    pub max_transactions_per_import: usize,
    pub duplicate_check_enabled: bool,
    pub duplicate_check_expiry: Duration,
    pub defaults: EntityDefaults,
    pub progress: ProgressSettings,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_import_file_size: 10 * 1024 * 1024,
            max_tags_per_transaction: 10,
            max_transactions_per_import: 65535,
            duplicate_check_enabled: true,
            duplicate_check_expiry: Duration::from_secs(300),
            defaults: EntityDefaults::default(),
            progress: ProgressSettings::default(),
        }
    }
}

impl ImportConfig {
    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            max_transactions: self.max_transactions_per_import,
            progress: self.progress,
        }
    }

    /// Load config, preferring `override_path`, then the data-dir override, then defaults
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let content = match override_path {
            Some(path) => read_config(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => read_config(&path)?,
                _ => DEFAULT_CONFIG.to_string(),
            },
        };

        parse_config(&content)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config").join("import.toml"))
}

fn read_config(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    limits: Option<RawLimits>,
    duplicate_check: Option<RawDuplicateCheck>,
    defaults: Option<RawDefaults>,
    progress: Option<RawProgress>,
}

#[derive(Debug, Deserialize)]
struct RawLimits {
    max_import_file_size: Option<usize>,
    max_tags_per_transaction: Option<usize>,
    max_transactions_per_import: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawDuplicateCheck {
    enabled: Option<bool>,
    expiry_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawDefaults {
    account_currency: Option<String>,
    account_icon: Option<i64>,
    account_color: Option<String>,
    category_icon: Option<i64>,
    category_color: Option<String>,
    counterparty_icon: Option<i64>,
    counterparty_color: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProgress {
    min_update_step: Option<usize>,
    step_divisor: Option<usize>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<ImportConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = ImportConfig::default();

    if let Some(limits) = raw.limits {
        if let Some(size) = limits.max_import_file_size {
            config.max_import_file_size = size;
        }
        if let Some(tags) = limits.max_tags_per_transaction {
            config.max_tags_per_transaction = tags;
        }
        if let Some(max) = limits.max_transactions_per_import {
            config.max_transactions_per_import = max;
        }
    }

    if let Some(dup) = raw.duplicate_check {
        if let Some(enabled) = dup.enabled {
            config.duplicate_check_enabled = enabled;
        }
        if let Some(secs) = dup.expiry_secs {
            config.duplicate_check_expiry = Duration::from_secs(secs);
        }
    }

    if let Some(defaults) = raw.defaults {
        let d = &mut config.defaults;
        if let Some(v) = defaults.account_currency {
            d.account_currency = v;
        }
        if let Some(v) = defaults.account_icon {
            d.account_icon = v;
        }
        if let Some(v) = defaults.account_color {
            d.account_color = v;
        }
        if let Some(v) = defaults.category_icon {
            d.category_icon = v;
        }
        if let Some(v) = defaults.category_color {
            d.category_color = v;
        }
        if let Some(v) = defaults.counterparty_icon {
            d.counterparty_icon = v;
        }
        if let Some(v) = defaults.counterparty_color {
            d.counterparty_color = v;
        }
    }

    if let Some(progress) = raw.progress {
        if let Some(step) = progress.min_update_step {
            config.progress.min_update_step = step;
        }
        if let Some(divisor) = progress.step_divisor {
            if divisor == 0 {
                return Err(Error::Config("progress.step_divisor must be positive".into()));
            }
            config.progress.step_divisor = divisor;
        }
    }

    Ok(config)
}
