//! Tally Core Library
//!
//! Transaction import pipeline for the Tally finance tool:
//! - Format adapters for spreadsheet and delimited exports
//! - Transfer-leg pairing and table normalization
//! - Name-to-entity resolution with auto-creation of missing entities
//! - Guarded batch persistence with progress reporting
//! - Encrypted SQLite storage

pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod store;

pub use config::{BatchLimits, EntityDefaults, ImportConfig, ProgressSettings};
pub use db::Database;
pub use error::{Error, ErrorKind, Result};
pub use import::{
    import_progress, import_transactions, parse_file, prepare_import, CreatedEntities,
    DsvOptions, ImportFileType, ImportOutcome, ImportedTransaction, InMemorySubmissionRemarks,
    NormalizedTable, PreparedImport, SubmissionRemarks,
};
pub use store::{
    AccountStore, CategoryStore, CounterpartyStore, EntityStore, TagStore, TransactionStore,
};
