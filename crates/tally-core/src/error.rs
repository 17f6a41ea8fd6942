//! Error types for Tally

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::XlsxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unsupported import file type: {0}")]
    UnsupportedFormat(String),

    #[error("Missing required column in header row: {0}")]
    MissingHeaderColumn(String),

    #[error("No transaction data: {0}")]
    NoData(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Repeated request: this import is still being processed")]
    RepeatedRequest,

    #[error("Too many transactions to import at once: {count} (maximum {max})")]
    TooManyTransactions { count: usize, max: usize },

    #[error("Failed to auto-create {entity} \"{name}\": {source}")]
    AutoCreate {
        entity: &'static str,
        name: String,
        #[source]
        source: Box<Error>,
    },
}

/// User-visible error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file type or container format is not supported
    UnsupportedFormat,
    /// The file lacks required columns or carries no importable rows
    MissingData,
    /// A duplicate submission of an import that is still running
    RepeatedRequest,
    /// The caller sent something malformed
    InvalidRequest,
    /// Anything else, including storage and entity-creation failures
    OperationFailed,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedFormat(_) | Self::Spreadsheet(_) | Self::Csv(_) => {
                ErrorKind::UnsupportedFormat
            }
            Self::MissingHeaderColumn(_) | Self::NoData(_) => ErrorKind::MissingData,
            Self::RepeatedRequest => ErrorKind::RepeatedRequest,
            Self::Import(_) | Self::InvalidData(_) | Self::TooManyTransactions { .. } => {
                ErrorKind::InvalidRequest
            }
            _ => ErrorKind::OperationFailed,
        }
    }

    /// Wrap a storage failure raised while auto-creating an entity
    pub(crate) fn auto_create(entity: &'static str, name: &str, source: Error) -> Self {
        Self::AutoCreate {
            entity,
            name: name.to_string(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::UnsupportedFormat("x".into()).kind(),
            ErrorKind::UnsupportedFormat
        );
        assert_eq!(
            Error::MissingHeaderColumn("Сумма".into()).kind(),
            ErrorKind::MissingData
        );
        assert_eq!(Error::RepeatedRequest.kind(), ErrorKind::RepeatedRequest);
        assert_eq!(
            Error::auto_create("tag", "Trip", Error::NotFound("group".into())).kind(),
            ErrorKind::OperationFailed
        );
    }

    #[test]
    fn test_auto_create_message_names_entity() {
        let err = Error::auto_create("account", "Wallet", Error::InvalidData("boom".into()));
        let msg = err.to_string();
        assert!(msg.contains("account"));
        assert!(msg.contains("\"Wallet\""));
        assert!(msg.contains("boom"));
    }
}
