//! Transaction import handlers
//!
//! The import flow is two-step: `parse_import` turns an uploaded file into
//! resolved transactions (creating missing accounts, categories,
//! counterparties and tags on the way), and `import` persists the
//! transactions the client confirmed.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{get_user_email, get_utc_offset, AppError, AppState};
use tally_core::{
    import::{
        parse_dsv_lines, AmountFormat, GeoOrder, RawRow, TRANSACTION_TIME_FORMAT,
    },
    import_progress, import_transactions as run_import, parse_file, prepare_import,
    models::{GeoLocation, NewTransaction, TransactionType},
    CreatedEntities, DsvOptions, ImportFileType, ImportOutcome, ImportedTransaction,
};

/// A file upload plus the form fields that came with it
#[derive(Default)]
struct UploadForm {
    file: Option<Vec<u8>>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    fn file_type(&self) -> Result<ImportFileType, AppError> {
        let value = self
            .field("fileType")
            .ok_or_else(|| AppError::bad_request("Missing fileType"))?;
        value.parse().map_err(AppError::from_core)
    }

    fn file(&self) -> Result<&[u8], AppError> {
        match &self.file {
            Some(data) if !data.is_empty() => Ok(data),
            _ => Err(AppError::bad_request("No file uploaded")),
        }
    }

    /// DSV options from the JSON-encoded mapping fields and the scalar settings
    fn dsv_options(&self, file_type: ImportFileType) -> Result<Option<DsvOptions>, AppError> {
        let Some(kind) = file_type.dsv_kind() else {
            return Ok(None);
        };

        let columns: HashMap<String, usize> = match self.field("columnMapping") {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| AppError::bad_request(&format!("Invalid columnMapping: {}", e)))?,
            None => return Err(AppError::bad_request("Missing columnMapping")),
        };
        let types: HashMap<String, String> = match self.field("transactionTypeMapping") {
            Some(json) => serde_json::from_str(json).map_err(|e| {
                AppError::bad_request(&format!("Invalid transactionTypeMapping: {}", e))
            })?,
            None => HashMap::new(),
        };

        let mut options = DsvOptions::new(kind)
            .with_column_names(&columns)
            .and_then(|o| o.with_type_names(&types))
            .map_err(AppError::from_core)?;

        if let Some(value) = self.field("hasHeaderLine") {
            options.has_header = parse_bool("hasHeaderLine", value)?;
        }
        if let Some(value) = self.field("timeFormat") {
            options.time_format = value.to_string();
        }
        if let Some(value) = self.field("timezoneFormat") {
            options.timezone_format = Some(value.to_string());
        }

        let mut amount_format = AmountFormat::default();
        if let Some(value) = self.field("amountDecimalSeparator") {
            amount_format.decimal_separator = single_char("amountDecimalSeparator", value)?;
        }
        if let Some(value) = self.fields.get("amountDigitGroupingSymbol") {
            amount_format.grouping_symbol = match value.as_str() {
                "" => None,
                other => Some(single_char("amountDigitGroupingSymbol", other)?),
            };
        }
        if Some(amount_format.decimal_separator) == amount_format.grouping_symbol {
            return Err(AppError::bad_request(
                "Decimal separator and digit grouping symbol must differ",
            ));
        }
        options.amount_format = amount_format;

        if let Some(value) = self.fields.get("geoSeparator").filter(|s| !s.is_empty()) {
            options.geo_separator = value.clone();
        }
        if let Some(value) = self.field("geoOrder") {
            options.geo_order = value
                .parse::<GeoOrder>()
                .map_err(|e| AppError::bad_request(&e))?;
        }
        if let Some(value) = self.fields.get("tagSeparator").filter(|s| !s.is_empty()) {
            options.tag_separator = value.clone();
        }

        Ok(Some(options))
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(AppError::bad_request(&format!("Invalid {}: {}", name, value))),
    }
}

fn single_char(name: &str, value: &str) -> Result<char, AppError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(AppError::bad_request(&format!(
            "{} must be a single character",
            name
        ))),
    }
}

/// Read every multipart field, enforcing the upload size limit
async fn read_upload(state: &AppState, mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let max_size = state.import.max_import_file_size;
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(&format!("Failed to read form field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::bad_request("Failed to read file data"))?;

                if bytes.len() > max_size {
                    return Err(AppError::bad_request(&format!(
                        "File too large. Maximum size is {} MB",
                        max_size / 1024 / 1024
                    )));
                }

                form.file = Some(bytes.to_vec());
            }
            "" => {}
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| AppError::bad_request(&format!("Failed to read {}", name)))?;
                form.fields.insert(name, value);
            }
        }
    }

    Ok(form)
}

/// Raw lines of a DSV file
#[derive(Serialize)]
pub struct DsvLinesResponse {
    pub lines: Vec<RawRow>,
}

/// POST /api/transactions/parse_dsv_file - Split a DSV file into raw lines
///
/// Lets the client show the file and build its column mapping.
pub async fn parse_dsv_file(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<DsvLinesResponse>, AppError> {
    let form = read_upload(&state, multipart).await?;
    let file_type = form.file_type()?;
    let kind = file_type.dsv_kind().ok_or_else(|| {
        AppError::bad_request(&format!("{} is not a delimiter-separated file type", file_type))
    })?;

    let lines = parse_dsv_lines(form.file()?, kind).map_err(AppError::from_core)?;
    debug!("Read {} lines from {} upload", lines.len(), file_type);

    Ok(Json(DsvLinesResponse { lines }))
}

/// Parsed transactions and the entities created for them
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseImportResponse {
    pub items: Vec<ImportedTransaction>,
    pub total_count: usize,
    pub created: CreatedEntities,
}

/// POST /api/transactions/parse_import - Parse an import file
///
/// Multipart form fields:
/// - fileType: one of dengioperacii, custom_csv, dsv_csv, dsv_tsv, dsv_xlsx (required)
/// - file: the file contents (required)
/// - columnMapping, transactionTypeMapping: JSON objects (DSV types)
/// - hasHeaderLine, timeFormat, timezoneFormat, amountDecimalSeparator,
///   amountDigitGroupingSymbol, geoSeparator, geoOrder, tagSeparator (DSV types, optional)
pub async fn parse_import(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ParseImportResponse>, AppError> {
    let user_email = get_user_email(&headers);
    let utc_offset = get_utc_offset(&headers)?;

    let form = read_upload(&state, multipart).await?;
    let file_type = form.file_type()?;
    let data = form.file()?;
    let dsv = form.dsv_options(file_type)?;

    let (table, settings) =
        parse_file(file_type, data, dsv, utc_offset).map_err(AppError::from_core)?;

    let user = state.db.get_or_create_user(&user_email)?;
    let existing = state
        .db
        .existing_entities(user.id)
        .map_err(AppError::from_core)?;
    let prepared = prepare_import(
        &state.db,
        &existing,
        &state.import.defaults,
        user.id,
        &table,
        &settings,
    )
    .map_err(AppError::from_core)?;

    if prepared.transactions.is_empty() {
        return Err(AppError::from_core(tally_core::Error::NoData(
            "file contains no transactions".to_string(),
        )));
    }

    info!(
        user = %user_email,
        file_type = %file_type,
        transactions = prepared.transactions.len(),
        created = prepared.created.total(),
        "Parsed import file"
    );

    Ok(Json(ParseImportResponse {
        total_count: prepared.transactions.len(),
        items: prepared.transactions,
        created: prepared.created,
    }))
}

/// One transaction confirmed by the client
#[derive(Debug, Deserialize)]
pub struct ImportTransactionRequest {
    pub transaction_type: String,
    /// Local time, `YYYY-MM-DD HH:MM:SS` (a `T` separator is accepted too)
    pub time: String,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    pub category_id: Option<i64>,
    pub account_id: i64,
    pub amount: i64,
    pub related_account_id: Option<i64>,
    #[serde(default)]
    pub related_amount: i64,
    pub counterparty_id: Option<i64>,
    #[serde(default)]
    pub description: String,
    pub geo_location: Option<GeoLocation>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

/// Request body for a batch import
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    #[serde(default)]
    pub client_session_id: String,
    pub transactions: Vec<ImportTransactionRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub imported: usize,
    /// True when the session had already been imported and nothing was written
    pub replayed: bool,
}

fn parse_time(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), TRANSACTION_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// Check one confirmed transaction and convert it for persistence
///
/// Transactions dated after `now_utc` are marked planned.
fn validate_transaction(
    index: usize,
    tx: &ImportTransactionRequest,
    max_tags: usize,
    now_utc: NaiveDateTime,
) -> Result<NewTransaction, AppError> {
    let invalid = |msg: &str| AppError::bad_request(&format!("Transaction {}: {}", index + 1, msg));

    let transaction_type: TransactionType = tx
        .transaction_type
        .parse()
        .map_err(|_| invalid(&format!("unknown type \"{}\"", tx.transaction_type)))?;

    let time = parse_time(&tx.time).ok_or_else(|| invalid(&format!("invalid time \"{}\"", tx.time)))?;

    match transaction_type {
        TransactionType::ModifyBalance if tx.category_id.is_some() => {
            return Err(invalid("balance modification cannot have a category"));
        }
        TransactionType::Transfer => {
            if tx.related_account_id == Some(tx.account_id) {
                return Err(invalid("transfer source and destination must differ"));
            }
        }
        _ => {}
    }
    if transaction_type != TransactionType::Transfer
        && (tx.related_account_id.is_some() || tx.related_amount != 0)
    {
        return Err(invalid("only transfers can have a destination account or amount"));
    }

    if tx.tag_ids.len() > max_tags {
        return Err(invalid(&format!("too many tags (maximum {})", max_tags)));
    }
    let tag_ids = tx
        .tag_ids
        .iter()
        .map(|id| {
            id.trim()
                .parse::<i64>()
                .map_err(|_| invalid(&format!("invalid tag id \"{}\"", id)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut transaction = NewTransaction {
        transaction_type,
        time,
        utc_offset_minutes: tx.utc_offset_minutes,
        category_id: tx.category_id,
        account_id: tx.account_id,
        amount: tx.amount,
        related_account_id: tx.related_account_id,
        related_amount: tx.related_amount,
        counterparty_id: tx.counterparty_id,
        description: tx.description.clone(),
        geo_location: tx.geo_location,
        planned: false,
        tag_ids,
    };
    transaction.mark_planned_if_future(now_utc);

    Ok(transaction)
}

/// POST /api/transactions/import - Persist confirmed transactions
///
/// Repeating a finished `clientSessionId` answers the earlier count without
/// writing anything; repeating one still in progress is a 409.
pub async fn import_transactions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, AppError> {
    let user_email = get_user_email(&headers);

    if request.transactions.is_empty() {
        return Err(AppError::bad_request("No transactions to import"));
    }

    let now_utc = Utc::now().naive_utc();
    let batch = request
        .transactions
        .iter()
        .enumerate()
        .map(|(i, tx)| validate_transaction(i, tx, state.import.max_tags_per_transaction, now_utc))
        .collect::<Result<Vec<_>, _>>()?;

    let user = state.db.get_or_create_user(&user_email)?;
    let session_id = request.client_session_id;

    // Persistence is blocking; keep it off the runtime so progress polls are served
    let worker = state.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        run_import(
            &worker.db,
            worker.remarks.as_ref(),
            user.id,
            &session_id,
            &batch,
        )
    })
    .await
    .map_err(|e| AppError::from(anyhow::anyhow!("import task failed: {}", e)))?
    .map_err(AppError::from_core)?;

    info!(user = %user_email, outcome = ?outcome, "Imported transactions");

    Ok(Json(ImportResponse {
        imported: outcome.count(),
        replayed: matches!(outcome, ImportOutcome::Replayed(_)),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProcessQuery {
    pub client_session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ImportProcessResponse {
    pub progress: Option<f64>,
}

/// GET /api/transactions/import/process - Progress of a running import
///
/// Answers a percentage, or null when the session is unknown or the
/// duplicate check is disabled.
pub async fn import_process(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ImportProcessQuery>,
) -> Result<Json<ImportProcessResponse>, AppError> {
    let user_email = get_user_email(&headers);
    let user = state.db.get_or_create_user(&user_email)?;

    let progress = state
        .remarks
        .as_ref()
        .and_then(|remarks| import_progress(remarks, user.id, &params.client_session_id));

    Ok(Json(ImportProcessResponse { progress }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(transaction_type: &str) -> ImportTransactionRequest {
        ImportTransactionRequest {
            transaction_type: transaction_type.to_string(),
            time: "2026-02-09 12:30:00".to_string(),
            utc_offset_minutes: 0,
            category_id: None,
            account_id: 1,
            amount: 100,
            related_account_id: None,
            related_amount: 0,
            counterparty_id: None,
            description: String::new(),
            geo_location: None,
            tag_ids: vec![],
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2026-03-01 00:00:00", TRANSACTION_TIME_FORMAT).unwrap()
    }

    #[test]
    fn test_future_transaction_is_planned() {
        let mut tx = request("expense");
        assert!(!validate_transaction(0, &tx, 10, now()).unwrap().planned);

        tx.time = "2026-03-01T02:00:00".to_string();
        assert!(validate_transaction(0, &tx, 10, now()).unwrap().planned);

        // 02:00 at UTC+3 is 23:00 the day before in UTC
        tx.utc_offset_minutes = 180;
        assert!(!validate_transaction(0, &tx, 10, now()).unwrap().planned);
    }

    #[test]
    fn test_type_rules() {
        let mut tx = request("modify_balance");
        tx.category_id = Some(3);
        assert!(validate_transaction(0, &tx, 10, now()).is_err());

        let mut tx = request("expense");
        tx.related_account_id = Some(2);
        assert!(validate_transaction(0, &tx, 10, now()).is_err());

        let mut tx = request("income");
        tx.related_amount = 5;
        assert!(validate_transaction(0, &tx, 10, now()).is_err());

        let mut tx = request("transfer");
        tx.related_account_id = Some(1);
        assert!(validate_transaction(0, &tx, 10, now()).is_err());

        tx.related_account_id = Some(2);
        tx.related_amount = 90;
        assert!(validate_transaction(0, &tx, 10, now()).is_ok());

        assert!(validate_transaction(0, &request("refund"), 10, now()).is_err());
    }

    #[test]
    fn test_tag_rules() {
        let mut tx = request("expense");
        tx.tag_ids = vec!["4".to_string(), " 7 ".to_string()];
        assert_eq!(
            validate_transaction(0, &tx, 2, now()).unwrap().tag_ids,
            vec![4, 7]
        );
        assert!(validate_transaction(0, &tx, 1, now()).is_err());

        tx.tag_ids = vec!["four".to_string()];
        assert!(validate_transaction(0, &tx, 10, now()).is_err());
    }

    #[test]
    fn test_single_char() {
        assert_eq!(single_char("x", ",").unwrap(), ',');
        assert!(single_char("x", "").is_err());
        assert!(single_char("x", ",.").is_err());
    }
}
