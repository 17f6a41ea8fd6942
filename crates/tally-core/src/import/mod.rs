//! Transaction file import
//!
//! Each supported file type has a [`FormatAdapter`] that turns raw cells into
//! normalized rows. From there every format shares the same path: transfer
//! pairing, the generic [`DataTableImporter`], entity auto-creation, and the
//! guarded batch insert.

mod custom;
mod decode;
mod dengi_operacii;
mod dsv;
mod guard;
mod importer;
mod matcher;
mod resolve;
mod source;
mod table;

use tracing::debug;

use crate::config::EntityDefaults;
use crate::error::{Error, Result};
use crate::store::EntityStore;

pub use custom::CustomCsv;
pub use decode::{
    decode_amount, decode_amount_with, decode_date, format_minor_units, format_transaction_time,
    format_utc_offset, parse_minor_units, parse_utc_offset, AmountFormat, DecodedAmount,
    TRANSACTION_TIME_FORMAT,
};
pub use dengi_operacii::DengiOperacii;
pub use dsv::{Dsv, DsvOptions};
pub use guard::{
    import_progress, import_transactions, ImportOutcome, InMemorySubmissionRemarks,
    SubmissionRemarks, SubmissionState,
};
pub use importer::{
    AccountSlot, DataTableImporter, ExistingEntities, GeoOrder, ImportResult, ImportedTag,
    ImportedTransaction, ImporterSettings, PendingAccount, PendingCategory, PendingEntities,
    PendingTag,
};
pub use matcher::{match_transfers, ParsedLeg};
pub use resolve::{CreatedEntities, EntityResolver};
pub use source::{excel_serial_to_date, parse_dsv_lines, DsvKind, HeaderIndex, RawRow};
pub use table::{Column, GroupedTag, NormalizedRow, NormalizedTable};

/// A file format that can be normalized into a [`NormalizedTable`]
pub trait FormatAdapter {
    /// Per-file state derived from the header row
    type Context;

    fn read_grid(&self, data: &[u8]) -> Result<Vec<RawRow>>;

    /// Whether the first grid row is a header
    fn has_header(&self) -> bool {
        true
    }

    /// Validate the header; fails before any data row is looked at
    fn context(&self, header: &[String]) -> Result<Self::Context>;

    /// Turn one data row into a leg, or `None` to skip it
    fn parse_row(&self, ctx: &Self::Context, row: &[String]) -> Result<Option<ParsedLeg>>;

    /// How the importer should read this format's normalized values
    fn settings(&self) -> ImporterSettings;
}

/// Normalize file bytes with `adapter`
pub fn normalize<A: FormatAdapter + ?Sized>(adapter: &A, data: &[u8]) -> Result<NormalizedTable> {
    if data.is_empty() {
        return Err(Error::NoData("file is empty".to_string()));
    }
    let grid = adapter.read_grid(data)?;
    normalize_grid(adapter, &grid)
}

/// Normalize an already-read grid of cells
pub fn normalize_grid<A: FormatAdapter + ?Sized>(
    adapter: &A,
    grid: &[RawRow],
) -> Result<NormalizedTable> {
    if grid.is_empty() {
        return Err(Error::NoData("file has no rows".to_string()));
    }

    let (header, rows): (&[String], &[RawRow]) = if adapter.has_header() {
        (grid[0].as_slice(), &grid[1..])
    } else {
        (&[], grid)
    };

    let ctx = adapter.context(header)?;

    if rows.is_empty() {
        return Err(Error::NoData("file has no data rows".to_string()));
    }

    let mut legs = Vec::with_capacity(rows.len());
    for row in rows {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        if let Some(leg) = adapter.parse_row(&ctx, row)? {
            legs.push(leg);
        }
    }

    debug!("Parsed {} legs from {} rows", legs.len(), rows.len());

    Ok(match_transfers(legs))
}

/// Supported import file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFileType {
    DengiOperacii,
    CustomCsv,
    DsvCsv,
    DsvTsv,
    DsvXlsx,
}

impl ImportFileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DengiOperacii => "dengioperacii",
            Self::CustomCsv => "custom_csv",
            Self::DsvCsv => "dsv_csv",
            Self::DsvTsv => "dsv_tsv",
            Self::DsvXlsx => "dsv_xlsx",
        }
    }

    /// DSV container kind, for the caller-mapped formats
    pub fn dsv_kind(&self) -> Option<DsvKind> {
        match self {
            Self::DsvCsv => Some(DsvKind::Csv),
            Self::DsvTsv => Some(DsvKind::Tsv),
            Self::DsvXlsx => Some(DsvKind::Xlsx),
            Self::DengiOperacii | Self::CustomCsv => None,
        }
    }
}

impl std::str::FromStr for ImportFileType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dengioperacii" => Ok(Self::DengiOperacii),
            "custom_csv" => Ok(Self::CustomCsv),
            "dsv_csv" => Ok(Self::DsvCsv),
            "dsv_tsv" => Ok(Self::DsvTsv),
            "dsv_xlsx" => Ok(Self::DsvXlsx),
            other => Err(Error::UnsupportedFormat(format!(
                "unknown import file type \"{}\"",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ImportFileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalize a file of the given type
///
/// DSV types need `dsv` options; their container kind always follows `file_type`.
/// `utc_offset_minutes` applies to rows without a timezone column.
pub fn parse_file(
    file_type: ImportFileType,
    data: &[u8],
    dsv: Option<DsvOptions>,
    utc_offset_minutes: i32,
) -> Result<(NormalizedTable, ImporterSettings)> {
    let (table, mut settings) = match file_type.dsv_kind() {
        None if file_type == ImportFileType::DengiOperacii => {
            let adapter = DengiOperacii;
            (normalize(&adapter, data)?, adapter.settings())
        }
        None => {
            let adapter = CustomCsv;
            (normalize(&adapter, data)?, adapter.settings())
        }
        Some(kind) => {
            let mut options = dsv.ok_or_else(|| {
                Error::InvalidData(format!("{} import needs a column mapping", file_type))
            })?;
            options.kind = kind;
            let adapter = Dsv::new(options);
            (normalize(&adapter, data)?, adapter.settings())
        }
    };

    settings.default_utc_offset_minutes = utc_offset_minutes;
    Ok((table, settings))
}

/// A parsed file whose referenced entities all exist
#[derive(Debug, Clone)]
pub struct PreparedImport {
    pub transactions: Vec<ImportedTransaction>,
    pub created: CreatedEntities,
}

/// Import a normalized table for `uid`, creating missing entities in `store`
///
/// Entity creation is not transactional: a failure part-way leaves the
/// entities created so far in place.
pub fn prepare_import<S: EntityStore + ?Sized>(
    store: &S,
    existing: &ExistingEntities,
    defaults: &EntityDefaults,
    uid: i64,
    table: &NormalizedTable,
    settings: &ImporterSettings,
) -> Result<PreparedImport> {
    let mut result = DataTableImporter::new(settings, existing).import(table)?;
    let created = EntityResolver::new(store, defaults).resolve(uid, &mut result)?;

    Ok(PreparedImport {
        transactions: result.transactions,
        created,
    })
}
