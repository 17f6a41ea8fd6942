//! Generic delimiter-separated files (CSV, TSV, or a spreadsheet)
//!
//! Nothing is assumed about the layout: the caller supplies the column
//! positions, the transaction type names and the number conventions.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};

use super::decode::{
    decode_amount_with, format_utc_offset, parse_utc_offset, AmountFormat,
    TRANSACTION_TIME_FORMAT,
};
use super::importer::{GeoOrder, ImporterSettings};
use super::matcher::ParsedLeg;
use super::source::{read_delimited, read_xlsx, DsvKind, RawRow};
use super::table::{Column, NormalizedRow};
use super::FormatAdapter;
use crate::error::{Error, Result};
use crate::models::TransactionType;

/// Columns copied through verbatim (trimmed)
const TEXT_COLUMNS: [Column; 11] = [
    Column::Category,
    Column::SubCategory,
    Column::AccountName,
    Column::AccountCurrency,
    Column::RelatedAccountName,
    Column::RelatedAccountCurrency,
    Column::GeographicLocation,
    Column::Tags,
    Column::TagGroup,
    Column::Description,
    Column::Payee,
];

const REQUIRED_COLUMNS: [Column; 3] = [
    Column::TransactionTime,
    Column::TransactionType,
    Column::Amount,
];

/// Caller-supplied description of a DSV file
#[derive(Debug, Clone)]
pub struct DsvOptions {
    pub kind: DsvKind,
    /// Normalized column to cell position
    pub column_mapping: HashMap<Column, usize>,
    /// Cell value of the type column to transaction type
    pub type_mapping: HashMap<String, TransactionType>,
    pub has_header: bool,
    /// chrono format of the time column; a date-only format is accepted
    pub time_format: String,
    /// chrono offset format of the timezone column (`%z`, `%:z`); flexible when unset
    pub timezone_format: Option<String>,
    pub amount_format: AmountFormat,
    pub geo_separator: String,
    pub geo_order: GeoOrder,
    pub tag_separator: String,
}

impl DsvOptions {
    pub fn new(kind: DsvKind) -> Self {
        Self {
            kind,
            column_mapping: HashMap::new(),
            type_mapping: HashMap::new(),
            has_header: true,
            time_format: TRANSACTION_TIME_FORMAT.to_string(),
            timezone_format: None,
            amount_format: AmountFormat::default(),
            geo_separator: " ".to_string(),
            geo_order: GeoOrder::LonLat,
            tag_separator: ";".to_string(),
        }
    }

    /// Build the column mapping from column names (`"amount" -> 3`)
    pub fn with_column_names(mut self, names: &HashMap<String, usize>) -> Result<Self> {
        for (name, position) in names {
            let column: Column = name.parse().map_err(Error::InvalidData)?;
            self.column_mapping.insert(column, *position);
        }
        Ok(self)
    }

    /// Build the type mapping from type names (`"Spent" -> "expense"`)
    pub fn with_type_names(mut self, names: &HashMap<String, String>) -> Result<Self> {
        for (value, ty) in names {
            let ty: TransactionType = ty.parse().map_err(Error::InvalidData)?;
            self.type_mapping.insert(value.trim().to_string(), ty);
        }
        Ok(self)
    }
}

/// DSV adapter over caller-supplied options
#[derive(Debug, Clone)]
pub struct Dsv {
    options: DsvOptions,
}

impl Dsv {
    pub fn new(options: DsvOptions) -> Self {
        Self { options }
    }

    fn cell<'a>(&self, raw: &'a [String], column: Column) -> &'a str {
        self.options
            .column_mapping
            .get(&column)
            .and_then(|i| raw.get(*i))
            .map(|s| s.trim())
            .unwrap_or("")
    }

    fn parse_time(&self, raw: &str) -> Result<NaiveDateTime> {
        let format = &self.options.time_format;
        NaiveDateTime::parse_from_str(raw, format)
            .or_else(|_| {
                NaiveDate::parse_from_str(raw, format).map(|d| d.and_time(chrono::NaiveTime::MIN))
            })
            .map_err(|_| {
                Error::Import(format!(
                    "Time \"{}\" does not match format \"{}\"",
                    raw, format
                ))
            })
    }
}

impl FormatAdapter for Dsv {
    type Context = ();

    fn read_grid(&self, data: &[u8]) -> Result<Vec<RawRow>> {
        match self.options.kind {
            DsvKind::Csv => read_delimited(data, b','),
            DsvKind::Tsv => read_delimited(data, b'\t'),
            DsvKind::Xlsx => read_xlsx(data),
        }
    }

    fn has_header(&self) -> bool {
        self.options.has_header
    }

    fn context(&self, _header: &[String]) -> Result<()> {
        match REQUIRED_COLUMNS
            .iter()
            .find(|c| !self.options.column_mapping.contains_key(*c))
        {
            Some(missing) => Err(Error::MissingHeaderColumn(missing.to_string())),
            None => Ok(()),
        }
    }

    fn parse_row(&self, _ctx: &(), raw: &[String]) -> Result<Option<ParsedLeg>> {
        let time = self.cell(raw, Column::TransactionTime);
        if time.is_empty() {
            return Ok(None);
        }

        let mut row = NormalizedRow::new();
        row.set(
            Column::TransactionTime,
            self.parse_time(time)?.format(TRANSACTION_TIME_FORMAT).to_string(),
        );

        let timezone = self.cell(raw, Column::TransactionTimezone);
        if !timezone.is_empty() {
            let minutes = parse_utc_offset(timezone, self.options.timezone_format.as_deref())?;
            row.set(Column::TransactionTimezone, format_utc_offset(minutes));
        }

        let type_name = self.cell(raw, Column::TransactionType);
        row.set(Column::TransactionType, type_name);

        let amount = decode_amount_with(
            self.cell(raw, Column::Amount),
            &self.options.amount_format,
        )?;
        row.set(Column::Amount, amount.to_decimal_string());

        let related_amount = self.cell(raw, Column::RelatedAmount);
        if !related_amount.is_empty() {
            let related = decode_amount_with(related_amount, &self.options.amount_format)?;
            row.set(Column::RelatedAmount, related.to_decimal_string());
        }

        for column in TEXT_COLUMNS {
            let value = self.cell(raw, column);
            if !value.is_empty() {
                row.set(column, value);
            }
        }

        let is_transfer = self.options.type_mapping.get(type_name)
            == Some(&TransactionType::Transfer)
            && !row.has(Column::RelatedAccountName);

        let category = if row.has(Column::SubCategory) {
            row.get(Column::SubCategory).to_string()
        } else {
            row.get(Column::Category).to_string()
        };

        Ok(Some(ParsedLeg {
            row,
            is_negative: amount.is_negative,
            is_transfer,
            category,
        }))
    }

    fn settings(&self) -> ImporterSettings {
        ImporterSettings {
            type_names: self.options.type_mapping.clone(),
            tag_separator: self.options.tag_separator.clone(),
            geo_separator: self.options.geo_separator.clone(),
            geo_order: self.options.geo_order,
            ..ImporterSettings::default()
        }
    }
}
