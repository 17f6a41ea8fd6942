//! Custom bookkeeping export (CSV or XLSX)
//!
//! Nine fixed columns followed by any number of tag-group columns. Each
//! tag-group column is named after its group; a non-empty cell is a tag in
//! that group.

use std::collections::HashMap;

use tracing::warn;

use super::decode::{decode_amount, decode_date, format_minor_units, format_transaction_time};
use super::importer::ImporterSettings;
use super::matcher::ParsedLeg;
use super::source::{is_xlsx, read_delimited, read_xlsx, HeaderIndex, RawRow};
use super::table::{Column, GroupedTag, NormalizedRow};
use super::FormatAdapter;
use crate::error::{Error, Result};
use crate::models::TransactionType;

const DATE: &str = "Дата";
const AMOUNT: &str = "Сумма";
const ACCOUNT: &str = "Счет";
const CURRENCY: &str = "Валюта";
const COUNTERPARTY: &str = "Контрагент";
const COUNTERPARTY_TAX_ID: &str = "ИНН контрагент";
const CATEGORY: &str = "Статья";
const PARENT_CATEGORY: &str = "Род. статья";
const DESCRIPTION: &str = "Описание";

const FIXED_COLUMNS: [&str; 9] = [
    DATE,
    AMOUNT,
    ACCOUNT,
    CURRENCY,
    COUNTERPARTY,
    COUNTERPARTY_TAX_ID,
    CATEGORY,
    PARENT_CATEGORY,
    DESCRIPTION,
];

const TRANSFER_CATEGORIES: [&str; 2] = ["Конвертация валют", "Перевод между счетами"];

const TYPE_INCOME: &str = "Доход";
const TYPE_EXPENSE: &str = "Расход";
const TYPE_TRANSFER: &str = "Перевод";

const TAG_SEPARATOR: &str = ";";

#[derive(Debug, Clone, Copy, Default)]
pub struct CustomCsv;

/// Header positions plus the trailing tag-group columns
#[derive(Debug)]
pub struct CustomContext {
    header: HeaderIndex,
    tag_groups: Vec<(usize, String)>,
}

impl FormatAdapter for CustomCsv {
    type Context = CustomContext;

    fn read_grid(&self, data: &[u8]) -> Result<Vec<RawRow>> {
        let grid = if is_xlsx(data) {
            read_xlsx(data)
        } else {
            read_delimited(data, b',')
        };

        let grid = grid.map_err(|e| Error::NoData(format!("cannot read file: {}", e)))?;
        if grid.len() < 2 {
            return Err(Error::NoData("file has no data rows".to_string()));
        }
        Ok(grid)
    }

    fn context(&self, header: &[String]) -> Result<CustomContext> {
        if header.len() < FIXED_COLUMNS.len() {
            return Err(Error::MissingHeaderColumn(
                FIXED_COLUMNS[header.len()].to_string(),
            ));
        }

        let tag_groups = header
            .iter()
            .enumerate()
            .skip(FIXED_COLUMNS.len())
            .map(|(i, name)| (i, name.trim().to_string()))
            .collect();

        let header = HeaderIndex::new(header);
        header.require(&[DATE, AMOUNT, ACCOUNT])?;

        Ok(CustomContext { header, tag_groups })
    }

    fn parse_row(&self, ctx: &CustomContext, raw: &[String]) -> Result<Option<ParsedLeg>> {
        if raw.len() < FIXED_COLUMNS.len() {
            return Ok(None);
        }

        let header = &ctx.header;
        let date = header.cell(raw, DATE);
        let amount = header.cell(raw, AMOUNT);
        let account = header.cell(raw, ACCOUNT);
        if date.is_empty() || amount.is_empty() || account.is_empty() {
            return Ok(None);
        }

        let date = match decode_date(date) {
            Ok(d) => d,
            Err(e) => {
                warn!("Skipping row with unreadable date \"{}\": {}", date, e);
                return Ok(None);
            }
        };
        let amount = match decode_amount(amount) {
            Ok(a) => a,
            Err(e) => {
                warn!("Skipping row with unreadable amount \"{}\": {}", amount, e);
                return Ok(None);
            }
        };

        let category = header.cell(raw, CATEGORY);
        let parent = header.cell(raw, PARENT_CATEGORY);
        let is_transfer = TRANSFER_CATEGORIES.contains(&category);

        let mut row = NormalizedRow::new();
        row.set(Column::TransactionTime, format_transaction_time(date));
        row.set(
            Column::TransactionType,
            match (is_transfer, amount.is_negative) {
                (true, _) => TYPE_TRANSFER,
                (false, true) => TYPE_EXPENSE,
                (false, false) => TYPE_INCOME,
            },
        );
        row.set(Column::Amount, format_minor_units(amount.minor_units()));

        row.set(Column::Category, parent);
        row.set(Column::SubCategory, category);

        row.set(Column::AccountName, account);
        row.set(Column::AccountCurrency, header.cell(raw, CURRENCY));
        row.set(Column::Description, header.cell(raw, DESCRIPTION));
        row.set(Column::Payee, header.cell(raw, COUNTERPARTY));

        row.tag_groups = ctx
            .tag_groups
            .iter()
            .filter_map(|(i, group)| {
                let value = raw.get(*i).map(|s| s.trim()).unwrap_or("");
                (!value.is_empty()).then(|| GroupedTag {
                    name: value.to_string(),
                    group: group.clone(),
                })
            })
            .collect();

        let names: Vec<&str> = row.tag_groups.iter().map(|t| t.name.as_str()).collect();
        let tags = names.join(TAG_SEPARATOR);
        row.set(Column::Tags, tags);

        Ok(Some(ParsedLeg {
            row,
            is_negative: amount.is_negative,
            is_transfer,
            category: category.to_string(),
        }))
    }

    fn settings(&self) -> ImporterSettings {
        ImporterSettings {
            type_names: HashMap::from([
                (TYPE_INCOME.to_string(), TransactionType::Income),
                (TYPE_EXPENSE.to_string(), TransactionType::Expense),
                (TYPE_TRANSFER.to_string(), TransactionType::Transfer),
            ]),
            tag_separator: TAG_SEPARATOR.to_string(),
            ..ImporterSettings::default()
        }
    }
}
