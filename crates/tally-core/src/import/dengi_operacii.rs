//! "Деньги-операции" spreadsheet export
//!
//! One row per movement. Transfers appear as two rows sharing a date and one of
//! the transfer categories; the matcher pairs them.

use std::collections::HashMap;

use super::decode::{decode_amount, decode_date, format_transaction_time};
use super::importer::ImporterSettings;
use super::matcher::ParsedLeg;
use super::source::{read_xlsx, HeaderIndex, RawRow};
use super::table::{Column, NormalizedRow};
use super::FormatAdapter;
use crate::error::Result;
use crate::models::TransactionType;

const DATE: &str = "Дата";
const AMOUNT: &str = "Сумма";
const ACCOUNT: &str = "Счет";
const CURRENCY: &str = "Валюта";
const COUNTERPARTY: &str = "Контрагент";
const CATEGORY: &str = "Статья";
const DESCRIPTION: &str = "Описание";
const DIRECTION: &str = "Направление";
const SUB_DIRECTION: &str = "Субнаправление";

const REQUIRED_COLUMNS: [&str; 4] = [DATE, AMOUNT, ACCOUNT, CATEGORY];

const TRANSFER_CATEGORIES: [&str; 2] = ["Конвертация валют", "Перевод между счетами"];

const TYPE_INCOME: &str = "Доход";
const TYPE_EXPENSE: &str = "Расход";
const TYPE_TRANSFER: &str = "Перевод";

/// Never expected inside a sub-direction value
const TAG_SEPARATOR: &str = "||";

#[derive(Debug, Clone, Copy, Default)]
pub struct DengiOperacii;

impl FormatAdapter for DengiOperacii {
    type Context = HeaderIndex;

    fn read_grid(&self, data: &[u8]) -> Result<Vec<RawRow>> {
        read_xlsx(data)
    }

    fn context(&self, header: &[String]) -> Result<HeaderIndex> {
        let index = HeaderIndex::new(header);
        index.require(&REQUIRED_COLUMNS)?;
        Ok(index)
    }

    fn parse_row(&self, header: &HeaderIndex, raw: &[String]) -> Result<Option<ParsedLeg>> {
        let date = header.cell(raw, DATE);
        if date.is_empty() {
            return Ok(None);
        }

        let mut row = NormalizedRow::new();
        row.set(
            Column::TransactionTime,
            format_transaction_time(decode_date(date)?),
        );

        let category = header.cell(raw, CATEGORY);
        row.set(Column::Category, category);
        row.set(Column::SubCategory, "");

        let amount = decode_amount(header.cell(raw, AMOUNT))?;
        row.set(Column::Amount, amount.to_decimal_string());

        let is_transfer = TRANSFER_CATEGORIES.contains(&category);
        if is_transfer {
            row.set(Column::TransactionType, TYPE_TRANSFER);
            // placeholder until the matcher finds the other leg
            row.set(Column::RelatedAccountName, category);
        } else if amount.is_negative {
            row.set(Column::TransactionType, TYPE_EXPENSE);
        } else {
            row.set(Column::TransactionType, TYPE_INCOME);
        }

        row.set(Column::TagGroup, trim_marker(header.cell(raw, DIRECTION)));
        row.set(Column::Tags, trim_marker(header.cell(raw, SUB_DIRECTION)));
        row.set(Column::AccountName, header.cell(raw, ACCOUNT));
        row.set(Column::AccountCurrency, header.cell(raw, CURRENCY));
        row.set(Column::Description, header.cell(raw, DESCRIPTION));

        let counterparty = header.cell(raw, COUNTERPARTY);
        if !counterparty.is_empty() {
            row.set(Column::Payee, counterparty);
        }

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

/// Direction values are exported with a leading list marker
fn trim_marker(value: &str) -> &str {
    let value = value.trim();
    let value = value.strip_prefix("- ").unwrap_or(value);
    let value = value.strip_prefix('-').unwrap_or(value);
    value.trim()
}
