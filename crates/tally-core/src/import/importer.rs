//! Generic importer: normalized table to transactions plus pending entities
//!
//! Names that match the user's existing data resolve to ids right away.
//! Everything else becomes a pending stub that remembers which transactions
//! reference it, so the resolver can create it once and patch by index.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use super::decode::{parse_minor_units, parse_utc_offset, TRANSACTION_TIME_FORMAT};
use super::table::{Column, NormalizedRow, NormalizedTable};
use crate::error::{Error, Result};
use crate::models::{
    Account, Category, CategoryType, GeoLocation, NewTransaction, Tag, TransactionType,
};

/// Order of the two numbers in a geo-location cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeoOrder {
    #[default]
    LonLat,
    LatLon,
}

impl std::str::FromStr for GeoOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lonlat" | "lon_lat" => Ok(Self::LonLat),
            "latlon" | "lat_lon" => Ok(Self::LatLon),
            _ => Err(format!("Unknown geo-location order: {}", s)),
        }
    }
}

/// How the importer interprets normalized cell values
#[derive(Debug, Clone)]
pub struct ImporterSettings {
    /// Value of the type column to transaction type
    pub type_names: HashMap<String, TransactionType>,
    pub tag_separator: String,
    pub geo_separator: String,
    pub geo_order: GeoOrder,
    /// Offset applied when a row has no timezone, in minutes east of UTC
    pub default_utc_offset_minutes: i32,
}

impl Default for ImporterSettings {
    fn default() -> Self {
        Self {
            type_names: HashMap::new(),
            tag_separator: ";".to_string(),
            geo_separator: " ".to_string(),
            geo_order: GeoOrder::LonLat,
            default_utc_offset_minutes: 0,
        }
    }
}

/// The user's existing entities, keyed the way the importer looks them up
#[derive(Debug, Clone, Default)]
pub struct ExistingEntities {
    pub accounts: HashMap<String, Account>,
    /// Keyed by (parent name, name); top-level categories have an empty parent name
    pub expense_categories: HashMap<(String, String), Category>,
    pub income_categories: HashMap<(String, String), Category>,
    pub transfer_categories: HashMap<(String, String), Category>,
    pub tags: HashMap<String, Tag>,
}

impl ExistingEntities {
    pub fn categories(&self, category_type: CategoryType) -> &HashMap<(String, String), Category> {
        match category_type {
            CategoryType::Expense => &self.expense_categories,
            CategoryType::Income => &self.income_categories,
            CategoryType::Transfer => &self.transfer_categories,
        }
    }

    /// Category by parent and name; without a parent, any category of that name
    /// (top-level first, then the lowest id)
    fn find_category(&self, category_type: CategoryType, parent: &str, name: &str) -> Option<&Category> {
        let map = self.categories(category_type);
        if let Some(found) = map.get(&(parent.to_string(), name.to_string())) {
            return Some(found);
        }
        if !parent.is_empty() {
            return None;
        }
        map.values()
            .filter(|c| c.name == name)
            .min_by_key(|c| c.id)
    }
}

/// A tag reference on an imported transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportedTag {
    pub name: String,
    pub group: String,
    /// `None` until the tag exists
    pub id: Option<i64>,
}

/// A transaction produced by the importer
///
/// Ids are `None` where the referenced entity does not exist yet; the
/// original names say what to create.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportedTransaction {
    pub transaction_type: TransactionType,
    pub time: NaiveDateTime,
    pub utc_offset_minutes: i32,
    pub category_id: Option<i64>,
    pub account_id: Option<i64>,
    pub amount: i64,
    pub related_account_id: Option<i64>,
    pub related_amount: i64,
    pub counterparty_id: Option<i64>,
    pub description: String,
    pub geo_location: Option<GeoLocation>,
    pub tags: Vec<ImportedTag>,
    pub original_source_account_name: String,
    pub original_destination_account_name: String,
    pub original_category_name: String,
    pub original_parent_category_name: String,
    pub original_counterparty_name: String,
}

impl ImportedTransaction {
    pub fn original_tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }

    /// Convert into a persistable transaction; every reference must be resolved
    pub fn to_new_transaction(&self) -> Result<NewTransaction> {
        let account_id = self.account_id.ok_or_else(|| {
            Error::InvalidData(format!(
                "account \"{}\" is not resolved",
                self.original_source_account_name
            ))
        })?;

        let tag_ids = self
            .tags
            .iter()
            .map(|t| {
                t.id.ok_or_else(|| Error::InvalidData(format!("tag \"{}\" is not resolved", t.name)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(NewTransaction {
            transaction_type: self.transaction_type,
            time: self.time,
            utc_offset_minutes: self.utc_offset_minutes,
            category_id: self.category_id,
            account_id,
            amount: self.amount,
            related_account_id: self.related_account_id,
            related_amount: self.related_amount,
            counterparty_id: self.counterparty_id,
            description: self.description.clone(),
            geo_location: self.geo_location,
            planned: false,
            tag_ids,
        })
    }
}

/// Which account slot of a transaction a pending account fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountSlot {
    Source,
    Destination,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingAccount {
    pub name: String,
    /// Currency of the first row naming this account
    pub currency: String,
    pub refs: Vec<(usize, AccountSlot)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingCategory {
    pub category_type: CategoryType,
    pub name: String,
    /// Empty for a top-level category
    pub parent_name: String,
    /// Set when the parent already exists
    pub existing_parent_id: Option<i64>,
    /// Transactions whose category this is
    pub refs: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingTag {
    pub name: String,
    pub group: String,
    /// (transaction index, tag slot)
    pub refs: Vec<(usize, usize)>,
}

/// Entities referenced by the file but missing from the user's data
#[derive(Debug, Clone, Default)]
pub struct PendingEntities {
    pub accounts: Vec<PendingAccount>,
    pub expense_categories: Vec<PendingCategory>,
    pub income_categories: Vec<PendingCategory>,
    pub transfer_categories: Vec<PendingCategory>,
    pub tags: Vec<PendingTag>,
}

impl PendingEntities {
    pub fn categories(&self, category_type: CategoryType) -> &[PendingCategory] {
        match category_type {
            CategoryType::Expense => &self.expense_categories,
            CategoryType::Income => &self.income_categories,
            CategoryType::Transfer => &self.transfer_categories,
        }
    }

    fn categories_mut(&mut self, category_type: CategoryType) -> &mut Vec<PendingCategory> {
        match category_type {
            CategoryType::Expense => &mut self.expense_categories,
            CategoryType::Income => &mut self.income_categories,
            CategoryType::Transfer => &mut self.transfer_categories,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
            && self.expense_categories.is_empty()
            && self.income_categories.is_empty()
            && self.transfer_categories.is_empty()
            && self.tags.is_empty()
    }
}

/// Importer output
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub transactions: Vec<ImportedTransaction>,
    pub pending: PendingEntities,
}

/// Walks a normalized table against the user's existing entities
pub struct DataTableImporter<'a> {
    settings: &'a ImporterSettings,
    existing: &'a ExistingEntities,
    pending: PendingEntities,
    account_index: HashMap<String, usize>,
    category_index: HashMap<(CategoryType, String, String), usize>,
    tag_index: HashMap<String, usize>,
}

impl<'a> DataTableImporter<'a> {
    pub fn new(settings: &'a ImporterSettings, existing: &'a ExistingEntities) -> Self {
        Self {
            settings,
            existing,
            pending: PendingEntities::default(),
            account_index: HashMap::new(),
            category_index: HashMap::new(),
            tag_index: HashMap::new(),
        }
    }

    /// Import every row; fails on the first row that cannot be interpreted
    pub fn import(mut self, table: &NormalizedTable) -> Result<ImportResult> {
        let mut transactions = Vec::with_capacity(table.len());

        for (index, row) in table.rows().iter().enumerate() {
            let tx = self
                .import_row(index, row)
                .map_err(|e| match e {
                    Error::Import(msg) => Error::Import(format!("row {}: {}", index + 1, msg)),
                    other => other,
                })?;
            transactions.push(tx);
        }

        if transactions.is_empty() {
            return Err(Error::NoData("no transactions found in file".to_string()));
        }

        debug!(
            "Imported {} transactions ({} new accounts, {} new tags)",
            transactions.len(),
            self.pending.accounts.len(),
            self.pending.tags.len()
        );

        Ok(ImportResult {
            transactions,
            pending: self.pending,
        })
    }

    fn import_row(&mut self, index: usize, row: &NormalizedRow) -> Result<ImportedTransaction> {
        let type_name = row.get(Column::TransactionType).trim();
        let transaction_type = *self
            .settings
            .type_names
            .get(type_name)
            .ok_or_else(|| Error::Import(format!("unknown transaction type \"{}\"", type_name)))?;

        let time_str = row.get(Column::TransactionTime).trim();
        let time = NaiveDateTime::parse_from_str(time_str, TRANSACTION_TIME_FORMAT)
            .map_err(|_| Error::Import(format!("invalid transaction time \"{}\"", time_str)))?;

        let utc_offset_minutes = match row.get(Column::TransactionTimezone).trim() {
            "" => self.settings.default_utc_offset_minutes,
            tz => parse_utc_offset(tz, None)?,
        };

        let amount = parse_minor_units(row.get(Column::Amount))?.abs();
        let is_transfer = transaction_type == TransactionType::Transfer;

        let related_amount = match (is_transfer, row.get(Column::RelatedAmount).trim()) {
            (false, _) => 0,
            (true, "") => amount,
            (true, s) => parse_minor_units(s)?.abs(),
        };

        let source_name = row.get(Column::AccountName).trim();
        if source_name.is_empty() {
            return Err(Error::Import("missing account name".to_string()));
        }
        let account_id = self.resolve_account(
            index,
            AccountSlot::Source,
            source_name,
            row.get(Column::AccountCurrency).trim(),
        );

        let destination_name = if is_transfer {
            row.get(Column::RelatedAccountName).trim()
        } else {
            ""
        };
        let related_account_id = if destination_name.is_empty() {
            None
        } else {
            let currency = match row.get(Column::RelatedAccountCurrency).trim() {
                "" => row.get(Column::AccountCurrency).trim(),
                c => c,
            };
            self.resolve_account(index, AccountSlot::Destination, destination_name, currency)
        };

        let sub = row.get(Column::SubCategory).trim();
        let cat = row.get(Column::Category).trim();
        let (category_name, parent_name) = if sub.is_empty() { (cat, "") } else { (sub, cat) };
        let category_id = match transaction_type.category_type() {
            Some(ct) if !category_name.is_empty() => {
                self.resolve_category(index, ct, parent_name, category_name)
            }
            _ => None,
        };

        let mut tags: Vec<ImportedTag> = Vec::new();
        for grouped in row.grouped_tags(&self.settings.tag_separator) {
            if tags.iter().any(|t| t.name == grouped.name) {
                continue;
            }
            let slot = tags.len();
            let id = self.resolve_tag(index, slot, &grouped.name, &grouped.group);
            tags.push(ImportedTag {
                name: grouped.name,
                group: grouped.group,
                id,
            });
        }

        Ok(ImportedTransaction {
            transaction_type,
            time,
            utc_offset_minutes,
            category_id,
            account_id,
            amount,
            related_account_id,
            related_amount,
            counterparty_id: None,
            description: row.get(Column::Description).trim().to_string(),
            geo_location: self.parse_geo(row.get(Column::GeographicLocation)),
            tags,
            original_source_account_name: source_name.to_string(),
            original_destination_account_name: destination_name.to_string(),
            original_category_name: category_name.to_string(),
            original_parent_category_name: parent_name.to_string(),
            original_counterparty_name: row.get(Column::Payee).trim().to_string(),
        })
    }

    fn resolve_account(
        &mut self,
        index: usize,
        slot: AccountSlot,
        name: &str,
        currency: &str,
    ) -> Option<i64> {
        if let Some(account) = self.existing.accounts.get(name) {
            return Some(account.id);
        }

        let pending = &mut self.pending.accounts;
        let position = *self.account_index.entry(name.to_string()).or_insert_with(|| {
            pending.push(PendingAccount {
                name: name.to_string(),
                currency: currency.to_string(),
                refs: Vec::new(),
            });
            pending.len() - 1
        });
        pending[position].refs.push((index, slot));
        None
    }

    fn resolve_category(
        &mut self,
        index: usize,
        category_type: CategoryType,
        parent: &str,
        name: &str,
    ) -> Option<i64> {
        let existing = self.existing;
        if let Some(category) = existing.find_category(category_type, parent, name) {
            return Some(category.id);
        }

        let existing_parent_id = if parent.is_empty() {
            None
        } else {
            match existing.find_category(category_type, "", parent) {
                Some(p) => Some(p.id),
                None => {
                    self.pending_category(category_type, "", parent, None);
                    None
                }
            }
        };

        let position = self.pending_category(category_type, parent, name, existing_parent_id);
        self.pending.categories_mut(category_type)[position]
            .refs
            .push(index);
        None
    }

    /// Position of the stub for (type, parent, name), creating it on first use
    fn pending_category(
        &mut self,
        category_type: CategoryType,
        parent: &str,
        name: &str,
        existing_parent_id: Option<i64>,
    ) -> usize {
        let key = (category_type, parent.to_string(), name.to_string());
        if let Some(position) = self.category_index.get(&key) {
            return *position;
        }

        let stubs = self.pending.categories_mut(category_type);
        stubs.push(PendingCategory {
            category_type,
            name: name.to_string(),
            parent_name: parent.to_string(),
            existing_parent_id,
            refs: Vec::new(),
        });
        let position = stubs.len() - 1;
        self.category_index.insert(key, position);
        position
    }

    fn resolve_tag(&mut self, index: usize, slot: usize, name: &str, group: &str) -> Option<i64> {
        if let Some(tag) = self.existing.tags.get(name) {
            return Some(tag.id);
        }

        let pending = &mut self.pending.tags;
        let position = *self.tag_index.entry(name.to_string()).or_insert_with(|| {
            pending.push(PendingTag {
                name: name.to_string(),
                group: group.to_string(),
                refs: Vec::new(),
            });
            pending.len() - 1
        });
        pending[position].refs.push((index, slot));
        None
    }

    fn parse_geo(&self, value: &str) -> Option<GeoLocation> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        let parts: Vec<&str> = if self.settings.geo_separator.trim().is_empty() {
            value.split_whitespace().collect()
        } else {
            value.split(self.settings.geo_separator.as_str()).map(str::trim).collect()
        };
        if parts.len() != 2 {
            return None;
        }

        let first: f64 = parts[0].parse().ok()?;
        let second: f64 = parts[1].parse().ok()?;
        let (longitude, latitude) = match self.settings.geo_order {
            GeoOrder::LonLat => (first, second),
            GeoOrder::LatLon => (second, first),
        };

        Some(GeoLocation {
            latitude,
            longitude,
        })
    }
}
