//! Format-agnostic normalized table
//!
//! Every adapter emits rows in this fixed column vocabulary. Amounts are
//! always non-negative decimal strings; direction lives in the type column.

use std::collections::BTreeMap;

use serde::Serialize;

/// Closed set of normalized columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Column {
    TransactionTime,
    TransactionTimezone,
    TransactionType,
    Category,
    SubCategory,
    AccountName,
    AccountCurrency,
    Amount,
    RelatedAccountName,
    RelatedAccountCurrency,
    RelatedAmount,
    GeographicLocation,
    Tags,
    TagGroup,
    Description,
    Payee,
}

impl Column {
    pub const ALL: [Column; 16] = [
        Column::TransactionTime,
        Column::TransactionTimezone,
        Column::TransactionType,
        Column::Category,
        Column::SubCategory,
        Column::AccountName,
        Column::AccountCurrency,
        Column::Amount,
        Column::RelatedAccountName,
        Column::RelatedAccountCurrency,
        Column::RelatedAmount,
        Column::GeographicLocation,
        Column::Tags,
        Column::TagGroup,
        Column::Description,
        Column::Payee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransactionTime => "time",
            Self::TransactionTimezone => "timezone",
            Self::TransactionType => "type",
            Self::Category => "category",
            Self::SubCategory => "sub_category",
            Self::AccountName => "account",
            Self::AccountCurrency => "currency",
            Self::Amount => "amount",
            Self::RelatedAccountName => "related_account",
            Self::RelatedAccountCurrency => "related_currency",
            Self::RelatedAmount => "related_amount",
            Self::GeographicLocation => "geo_location",
            Self::Tags => "tags",
            Self::TagGroup => "tag_group",
            Self::Description => "description",
            Self::Payee => "payee",
        }
    }
}

impl std::str::FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Column::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("Unknown column: {}", s))
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tag together with the group it was found in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupedTag {
    pub name: String,
    /// Empty when the tag has no group
    pub group: String,
}

/// One row in the normalized column vocabulary
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedRow {
    values: BTreeMap<Column, String>,
    /// Per-tag group assignment, for sources that carry several tag groups per row.
    /// When empty, `Tags` and `TagGroup` are used instead.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tag_groups: Vec<GroupedTag>,
}

impl NormalizedRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a column; missing columns read as empty
    pub fn get(&self, column: Column) -> &str {
        self.values.get(&column).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, column: Column, value: impl Into<String>) {
        self.values.insert(column, value.into());
    }

    pub fn clear(&mut self, column: Column) {
        self.values.remove(&column);
    }

    pub fn has(&self, column: Column) -> bool {
        !self.get(column).is_empty()
    }

    /// Rows without time, type or amount are dropped before import
    pub fn is_complete(&self) -> bool {
        self.has(Column::TransactionTime)
            && self.has(Column::TransactionType)
            && self.has(Column::Amount)
    }

    /// Tags of this row with their groups, falling back to the flat `Tags` column
    pub fn grouped_tags(&self, separator: &str) -> Vec<GroupedTag> {
        if !self.tag_groups.is_empty() {
            return self.tag_groups.clone();
        }

        let tags = self.get(Column::Tags);
        if tags.is_empty() {
            return Vec::new();
        }

        let group = self.get(Column::TagGroup).trim();
        let names: Vec<&str> = if separator.is_empty() {
            vec![tags]
        } else {
            tags.split(separator).collect()
        };

        names
            .into_iter()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| GroupedTag {
                name: n.to_string(),
                group: group.to_string(),
            })
            .collect()
    }
}

/// Ordered, fully normalized rows of one file
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizedTable {
    rows: Vec<NormalizedRow>,
}

impl NormalizedTable {
    /// Merged transfers first, then everything else
    ///
    /// Rows missing time, type or amount are dropped.
    pub fn assemble(transfers: Vec<NormalizedRow>, others: Vec<NormalizedRow>) -> Self {
        let rows = transfers
            .into_iter()
            .chain(others)
            .filter(NormalizedRow::is_complete)
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[NormalizedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
