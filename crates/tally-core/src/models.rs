//! Domain models for Tally

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// An owner of data. Every entity row is keyed by `uid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    ModifyBalance,
    Income,
    Expense,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModifyBalance => "modify_balance",
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }

    /// Category type used to look up categories for this transaction type
    ///
    /// Balance modifications carry no category.
    pub fn category_type(&self) -> Option<CategoryType> {
        match self {
            Self::ModifyBalance => None,
            Self::Income => Some(CategoryType::Income),
            Self::Expense => Some(CategoryType::Expense),
            Self::Transfer => Some(CategoryType::Transfer),
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "modify_balance" | "balance" => Ok(Self::ModifyBalance),
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category type (categories are kept in three separate trees)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Income,
    Expense,
    Transfer,
}

impl CategoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }
}

impl std::str::FromStr for CategoryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            _ => Err(format!("Unknown category type: {}", s)),
        }
    }
}

impl std::fmt::Display for CategoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Account category (how the account is grouped for display)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountCategory {
    Cash,
    Checking,
    Savings,
    CreditCard,
    Investment,
    Other,
}

impl AccountCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Checking => "checking",
            Self::Savings => "savings",
            Self::CreditCard => "credit_card",
            Self::Investment => "investment",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for AccountCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cash" => Ok(Self::Cash),
            "checking" => Ok(Self::Checking),
            "savings" => Ok(Self::Savings),
            "credit_card" | "creditcard" => Ok(Self::CreditCard),
            "investment" => Ok(Self::Investment),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown account category: {}", s)),
        }
    }
}

impl std::fmt::Display for AccountCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Account structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    SingleAccount,
    MultiSubAccounts,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleAccount => "single_account",
            Self::MultiSubAccounts => "multi_sub_accounts",
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_account" => Ok(Self::SingleAccount),
            "multi_sub_accounts" => Ok(Self::MultiSubAccounts),
            _ => Err(format!("Unknown account type: {}", s)),
        }
    }
}

/// Counterparty kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterpartyType {
    Company,
    Individual,
}

impl CounterpartyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Individual => "individual",
        }
    }
}

impl std::str::FromStr for CounterpartyType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "company" => Ok(Self::Company),
            "individual" | "person" => Ok(Self::Individual),
            _ => Err(format!("Unknown counterparty type: {}", s)),
        }
    }
}

/// An account (wallet, card, bank account)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub uid: i64,
    pub name: String,
    pub currency: String,
    pub category: AccountCategory,
    pub account_type: AccountType,
    pub icon: i64,
    pub color: String,
    pub display_order: i64,
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub currency: String,
    pub category: AccountCategory,
    pub account_type: AccountType,
    pub icon: i64,
    pub color: String,
    pub display_order: i64,
}

/// A transaction category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub uid: i64,
    pub name: String,
    pub category_type: CategoryType,
    /// Parent category; `None` for a top-level category
    pub parent_id: Option<i64>,
    pub icon: i64,
    pub color: String,
    pub display_order: i64,
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a category
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub category_type: CategoryType,
    pub parent_id: Option<i64>,
    pub icon: i64,
    pub color: String,
    pub display_order: i64,
}

/// A counterparty (payee or payer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counterparty {
    pub id: i64,
    pub uid: i64,
    pub name: String,
    pub counterparty_type: CounterpartyType,
    pub icon: i64,
    pub color: String,
    pub display_order: i64,
    pub hidden: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a counterparty
#[derive(Debug, Clone)]
pub struct NewCounterparty {
    pub name: String,
    pub counterparty_type: CounterpartyType,
    pub icon: i64,
    pub color: String,
    pub display_order: i64,
}

/// A transaction tag, optionally inside a named tag group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub uid: i64,
    pub name: String,
    pub group_id: Option<i64>,
    pub group_name: Option<String>,
    pub display_order: i64,
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a tag
#[derive(Debug, Clone)]
pub struct NewTag {
    pub name: String,
    /// Tag group name; an empty or missing name leaves the tag ungrouped
    pub group_name: Option<String>,
    pub display_order: i64,
}

/// Geographic location attached to a transaction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// A persisted transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub uid: i64,
    pub transaction_type: TransactionType,
    pub time: NaiveDateTime,
    pub utc_offset_minutes: i32,
    pub category_id: Option<i64>,
    pub account_id: i64,
    /// Amount in minor units (cents), always non-negative
    pub amount: i64,
    pub related_account_id: Option<i64>,
    pub related_amount: i64,
    pub counterparty_id: Option<i64>,
    pub description: String,
    pub geo_location: Option<GeoLocation>,
    pub planned: bool,
    pub tag_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a transaction (fully id-resolved)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub transaction_type: TransactionType,
    pub time: NaiveDateTime,
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
    pub planned: bool,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

impl NewTransaction {
    /// Transaction time converted to UTC
    pub fn time_utc(&self) -> NaiveDateTime {
        self.time - chrono::Duration::minutes(i64::from(self.utc_offset_minutes))
    }

    /// Mark the transaction planned when it happens after `now_utc`
    pub fn mark_planned_if_future(&mut self, now_utc: NaiveDateTime) {
        if self.time_utc() > now_utc {
            self.planned = true;
        }
    }
}
