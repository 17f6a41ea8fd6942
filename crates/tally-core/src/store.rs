//! Persistence collaborators used by the import pipeline
//!
//! [`crate::db::Database`] implements all of them. Each is a keyed
//! lookup or insert scoped to one owner `uid`.

use crate::error::Result;
use crate::models::{
    Account, AccountCategory, Category, CategoryType, Counterparty, NewAccount, NewCategory,
    NewCounterparty, NewTag, NewTransaction, Tag,
};

pub trait AccountStore {
    /// Highest display order among the user's accounts in `category` (0 when none)
    fn max_account_display_order(&self, uid: i64, category: AccountCategory) -> Result<i64>;
    fn create_account(&self, uid: i64, account: &NewAccount) -> Result<Account>;
    fn list_accounts(&self, uid: i64) -> Result<Vec<Account>>;
}

pub trait CategoryStore {
    /// Highest display order among the user's categories of `category_type` (0 when none)
    fn max_category_display_order(&self, uid: i64, category_type: CategoryType) -> Result<i64>;
    fn create_category(&self, uid: i64, category: &NewCategory) -> Result<Category>;
    fn list_categories(&self, uid: i64) -> Result<Vec<Category>>;
}

pub trait CounterpartyStore {
    /// All counterparties, including hidden and deleted ones
    fn list_counterparties(&self, uid: i64) -> Result<Vec<Counterparty>>;
    fn max_counterparty_display_order(&self, uid: i64) -> Result<i64>;
    fn create_counterparty(&self, uid: i64, counterparty: &NewCounterparty) -> Result<Counterparty>;
}

pub trait TagStore {
    fn max_tag_display_order(&self, uid: i64) -> Result<i64>;
    /// Create a tag; its group is looked up by name and created on first use
    fn create_tag(&self, uid: i64, tag: &NewTag) -> Result<Tag>;
    fn list_tags(&self, uid: i64) -> Result<Vec<Tag>>;
}

pub trait TransactionStore {
    /// Insert all transactions or none
    ///
    /// `progress` receives the completed fraction in `[0, 1]` as rows are written.
    /// Returns the number of transactions written.
    fn batch_create_transactions(
        &self,
        uid: i64,
        transactions: &[NewTransaction],
        progress: &mut dyn FnMut(f64),
    ) -> Result<usize>;
}

/// Everything entity auto-creation needs
pub trait EntityStore: AccountStore + CategoryStore + CounterpartyStore + TagStore {}

impl<T: AccountStore + CategoryStore + CounterpartyStore + TagStore + ?Sized> EntityStore for T {}
