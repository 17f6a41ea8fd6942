//! Entity resolution and auto-creation
//!
//! Runs after the importer and before persistence. Creates every pending
//! entity exactly once, then patches the transactions that referenced it.
//! The order is fixed: accounts, categories (parents before children),
//! counterparties, tags.
//!
//! Creation is not transactional across entities: if one fails, the ones
//! created before it stay.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use super::importer::{
    AccountSlot, ImportResult, ImportedTransaction, PendingAccount, PendingCategory, PendingTag,
};
use crate::config::EntityDefaults;
use crate::error::{Error, Result};
use crate::models::{
    Account, AccountCategory, AccountType, Category, CategoryType, Counterparty,
    CounterpartyType, NewAccount, NewCategory, NewCounterparty, NewTag, Tag,
};
use crate::store::EntityStore;

/// Entities created while resolving one import
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreatedEntities {
    pub accounts: Vec<Account>,
    pub categories: Vec<Category>,
    pub counterparties: Vec<Counterparty>,
    pub tags: Vec<Tag>,
}

impl CreatedEntities {
    pub fn total(&self) -> usize {
        self.accounts.len() + self.categories.len() + self.counterparties.len() + self.tags.len()
    }
}

pub struct EntityResolver<'a, S: ?Sized> {
    store: &'a S,
    defaults: &'a EntityDefaults,
}

impl<'a, S: EntityStore + ?Sized> EntityResolver<'a, S> {
    pub fn new(store: &'a S, defaults: &'a EntityDefaults) -> Self {
        Self { store, defaults }
    }

    /// Create all pending entities for `uid` and patch `result.transactions`
    pub fn resolve(&self, uid: i64, result: &mut ImportResult) -> Result<CreatedEntities> {
        let mut created = CreatedEntities::default();
        let transactions = &mut result.transactions;
        let pending = &result.pending;

        for account in &pending.accounts {
            created
                .accounts
                .push(self.create_account(uid, account, transactions)?);
        }

        for category_type in [CategoryType::Expense, CategoryType::Income, CategoryType::Transfer] {
            let categories =
                self.create_categories(uid, pending.categories(category_type), transactions)?;
            created.categories.extend(categories);
        }

        created.counterparties = self.resolve_counterparties(uid, transactions)?;
        created.tags = self.create_tags(uid, &pending.tags, transactions)?;

        if created.total() > 0 {
            info!(
                "Auto-created {} accounts, {} categories, {} counterparties, {} tags",
                created.accounts.len(),
                created.categories.len(),
                created.counterparties.len(),
                created.tags.len()
            );
        }

        Ok(created)
    }

    fn create_account(
        &self,
        uid: i64,
        pending: &PendingAccount,
        transactions: &mut [ImportedTransaction],
    ) -> Result<Account> {
        let category = AccountCategory::Cash;
        let display_order = self
            .store
            .max_account_display_order(uid, category)
            .unwrap_or_else(|e| {
                warn!("Cannot read account display order, starting at 0: {}", e);
                0
            })
            + 1;

        let currency = if pending.currency.is_empty() {
            self.defaults.account_currency.clone()
        } else {
            pending.currency.clone()
        };

        let account = self
            .store
            .create_account(
                uid,
                &NewAccount {
                    name: pending.name.clone(),
                    currency,
                    category,
                    account_type: AccountType::SingleAccount,
                    icon: self.defaults.account_icon,
                    color: self.defaults.account_color.clone(),
                    display_order,
                },
            )
            .map_err(|e| Error::auto_create("account", &pending.name, e))?;

        info!("Created account \"{}\" (id {})", account.name, account.id);

        for (index, slot) in &pending.refs {
            if let Some(tx) = transactions.get_mut(*index) {
                match slot {
                    AccountSlot::Source => tx.account_id = Some(account.id),
                    AccountSlot::Destination => tx.related_account_id = Some(account.id),
                }
            }
        }

        Ok(account)
    }

    fn create_categories(
        &self,
        uid: i64,
        pending: &[PendingCategory],
        transactions: &mut [ImportedTransaction],
    ) -> Result<Vec<Category>> {
        let Some(category_type) = pending.first().map(|c| c.category_type) else {
            return Ok(Vec::new());
        };

        let mut next_order = None;
        let mut parents: HashMap<String, i64> = HashMap::new();
        let mut created = Vec::new();

        let (tops, children): (Vec<&PendingCategory>, Vec<&PendingCategory>) = pending
            .iter()
            .filter(|c| !c.name.is_empty())
            .partition(|c| c.parent_name.is_empty());

        for stub in tops {
            let category = self.create_category(uid, stub, None, &mut next_order)?;
            parents.insert(stub.name.clone(), category.id);
            patch_categories(transactions, &stub.refs, category.id);
            created.push(category);
        }

        for stub in children {
            let parent_id = stub
                .existing_parent_id
                .or_else(|| parents.get(&stub.parent_name).copied())
                .ok_or_else(|| {
                    Error::auto_create(
                        "category",
                        &stub.name,
                        Error::NotFound(format!(
                            "{} parent category \"{}\"",
                            category_type, stub.parent_name
                        )),
                    )
                })?;

            let category = self.create_category(uid, stub, Some(parent_id), &mut next_order)?;
            patch_categories(transactions, &stub.refs, category.id);
            created.push(category);
        }

        Ok(created)
    }

    fn create_category(
        &self,
        uid: i64,
        stub: &PendingCategory,
        parent_id: Option<i64>,
        next_order: &mut Option<i64>,
    ) -> Result<Category> {
        let order = match next_order {
            Some(order) => *order,
            None => {
                self.store
                    .max_category_display_order(uid, stub.category_type)
                    .unwrap_or_else(|e| {
                        warn!("Cannot read category display order, starting at 0: {}", e);
                        0
                    })
                    + 1
            }
        };
        *next_order = Some(order + 1);

        let category = self
            .store
            .create_category(
                uid,
                &NewCategory {
                    name: stub.name.clone(),
                    category_type: stub.category_type,
                    parent_id,
                    icon: self.defaults.category_icon,
                    color: self.defaults.category_color.clone(),
                    display_order: order,
                },
            )
            .map_err(|e| Error::auto_create("category", &stub.name, e))?;

        info!(
            "Created {} category \"{}\" (id {})",
            category.category_type, category.name, category.id
        );
        Ok(category)
    }

    fn resolve_counterparties(
        &self,
        uid: i64,
        transactions: &mut [ImportedTransaction],
    ) -> Result<Vec<Counterparty>> {
        if transactions
            .iter()
            .all(|tx| tx.original_counterparty_name.trim().is_empty())
        {
            return Ok(Vec::new());
        }

        let mut known: HashMap<String, i64> = self
            .store
            .list_counterparties(uid)?
            .into_iter()
            .filter(|c| !c.deleted && !c.hidden)
            .map(|c| (c.name, c.id))
            .collect();

        let mut order = self
            .store
            .max_counterparty_display_order(uid)
            .unwrap_or_else(|e| {
                warn!("Cannot read counterparty display order, starting at 0: {}", e);
                0
            });

        let mut created = Vec::new();
        for tx in transactions.iter_mut() {
            let name = tx.original_counterparty_name.trim();
            if name.is_empty() {
                continue;
            }

            if let Some(id) = known.get(name) {
                tx.counterparty_id = Some(*id);
                continue;
            }

            order += 1;
            let counterparty = self
                .store
                .create_counterparty(
                    uid,
                    &NewCounterparty {
                        name: name.to_string(),
                        counterparty_type: CounterpartyType::Company,
                        icon: self.defaults.counterparty_icon,
                        color: self.defaults.counterparty_color.clone(),
                        display_order: order,
                    },
                )
                .map_err(|e| Error::auto_create("counterparty", name, e))?;

            info!(
                "Created counterparty \"{}\" (id {})",
                counterparty.name, counterparty.id
            );
            known.insert(counterparty.name.clone(), counterparty.id);
            tx.counterparty_id = Some(counterparty.id);
            created.push(counterparty);
        }

        Ok(created)
    }

    fn create_tags(
        &self,
        uid: i64,
        pending: &[PendingTag],
        transactions: &mut [ImportedTransaction],
    ) -> Result<Vec<Tag>> {
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let mut order = self.store.max_tag_display_order(uid).unwrap_or_else(|e| {
            warn!("Cannot read tag display order, starting at 0: {}", e);
            0
        });

        let mut created = Vec::with_capacity(pending.len());
        for stub in pending {
            order += 1;
            let tag = self
                .store
                .create_tag(
                    uid,
                    &NewTag {
                        name: stub.name.clone(),
                        group_name: (!stub.group.is_empty()).then(|| stub.group.clone()),
                        display_order: order,
                    },
                )
                .map_err(|e| Error::auto_create("tag", &stub.name, e))?;

            info!("Created tag \"{}\" (id {})", tag.name, tag.id);

            for (index, slot) in &stub.refs {
                if let Some(imported) = transactions
                    .get_mut(*index)
                    .and_then(|tx| tx.tags.get_mut(*slot))
                {
                    imported.id = Some(tag.id);
                }
            }
            created.push(tag);
        }

        Ok(created)
    }
}

fn patch_categories(transactions: &mut [ImportedTransaction], refs: &[usize], id: i64) {
    for index in refs {
        if let Some(tx) = transactions.get_mut(*index) {
            if tx.category_id.is_none() {
                tx.category_id = Some(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::importer::{DataTableImporter, ExistingEntities, ImporterSettings};
    use crate::import::table::{Column, NormalizedRow, NormalizedTable};
    use crate::models::TransactionType;
    use crate::store::{AccountStore, CategoryStore, CounterpartyStore, TagStore};
    use chrono::Utc;
    use std::cell::RefCell;

    /// In-memory store that can be told to fail one kind of creation
    #[derive(Default)]
    struct MemoryStore {
        accounts: RefCell<Vec<Account>>,
        categories: RefCell<Vec<Category>>,
        counterparties: RefCell<Vec<Counterparty>>,
        tags: RefCell<Vec<Tag>>,
        fail_on: Option<&'static str>,
        next_id: RefCell<i64>,
    }

    impl MemoryStore {
        fn id(&self, entity: &'static str) -> Result<i64> {
            if self.fail_on == Some(entity) {
                return Err(Error::InvalidData(format!("{} storage is down", entity)));
            }
            let mut next = self.next_id.borrow_mut();
            *next += 1;
            Ok(*next)
        }
    }

    impl AccountStore for MemoryStore {
        fn max_account_display_order(&self, _uid: i64, _c: AccountCategory) -> Result<i64> {
            Ok(self.accounts.borrow().iter().map(|a| a.display_order).max().unwrap_or(0))
        }

        fn create_account(&self, uid: i64, a: &NewAccount) -> Result<Account> {
            let account = Account {
                id: self.id("account")?,
                uid,
                name: a.name.clone(),
                currency: a.currency.clone(),
                category: a.category,
                account_type: a.account_type,
                icon: a.icon,
                color: a.color.clone(),
                display_order: a.display_order,
                hidden: false,
                created_at: Utc::now(),
            };
            self.accounts.borrow_mut().push(account.clone());
            Ok(account)
        }

        fn list_accounts(&self, _uid: i64) -> Result<Vec<Account>> {
            Ok(self.accounts.borrow().clone())
        }
    }

    impl CategoryStore for MemoryStore {
        fn max_category_display_order(&self, _uid: i64, t: CategoryType) -> Result<i64> {
            Err(Error::NotFound(format!("{} order", t)))
        }

        fn create_category(&self, uid: i64, c: &NewCategory) -> Result<Category> {
            let category = Category {
                id: self.id("category")?,
                uid,
                name: c.name.clone(),
                category_type: c.category_type,
                parent_id: c.parent_id,
                icon: c.icon,
                color: c.color.clone(),
                display_order: c.display_order,
                hidden: false,
                created_at: Utc::now(),
            };
            self.categories.borrow_mut().push(category.clone());
            Ok(category)
        }

        fn list_categories(&self, _uid: i64) -> Result<Vec<Category>> {
            Ok(self.categories.borrow().clone())
        }
    }

    impl CounterpartyStore for MemoryStore {
        fn list_counterparties(&self, _uid: i64) -> Result<Vec<Counterparty>> {
            Ok(self.counterparties.borrow().clone())
        }

        fn max_counterparty_display_order(&self, _uid: i64) -> Result<i64> {
            Ok(self.counterparties.borrow().len() as i64)
        }

        fn create_counterparty(&self, uid: i64, c: &NewCounterparty) -> Result<Counterparty> {
            let counterparty = Counterparty {
                id: self.id("counterparty")?,
                uid,
                name: c.name.clone(),
                counterparty_type: c.counterparty_type,
                icon: c.icon,
                color: c.color.clone(),
                display_order: c.display_order,
                hidden: false,
                deleted: false,
                created_at: Utc::now(),
            };
            self.counterparties.borrow_mut().push(counterparty.clone());
            Ok(counterparty)
        }
    }

    impl TagStore for MemoryStore {
        fn max_tag_display_order(&self, _uid: i64) -> Result<i64> {
            Ok(0)
        }

        fn create_tag(&self, uid: i64, t: &NewTag) -> Result<Tag> {
            let tag = Tag {
                id: self.id("tag")?,
                uid,
                name: t.name.clone(),
                group_id: None,
                group_name: t.group_name.clone(),
                display_order: t.display_order,
                hidden: false,
                created_at: Utc::now(),
            };
            self.tags.borrow_mut().push(tag.clone());
            Ok(tag)
        }

        fn list_tags(&self, _uid: i64) -> Result<Vec<Tag>> {
            Ok(self.tags.borrow().clone())
        }
    }

    fn expense(account: &str, parent: &str, category: &str, payee: &str) -> NormalizedRow {
        let mut r = NormalizedRow::new();
        r.set(Column::TransactionTime, "2026-02-09 00:00:00");
        r.set(Column::TransactionType, "Расход");
        r.set(Column::AccountName, account);
        r.set(Column::Amount, "10");
        r.set(Column::Category, parent);
        r.set(Column::SubCategory, category);
        r.set(Column::Payee, payee);
        r
    }

    fn import(rows: Vec<NormalizedRow>) -> ImportResult {
        let settings = ImporterSettings {
            type_names: HashMap::from([
                ("Расход".to_string(), TransactionType::Expense),
                ("Перевод".to_string(), TransactionType::Transfer),
            ]),
            ..ImporterSettings::default()
        };
        DataTableImporter::new(&settings, &ExistingEntities::default())
            .import(&NormalizedTable::assemble(Vec::new(), rows))
            .unwrap()
    }

    #[test]
    fn test_parent_created_once_before_children() {
        let mut rows: Vec<NormalizedRow> = (0..10)
            .map(|_| expense("Card", "Еда", "Продукты", ""))
            .collect();
        rows.push(expense("Card", "", "Еда", ""));

        let mut result = import(rows);
        let store = MemoryStore::default();
        let defaults = EntityDefaults::default();
        let created = EntityResolver::new(&store, &defaults)
            .resolve(1, &mut result)
            .unwrap();

        assert_eq!(created.categories.len(), 2);
        let parent = &created.categories[0];
        let child = &created.categories[1];
        assert_eq!(parent.name, "Еда");
        assert_eq!(parent.parent_id, None);
        assert_eq!(child.parent_id, Some(parent.id));
        assert_eq!(parent.display_order, 1);
        assert_eq!(child.display_order, 2);

        for tx in &result.transactions[..10] {
            assert_eq!(tx.category_id, Some(child.id));
        }
        assert_eq!(result.transactions[10].category_id, Some(parent.id));

        assert_eq!(created.accounts.len(), 1);
        assert_eq!(created.accounts[0].currency, "USD");
        assert!(result
            .transactions
            .iter()
            .all(|tx| tx.account_id == Some(created.accounts[0].id)));
    }

    #[test]
    fn test_counterparties_reuse_visible_ones() {
        let store = MemoryStore::default();
        store.counterparties.borrow_mut().extend([
            Counterparty {
                id: 100,
                uid: 1,
                name: "Shop".into(),
                counterparty_type: CounterpartyType::Company,
                icon: 0,
                color: "588a6a".into(),
                display_order: 1,
                hidden: false,
                deleted: false,
                created_at: Utc::now(),
            },
            Counterparty {
                id: 101,
                uid: 1,
                name: "Cafe".into(),
                counterparty_type: CounterpartyType::Company,
                icon: 0,
                color: "588a6a".into(),
                display_order: 2,
                hidden: false,
                deleted: true,
                created_at: Utc::now(),
            },
        ]);

        let mut result = import(vec![
            expense("Card", "", "Еда", "Shop"),
            expense("Card", "", "Еда", " Cafe "),
            expense("Card", "", "Еда", "Cafe"),
            expense("Card", "", "Еда", ""),
        ]);
        let defaults = EntityDefaults::default();
        let created = EntityResolver::new(&store, &defaults)
            .resolve(1, &mut result)
            .unwrap();

        assert_eq!(created.counterparties.len(), 1);
        let cafe = &created.counterparties[0];
        assert_eq!(cafe.name, "Cafe");
        assert_eq!(cafe.display_order, 3);

        assert_eq!(result.transactions[0].counterparty_id, Some(100));
        assert_eq!(result.transactions[1].counterparty_id, Some(cafe.id));
        assert_eq!(result.transactions[2].counterparty_id, Some(cafe.id));
        assert_eq!(result.transactions[3].counterparty_id, None);
    }

    #[test]
    fn test_tags_patched_by_slot() {
        let mut a = expense("Card", "", "Еда", "");
        a.set(Column::Tags, "Trip;Work");
        a.set(Column::TagGroup, "Kind");
        let mut b = expense("Card", "", "Еда", "");
        b.set(Column::Tags, "Work");

        let mut result = import(vec![a, b]);
        let store = MemoryStore::default();
        let defaults = EntityDefaults::default();
        let created = EntityResolver::new(&store, &defaults)
            .resolve(1, &mut result)
            .unwrap();

        assert_eq!(created.tags.len(), 2);
        assert_eq!(created.tags[0].group_name.as_deref(), Some("Kind"));
        let work = created.tags[1].id;
        assert_eq!(result.transactions[0].tags[1].id, Some(work));
        assert_eq!(result.transactions[1].tags[0].id, Some(work));
        assert!(result.transactions[0].to_new_transaction().is_ok());
    }

    #[test]
    fn test_failure_aborts_without_rollback() {
        let mut result = import(vec![expense("Card", "", "Еда", "")]);
        let store = MemoryStore {
            fail_on: Some("category"),
            ..MemoryStore::default()
        };
        let defaults = EntityDefaults::default();
        let err = EntityResolver::new(&store, &defaults)
            .resolve(1, &mut result)
            .unwrap_err();

        assert!(matches!(err, Error::AutoCreate { entity: "category", .. }));
        assert_eq!(store.accounts.borrow().len(), 1);
    }
}
