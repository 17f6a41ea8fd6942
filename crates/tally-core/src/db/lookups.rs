//! Name-keyed views of a user's existing entities

use std::collections::HashMap;

use super::Database;
use crate::error::Result;
use crate::import::ExistingEntities;
use crate::models::CategoryType;
use crate::store::{AccountStore, CategoryStore, TagStore};

impl Database {
    /// Build the importer's lookup maps from the user's visible entities
    ///
    /// On duplicate names the first entity in listing order wins.
    pub fn existing_entities(&self, uid: i64) -> Result<ExistingEntities> {
        let mut existing = ExistingEntities::default();

        for account in self.list_accounts(uid)?.into_iter().filter(|a| !a.hidden) {
            existing.accounts.entry(account.name.clone()).or_insert(account);
        }

        let categories = self.list_categories(uid)?;
        let names: HashMap<i64, String> = categories
            .iter()
            .map(|c| (c.id, c.name.clone()))
            .collect();

        for category in categories.into_iter().filter(|c| !c.hidden) {
            let parent_name = category
                .parent_id
                .and_then(|id| names.get(&id).cloned())
                .unwrap_or_default();
            let key = (parent_name, category.name.clone());

            let map = match category.category_type {
                CategoryType::Expense => &mut existing.expense_categories,
                CategoryType::Income => &mut existing.income_categories,
                CategoryType::Transfer => &mut existing.transfer_categories,
            };
            map.entry(key).or_insert(category);
        }

        for tag in self.list_tags(uid)?.into_iter().filter(|t| !t.hidden) {
            existing.tags.entry(tag.name.clone()).or_insert(tag);
        }

        Ok(existing)
    }
}
