//! Entity listing commands (accounts, categories, counterparties, tags)

use std::collections::HashMap;

use anyhow::Result;
use tally_core::{AccountStore, CategoryStore, CounterpartyStore, Database, TagStore};

use super::truncate;

fn empty_hint(kind: &str) {
    println!("No {} found. Import transactions with:", kind);
    println!("  tally import --file export.csv --format custom_csv");
}

/// List accounts for `user`
pub fn cmd_accounts(db: &Database, user: &str) -> Result<()> {
    let uid = db.get_or_create_user(user)?.id;
    let accounts = db.list_accounts(uid)?;

    if accounts.is_empty() {
        empty_hint("accounts");
        return Ok(());
    }

    println!();
    println!("📁 Accounts");
    println!("   ─────────────────────────────────────────────");

    for account in accounts {
        let hidden = if account.hidden { " (hidden)" } else { "" };
        println!(
            "   {:>4} │ {:24} │ {:4} │ {}{}",
            account.id,
            truncate(&account.name, 24),
            account.currency,
            account.category,
            hidden
        );
    }

    Ok(())
}

/// List categories for `user`, children indented under their parents
pub fn cmd_categories(db: &Database, user: &str) -> Result<()> {
    let uid = db.get_or_create_user(user)?.id;
    let categories = db.list_categories(uid)?;

    if categories.is_empty() {
        empty_hint("categories");
        return Ok(());
    }

    let mut children: HashMap<i64, Vec<_>> = HashMap::new();
    for category in categories.iter().filter(|c| c.parent_id.is_some()) {
        if let Some(parent_id) = category.parent_id {
            children.entry(parent_id).or_default().push(category);
        }
    }

    println!();
    println!("🗂  Categories");
    println!("   ─────────────────────────────────────────────");

    for parent in categories.iter().filter(|c| c.parent_id.is_none()) {
        println!(
            "   {:>4} │ {:8} │ {}",
            parent.id,
            parent.category_type.as_str(),
            parent.name
        );
        for child in children.get(&parent.id).into_iter().flatten() {
            println!(
                "   {:>4} │ {:8} │   └ {}",
                child.id,
                child.category_type.as_str(),
                child.name
            );
        }
    }

    Ok(())
}

/// List counterparties for `user` (deleted ones are left out)
pub fn cmd_counterparties(db: &Database, user: &str) -> Result<()> {
    let uid = db.get_or_create_user(user)?.id;
    let counterparties: Vec<_> = db
        .list_counterparties(uid)?
        .into_iter()
        .filter(|c| !c.deleted)
        .collect();

    if counterparties.is_empty() {
        empty_hint("counterparties");
        return Ok(());
    }

    println!();
    println!("🏪 Counterparties");
    println!("   ─────────────────────────────────────────────");

    for counterparty in counterparties {
        println!(
            "   {:>4} │ {}",
            counterparty.id,
            truncate(&counterparty.name, 40)
        );
    }

    Ok(())
}

/// List tags for `user` with their groups
pub fn cmd_tags(db: &Database, user: &str) -> Result<()> {
    let uid = db.get_or_create_user(user)?.id;
    let tags = db.list_tags(uid)?;

    if tags.is_empty() {
        empty_hint("tags");
        return Ok(());
    }

    println!();
    println!("🏷️  Tags");
    println!("   ─────────────────────────────────────────────");

    for tag in tags {
        println!(
            "   {:>4} │ {:20} │ {}",
            tag.id,
            truncate(&tag.name, 20),
            tag.group_name.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
