//! Account operations

use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{Account, AccountCategory, AccountType, NewAccount};
use crate::store::AccountStore;

const ACCOUNT_COLUMNS: &str = "id, uid, name, currency, category, account_type, icon, color, display_order, hidden, created_at";

fn account_from_row(row: &Row) -> rusqlite::Result<Account> {
    let category: String = row.get(4)?;
    let account_type: String = row.get(5)?;
    let created_at: String = row.get(10)?;

    Ok(Account {
        id: row.get(0)?,
        uid: row.get(1)?,
        name: row.get(2)?,
        currency: row.get(3)?,
        category: category.parse().unwrap_or(AccountCategory::Other),
        account_type: account_type.parse().unwrap_or(AccountType::SingleAccount),
        icon: row.get(6)?,
        color: row.get(7)?,
        display_order: row.get(8)?,
        hidden: row.get(9)?,
        created_at: parse_datetime(&created_at),
    })
}

impl AccountStore for Database {
    fn max_account_display_order(&self, uid: i64, category: AccountCategory) -> Result<i64> {
        let conn = self.conn()?;
        let max: i64 = conn.query_row(
            "SELECT COALESCE(MAX(display_order), 0) FROM accounts WHERE uid = ? AND category = ?",
            params![uid, category.as_str()],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn create_account(&self, uid: i64, account: &NewAccount) -> Result<Account> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO accounts (uid, name, currency, category, account_type, icon, color, display_order)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                uid,
                account.name,
                account.currency,
                account.category.as_str(),
                account.account_type.as_str(),
                account.icon,
                account.color,
                account.display_order,
            ],
        )?;
        let id = conn.last_insert_rowid();

        let created = conn.query_row(
            &format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS),
            params![id],
            account_from_row,
        )?;
        Ok(created)
    }

    fn list_accounts(&self, uid: i64) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE uid = ? ORDER BY category, display_order, id",
            ACCOUNT_COLUMNS
        ))?;

        let accounts = stmt
            .query_map(params![uid], account_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(accounts)
    }
}
