//! Counterparty operations

use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{Counterparty, CounterpartyType, NewCounterparty};
use crate::store::CounterpartyStore;

const COUNTERPARTY_COLUMNS: &str =
    "id, uid, name, counterparty_type, icon, color, display_order, hidden, deleted, created_at";

fn counterparty_from_row(row: &Row) -> rusqlite::Result<Counterparty> {
    let counterparty_type: String = row.get(3)?;
    let created_at: String = row.get(9)?;

    Ok(Counterparty {
        id: row.get(0)?,
        uid: row.get(1)?,
        name: row.get(2)?,
        counterparty_type: counterparty_type
            .parse()
            .unwrap_or(CounterpartyType::Company),
        icon: row.get(4)?,
        color: row.get(5)?,
        display_order: row.get(6)?,
        hidden: row.get(7)?,
        deleted: row.get(8)?,
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    /// Soft-delete a counterparty; it stays listed but is no longer matched by imports
    pub fn delete_counterparty(&self, uid: i64, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE counterparties SET deleted = 1 WHERE uid = ? AND id = ?",
            params![uid, id],
        )?;
        Ok(changed > 0)
    }
}

impl CounterpartyStore for Database {
    fn list_counterparties(&self, uid: i64) -> Result<Vec<Counterparty>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM counterparties WHERE uid = ? ORDER BY display_order, id",
            COUNTERPARTY_COLUMNS
        ))?;

        let counterparties = stmt
            .query_map(params![uid], counterparty_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(counterparties)
    }

    fn max_counterparty_display_order(&self, uid: i64) -> Result<i64> {
        let conn = self.conn()?;
        let max: i64 = conn.query_row(
            "SELECT COALESCE(MAX(display_order), 0) FROM counterparties WHERE uid = ? AND deleted = 0",
            params![uid],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn create_counterparty(&self, uid: i64, counterparty: &NewCounterparty) -> Result<Counterparty> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO counterparties (uid, name, counterparty_type, icon, color, display_order)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                uid,
                counterparty.name,
                counterparty.counterparty_type.as_str(),
                counterparty.icon,
                counterparty.color,
                counterparty.display_order,
            ],
        )?;
        let id = conn.last_insert_rowid();

        let created = conn.query_row(
            &format!("SELECT {} FROM counterparties WHERE id = ?", COUNTERPARTY_COLUMNS),
            params![id],
            counterparty_from_row,
        )?;
        Ok(created)
    }
}
