//! Transaction operations

use std::collections::HashSet;

use chrono::NaiveDateTime;
use rusqlite::{params, Row};
use tracing::debug;

use super::{parse_datetime, Database, DbConn};
use crate::error::{Error, Result};
use crate::import::TRANSACTION_TIME_FORMAT;
use crate::models::{GeoLocation, NewTransaction, Transaction, TransactionType};
use crate::store::TransactionStore;

fn transaction_from_row(row: &Row) -> rusqlite::Result<Transaction> {
    let transaction_type: String = row.get(2)?;
    let time: String = row.get(3)?;
    let latitude: Option<f64> = row.get(12)?;
    let longitude: Option<f64> = row.get(13)?;
    let created_at: String = row.get(15)?;
    let tag_ids: Option<String> = row.get(16)?;

    Ok(Transaction {
        id: row.get(0)?,
        uid: row.get(1)?,
        transaction_type: transaction_type
            .parse()
            .unwrap_or(TransactionType::Expense),
        time: NaiveDateTime::parse_from_str(&time, TRANSACTION_TIME_FORMAT)
            .unwrap_or_default(),
        utc_offset_minutes: row.get(4)?,
        category_id: row.get(5)?,
        account_id: row.get(6)?,
        amount: row.get(7)?,
        related_account_id: row.get(8)?,
        related_amount: row.get(9)?,
        counterparty_id: row.get(10)?,
        description: row.get(11)?,
        geo_location: latitude
            .zip(longitude)
            .map(|(latitude, longitude)| GeoLocation {
                latitude,
                longitude,
            }),
        planned: row.get(14)?,
        tag_ids: tag_ids
            .map(|ids| ids.split(',').filter_map(|id| id.parse().ok()).collect())
            .unwrap_or_default(),
        created_at: parse_datetime(&created_at),
    })
}

/// Tag ids in first-seen order, without repeats
fn unique_tag_ids(tag_ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    tag_ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

impl Database {
    /// List the user's transactions, newest first
    pub fn list_transactions(&self, uid: i64, limit: i64, offset: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT t.id, t.uid, t.transaction_type, t.time, t.utc_offset_minutes, t.category_id,
                   t.account_id, t.amount, t.related_account_id, t.related_amount,
                   t.counterparty_id, t.description, t.latitude, t.longitude, t.planned,
                   t.created_at,
                   (SELECT GROUP_CONCAT(tag_id) FROM transaction_tags WHERE transaction_id = t.id)
            FROM transactions t
            WHERE t.uid = ?
            ORDER BY t.time DESC, t.id DESC
            LIMIT ? OFFSET ?
            "#,
        )?;

        let transactions = stmt
            .query_map(params![uid, limit, offset], transaction_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    /// Count the user's transactions
    pub fn count_transactions(&self, uid: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE uid = ?",
            params![uid],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Every account referenced by the batch must belong to `uid`
    fn check_account_ownership(
        &self,
        conn: &DbConn,
        uid: i64,
        transactions: &[NewTransaction],
    ) -> Result<()> {
        let referenced: HashSet<i64> = transactions
            .iter()
            .flat_map(|tx| std::iter::once(tx.account_id).chain(tx.related_account_id))
            .collect();

        let mut stmt = conn.prepare("SELECT 1 FROM accounts WHERE uid = ? AND id = ?")?;
        for account_id in referenced {
            if !stmt.exists(params![uid, account_id])? {
                return Err(Error::InvalidData(format!(
                    "account {} does not exist",
                    account_id
                )));
            }
        }
        Ok(())
    }
}

impl TransactionStore for Database {
    fn batch_create_transactions(
        &self,
        uid: i64,
        transactions: &[NewTransaction],
        progress: &mut dyn FnMut(f64),
    ) -> Result<usize> {
        let total = transactions.len();
        if total == 0 {
            return Ok(0);
        }
        if total > self.batch.max_transactions {
            return Err(Error::TooManyTransactions {
                count: total,
                max: self.batch.max_transactions,
            });
        }

        let conn = self.conn()?;
        self.check_account_ownership(&conn, uid, transactions)?;

        let step = self.batch.progress.update_step(total);

        // Use explicit transaction for atomicity
        conn.execute("BEGIN TRANSACTION", [])?;

        let result = (|| -> Result<usize> {
            let mut insert_tx = conn.prepare(
                r#"
                INSERT INTO transactions (uid, transaction_type, time, utc_offset_minutes, category_id,
                    account_id, amount, related_account_id, related_amount, counterparty_id,
                    description, latitude, longitude, planned)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            let mut insert_tag = conn
                .prepare("INSERT INTO transaction_tags (transaction_id, tag_id) VALUES (?, ?)")?;

            for (i, tx) in transactions.iter().enumerate() {
                insert_tx.execute(params![
                    uid,
                    tx.transaction_type.as_str(),
                    tx.time.format(TRANSACTION_TIME_FORMAT).to_string(),
                    tx.utc_offset_minutes,
                    tx.category_id,
                    tx.account_id,
                    tx.amount,
                    tx.related_account_id,
                    tx.related_amount,
                    tx.counterparty_id,
                    tx.description,
                    tx.geo_location.map(|g| g.latitude),
                    tx.geo_location.map(|g| g.longitude),
                    tx.planned,
                ])?;
                let transaction_id = conn.last_insert_rowid();

                for tag_id in unique_tag_ids(&tx.tag_ids) {
                    insert_tag.execute(params![transaction_id, tag_id])?;
                }

                let done = i + 1;
                if done % step == 0 && done < total {
                    progress(done as f64 / total as f64);
                }
            }

            Ok(total)
        })();

        match result {
            Ok(count) => {
                conn.execute("COMMIT", [])?;
                progress(1.0);
                debug!("Inserted {} transactions for uid {}", count, uid);
                Ok(count)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }
}
