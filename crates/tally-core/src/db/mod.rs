//! Database access layer with connection pooling and migrations
//!
//! Every table is keyed by the owning user's `uid`. This module is organized by domain:
//! - `accounts` - Account creation and listing
//! - `categories` - Category trees per category type
//! - `counterparties` - Payees and payers
//! - `tags` - Tags and tag groups
//! - `transactions` - Batch transaction inserts
//! - `lookups` - Name-keyed maps of existing entities for the importer

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::info;

use crate::config::BatchLimits;
use crate::error::{Error, Result};
use crate::models::User;

mod accounts;
mod categories;
mod counterparties;
mod lookups;
mod tags;
mod transactions;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "TALLY_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"tally-salt-v1-fx";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
    /// Batch insert limits and progress cadence
    batch: BatchLimits,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `TALLY_DB_KEY` to be set. The database is encrypted using
    /// SQLCipher with a key derived from the passphrase via Argon2.
    /// Use `new_unencrypted()` for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: Only use for development or testing.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            let manager =
                manager.with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
            batch: BatchLimits::default(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Replace the batch insert limits (from the import config)
    pub fn with_batch_limits(mut self, batch: BatchLimits) -> Self {
        self.batch = batch;
        self
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because each pooled
    /// connection would otherwise see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "tally_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().into_owned();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Look up the user for an authenticated identity, creating it on first sight
    pub fn get_or_create_user(&self, email: &str) -> Result<User> {
        let conn = self.conn()?;

        let existing = conn
            .query_row(
                "SELECT id, email, created_at FROM users WHERE email = ?",
                params![email],
                |row| {
                    let created_at: String = row.get(2)?;
                    Ok(User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        created_at: parse_datetime(&created_at),
                    })
                },
            )
            .optional()?;

        if let Some(user) = existing {
            return Ok(user);
        }

        conn.execute("INSERT INTO users (email) VALUES (?)", params![email])?;
        let id = conn.last_insert_rowid();
        info!("Created user {} ({})", id, email);

        Ok(User {
            id,
            email: email.to_string(),
            created_at: Utc::now(),
        })
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                uid INTEGER NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                currency TEXT NOT NULL,
                category TEXT NOT NULL,             -- cash, checking, savings, credit_card, investment, other
                account_type TEXT NOT NULL,         -- single_account, multi_sub_accounts
                icon INTEGER NOT NULL DEFAULT 1,
                color TEXT NOT NULL DEFAULT '',
                display_order INTEGER NOT NULL DEFAULT 0,
                hidden INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_uid ON accounts(uid, category);

            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY,
                uid INTEGER NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                category_type TEXT NOT NULL,        -- income, expense, transfer
                parent_id INTEGER REFERENCES categories(id),
                icon INTEGER NOT NULL DEFAULT 1,
                color TEXT NOT NULL DEFAULT '',
                display_order INTEGER NOT NULL DEFAULT 0,
                hidden INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_categories_uid ON categories(uid, category_type);

            CREATE TABLE IF NOT EXISTS counterparties (
                id INTEGER PRIMARY KEY,
                uid INTEGER NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                counterparty_type TEXT NOT NULL,    -- company, individual
                icon INTEGER NOT NULL DEFAULT 0,
                color TEXT NOT NULL DEFAULT '',
                display_order INTEGER NOT NULL DEFAULT 0,
                hidden INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_counterparties_uid ON counterparties(uid);

            CREATE TABLE IF NOT EXISTS tag_groups (
                id INTEGER PRIMARY KEY,
                uid INTEGER NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(uid, name)
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY,
                uid INTEGER NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                group_id INTEGER REFERENCES tag_groups(id),
                display_order INTEGER NOT NULL DEFAULT 0,
                hidden INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_tags_uid ON tags(uid);

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                uid INTEGER NOT NULL REFERENCES users(id),
                transaction_type TEXT NOT NULL,     -- modify_balance, income, expense, transfer
                time TEXT NOT NULL,                 -- local time, YYYY-MM-DD HH:MM:SS
                utc_offset_minutes INTEGER NOT NULL DEFAULT 0,
                category_id INTEGER REFERENCES categories(id),
                account_id INTEGER NOT NULL REFERENCES accounts(id),
                amount INTEGER NOT NULL,            -- minor units
                related_account_id INTEGER REFERENCES accounts(id),
                related_amount INTEGER NOT NULL DEFAULT 0,
                counterparty_id INTEGER REFERENCES counterparties(id),
                description TEXT NOT NULL DEFAULT '',
                latitude REAL,
                longitude REAL,
                planned INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_uid_time ON transactions(uid, time);
            CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id);

            CREATE TABLE IF NOT EXISTS transaction_tags (
                transaction_id INTEGER NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id),
                PRIMARY KEY (transaction_id, tag_id)
            );
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
