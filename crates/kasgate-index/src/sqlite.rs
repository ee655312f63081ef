//! SQLite storage backend.
//!
//! Persists confirmed transaction records to a single SQLite file.
//! Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use kasgate_index::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./kasgate.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use kasgate_core::{Direction, TransactionRecord};

use crate::store::{StoreError, TransactionStore};

/// SQLite-backed store of confirmed [`TransactionRecord`]s.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./kasgate.db"`) or a full
    /// SQLite URL (`"sqlite:./kasgate.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), StoreError> {
        // WAL mode — better concurrent read throughput
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transactions (
                id         TEXT    PRIMARY KEY,
                address    TEXT    NOT NULL,
                amount     INTEGER NOT NULL,
                direction  TEXT    NOT NULL,
                daa_score  INTEGER NOT NULL,
                confirmed  INTEGER NOT NULL,
                indexed_at INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_address ON transactions (address);",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_daa ON transactions (daa_score);",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> TransactionRecord {
        let direction: String = row.get("direction");
        TransactionRecord {
            id: row.get("id"),
            address: row.get("address"),
            amount: row.get::<i64, _>("amount") as u64,
            direction: if direction == "OUT" {
                Direction::Outgoing
            } else {
                Direction::Incoming
            },
            daa_score: row.get::<i64, _>("daa_score") as u64,
            confirmed: row.get::<i64, _>("confirmed") != 0,
        }
    }
}

#[async_trait]
impl TransactionStore for SqliteStore {
    async fn upsert(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        // Replayed blocks re-deliver the same ids; first write wins
        let result = sqlx::query(
            "INSERT INTO transactions
             (id, address, amount, direction, daa_score, confirmed, indexed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&record.id)
        .bind(&record.address)
        .bind(record.amount as i64)
        .bind(record.direction.tag())
        .bind(record.daa_score as i64)
        .bind(record.confirmed as i64)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        if result.rows_affected() > 0 {
            debug!(id = %record.id, daa = record.daa_score, "record stored");
        }
        Ok(())
    }

    async fn query_by_address(
        &self,
        address: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, address, amount, direction, daa_score, confirmed
             FROM transactions WHERE address = ?
             ORDER BY daa_score DESC, id ASC
             LIMIT ? OFFSET ?",
        )
        .bind(address)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn count_by_address(&self, address: &str) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM transactions WHERE address = ?")
            .bind(address)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
