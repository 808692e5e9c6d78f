//! SqliteStore (A5): the default `StorageBackend`, grounded on the donor
//! repo's `signals/db_storage.rs` schema/WAL conventions.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::model::StorageRecord;
use crate::storage::StorageBackend;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS accepted_items (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    item_name       TEXT NOT NULL,
    quality         TEXT,
    stattrak        INTEGER NOT NULL,
    profitability   REAL NOT NULL,
    profit_eur      REAL NOT NULL,
    buff_url        TEXT,
    buff_price_eur  REAL NOT NULL,
    steam_url       TEXT,
    steam_price_eur REAL NOT NULL,
    scraped_at      TEXT NOT NULL,
    source          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_accepted_items_name ON accepted_items(item_name);
"#;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        info!(path, "sqlite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Backs the `history --item NAME [--limit L]` CLI subcommand.
    pub async fn history(&self, item_name: &str, limit: usize) -> anyhow::Result<Vec<StorageRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT item_name, quality, stattrak, profitability, profit_eur, buff_url, \
             buff_price_eur, steam_url, steam_price_eur, scraped_at, source \
             FROM accepted_items WHERE item_name = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![item_name, limit as i64], |row| {
            Ok(StorageRecord {
                item_name: row.get(0)?,
                quality: row.get(1)?,
                stattrak: row.get::<_, i64>(2)? != 0,
                profitability: row.get(3)?,
                profit_eur: row.get(4)?,
                buff_url: row.get(5)?,
                buff_price_eur: row.get(6)?,
                steam_url: row.get(7)?,
                steam_price_eur: row.get(8)?,
                scraped_at: row.get(9)?,
                source: "buff-arb-scraper",
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[async_trait]
impl StorageBackend for SqliteStore {
    async fn save_batch(&self, batch: &[StorageRecord]) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        for record in batch {
            tx.execute(
                "INSERT INTO accepted_items (item_name, quality, stattrak, profitability, \
                 profit_eur, buff_url, buff_price_eur, steam_url, steam_price_eur, scraped_at, source) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.item_name,
                    record.quality,
                    record.stattrak as i64,
                    record.profitability,
                    record.profit_eur,
                    record.buff_url,
                    record.buff_price_eur,
                    record.steam_url,
                    record.steam_price_eur,
                    record.scraped_at,
                    record.source,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn healthy(&self) -> bool {
        match self.conn.lock().await.execute_batch("SELECT 1") {
            Ok(_) => true,
            Err(e) => {
                error!("store health check failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StorageRecord;

    fn record(name: &str) -> StorageRecord {
        StorageRecord {
            item_name: name.to_string(),
            quality: Some("Field-Tested".into()),
            stattrak: false,
            profitability: 8.75,
            profit_eur: 0.875,
            buff_url: Some("https://cheap/item".into()),
            buff_price_eur: 10.0,
            steam_url: Some("https://steam/item".into()),
            steam_price_eur: 12.5,
            scraped_at: "2026/07/28-10:30".into(),
            source: "buff-arb-scraper",
        }
    }

    #[tokio::test]
    async fn save_and_read_back_history() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .save_batch(&[record("AK-47 | Redline"), record("AK-47 | Redline")])
            .await
            .unwrap();
        let history = store.history("AK-47 | Redline", 10).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn healthy_on_open_connection() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.healthy().await);
    }
}
