use crate::model::{PriceObservation, StorageError, TrackedItem};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens the database and runs migrations.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "foreign_keys", true)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tracked_items (
                id INTEGER PRIMARY KEY,
                owner INTEGER NOT NULL,
                asin TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL DEFAULT '',
                target_price REAL NOT NULL,
                last_price REAL,
                last_checked_at TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(owner, asin)
            );

            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY,
                item_id INTEGER NOT NULL REFERENCES tracked_items(id),
                price REAL NOT NULL,
                observed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_price_history_item
                ON price_history(item_id, observed_at);
            ",
        )?;

        // Auto-migrations for databases created before these columns existed.
        Self::migrate_add_column_if_missing(&conn, "tracked_items", "title", "TEXT NOT NULL DEFAULT ''")?;
        Self::migrate_add_column_if_missing(&conn, "tracked_items", "url", "TEXT NOT NULL DEFAULT ''")?;

        Ok(Self { conn })
    }

    /// Adds a column to a table unless it is already present.
    fn migrate_add_column_if_missing(
        conn: &Connection,
        table: &str,
        column: &str,
        column_def: &str,
    ) -> Result<(), StorageError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let existing_columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        if !existing_columns.iter().any(|c| c == column) {
            let alter_sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, column_def);
            conn.execute(&alter_sql, [])?;
        }

        Ok(())
    }

    /// Inserts a tracked item, or updates the target of an existing
    /// (owner, asin) row. At most one item per owner and product.
    pub fn upsert_item(
        &self,
        owner: i64,
        asin: &str,
        title: &str,
        url: &str,
        target_price: f64,
    ) -> Result<TrackedItem, StorageError> {
        self.conn.execute(
            "INSERT INTO tracked_items (owner, asin, title, url, target_price, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(owner, asin) DO UPDATE SET
                 target_price = excluded.target_price,
                 title = excluded.title,
                 url = excluded.url",
            params![owner, asin, title, url, target_price, Utc::now()],
        )?;
        self.get_item(owner, asin)?.ok_or(StorageError::NotFound)
    }

    pub fn get_item(&self, owner: i64, asin: &str) -> Result<Option<TrackedItem>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner, asin, title, url, target_price, last_price, last_checked_at, created_at
             FROM tracked_items WHERE owner = ?1 AND asin = ?2",
        )?;
        let mut rows = stmt.query(params![owner, asin])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::map_item(row)?)),
            None => Ok(None),
        }
    }

    pub fn items_for_owner(&self, owner: i64) -> Result<Vec<TrackedItem>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner, asin, title, url, target_price, last_price, last_checked_at, created_at
             FROM tracked_items WHERE owner = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![owner], |row| Self::map_item(row))?;
        let mut items = Vec::new();
        for item in rows {
            items.push(item?);
        }
        Ok(items)
    }

    /// The polling loop's working set: every tracked item, one read per cycle.
    pub fn all_items(&self) -> Result<Vec<TrackedItem>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner, asin, title, url, target_price, last_price, last_checked_at, created_at
             FROM tracked_items ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| Self::map_item(row))?;
        let mut items = Vec::new();
        for item in rows {
            items.push(item?);
        }
        Ok(items)
    }

    pub fn count_for_owner(&self, owner: i64) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tracked_items WHERE owner = ?1",
            params![owner],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Deletes an item together with its observation history. Returns
    /// false when the owner was not tracking that product.
    pub fn delete_item(&mut self, owner: i64, asin: &str) -> Result<bool, StorageError> {
        let tx = self.conn.transaction()?;
        let deleted = {
            let id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM tracked_items WHERE owner = ?1 AND asin = ?2",
                    params![owner, asin],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            match id {
                Some(id) => {
                    tx.execute("DELETE FROM price_history WHERE item_id = ?1", params![id])?;
                    tx.execute("DELETE FROM tracked_items WHERE id = ?1", params![id])?;
                    true
                }
                None => false,
            }
        };
        tx.commit()?;
        Ok(deleted)
    }

    /// Persists one successful price check: a new observation plus the
    /// item's last_price/last_checked_at, in a single transaction. No
    /// transaction ever spans more than one item.
    pub fn record_check(
        &mut self,
        item_id: i64,
        price: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO price_history (item_id, price, observed_at) VALUES (?1, ?2, ?3)",
            params![item_id, price, observed_at],
        )?;
        tx.execute(
            "UPDATE tracked_items SET last_price = ?2, last_checked_at = ?3 WHERE id = ?1",
            params![item_id, price, observed_at],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn observations_for_item(
        &self,
        item_id: i64,
    ) -> Result<Vec<PriceObservation>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT item_id, price, observed_at FROM price_history
             WHERE item_id = ?1 ORDER BY observed_at ASC",
        )?;
        let rows = stmt.query_map(params![item_id], |row| {
            Ok(PriceObservation {
                item_id: row.get(0)?,
                price: row.get(1)?,
                observed_at: row.get(2)?,
            })
        })?;
        let mut observations = Vec::new();
        for obs in rows {
            observations.push(obs?);
        }
        Ok(observations)
    }

    /// Lowest observed price since the given instant, if any.
    pub fn window_low(
        &self,
        item_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Option<f64>, StorageError> {
        let low: Option<f64> = self.conn.query_row(
            "SELECT MIN(price) FROM price_history WHERE item_id = ?1 AND observed_at >= ?2",
            params![item_id, since],
            |row| row.get(0),
        )?;
        Ok(low)
    }

    /// Retention policy: drops observations older than the cutoff.
    /// Returns how many rows went away.
    pub fn prune_observations(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let deleted = self.conn.execute(
            "DELETE FROM price_history WHERE observed_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    fn map_item(row: &Row) -> Result<TrackedItem, rusqlite::Error> {
        Ok(TrackedItem {
            id: row.get(0)?,
            owner: row.get(1)?,
            asin: row.get(2)?,
            title: row.get(3)?,
            url: row.get(4)?,
            target_price: row.get(5)?,
            last_price: row.get(6)?,
            last_checked_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}
