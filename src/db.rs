use std::path::Path;

use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};
use tracing::debug;

use crate::catalog::CatalogVariant;
use crate::error::StoreError;

/// One persisted catalog row. `tags` and `ratings` follow the variant's
/// column order; `None` is an unknown value.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    pub tags: Vec<Option<String>>,
    pub ratings: Vec<Option<f64>>,
    pub average_rating: Option<f64>,
}

impl CatalogEntry {
    pub fn tag(&self, column: &str, variant: &CatalogVariant) -> Option<&str> {
        let idx = variant.tags.iter().position(|t| t.column == column)?;
        self.tags.get(idx)?.as_deref()
    }
}

/// Key-addressable record store, keyed by exact `name`.
pub trait RecordStore {
    fn find_by_name(&self, name: &str) -> Result<Option<CatalogEntry>, StoreError>;
    /// Fails with [`StoreError::Duplicate`] when `name` is already taken.
    fn insert(&mut self, entry: &CatalogEntry) -> Result<(), StoreError>;
    /// Writes ratings and average; categorical columns are left alone.
    fn update(&mut self, entry: &CatalogEntry) -> Result<(), StoreError>;
    fn list_all(&self) -> Result<Vec<CatalogEntry>, StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
    variant: &'static CatalogVariant,
}

pub fn connect(path: &Path) -> Result<Connection, StoreError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

impl SqliteStore {
    /// Wrap a connection and create the variant's table if needed.
    pub fn open(conn: Connection, variant: &'static CatalogVariant) -> Result<Self, StoreError> {
        let store = SqliteStore { conn, variant };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let v = self.variant;
        let mut columns = vec![
            "id INTEGER PRIMARY KEY".to_string(),
            "name TEXT UNIQUE NOT NULL".to_string(),
        ];
        columns.extend(v.tags.iter().map(|t| format!("{} TEXT", t.column)));
        columns.extend(v.rating_columns.iter().map(|c| format!("{} REAL", c)));
        columns.push("average_rating REAL".to_string());
        columns.push("created_at TEXT NOT NULL DEFAULT (datetime('now'))".to_string());
        columns.push("updated_at TEXT".to_string());

        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    {cols}\n);
             CREATE INDEX IF NOT EXISTS idx_{table}_average ON {table}(average_rating);",
            table = v.table,
            cols = columns.join(",\n    "),
        ))?;
        debug!(table = v.table, "schema ready");
        Ok(())
    }

    /// Column list shared by every SELECT, in [`CatalogVariant::columns`] order.
    fn select_list(&self) -> String {
        self.variant.columns().join(", ")
    }

    fn read_entry(&self, row: &Row) -> rusqlite::Result<CatalogEntry> {
        let n_tags = self.variant.tags.len();
        let n_ratings = self.variant.rating_columns.len();
        let tags = (0..n_tags)
            .map(|i| row.get(1 + i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let ratings = (0..n_ratings)
            .map(|i| row.get(1 + n_tags + i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(CatalogEntry {
            name: row.get(0)?,
            tags,
            ratings,
            average_rating: row.get(1 + n_tags + n_ratings)?,
        })
    }

    pub fn stats(&self) -> Result<Stats, StoreError> {
        let table = self.variant.table;
        let total: usize =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;

        let all_rated = self
            .variant
            .rating_columns
            .iter()
            .map(|c| format!("{} IS NOT NULL", c))
            .collect::<Vec<_>>()
            .join(" AND ");
        let fully_rated: usize = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {}", table, all_rated),
            [],
            |r| r.get(0),
        )?;
        let unrated: usize = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE average_rating IS NULL", table),
            [],
            |r| r.get(0),
        )?;
        let last_updated: Option<String> = self.conn.query_row(
            &format!("SELECT MAX(COALESCE(updated_at, created_at)) FROM {}", table),
            [],
            |r| r.get(0),
        )?;

        Ok(Stats {
            total,
            fully_rated,
            partially_rated: total - fully_rated - unrated,
            unrated,
            last_updated,
        })
    }

    /// Entries ordered best rated first; unrated entries last.
    pub fn fetch_overview(&self, limit: usize) -> Result<Vec<CatalogEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {}
             ORDER BY average_rating IS NULL, average_rating DESC, name
             LIMIT {}",
            self.select_list(),
            self.variant.table,
            limit
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| self.read_entry(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl RecordStore for SqliteStore {
    fn find_by_name(&self, name: &str) -> Result<Option<CatalogEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE name = ?1",
            self.select_list(),
            self.variant.table
        );
        let entry = self
            .conn
            .query_row(&sql, [name], |row| self.read_entry(row))
            .optional()?;
        Ok(entry)
    }

    fn insert(&mut self, entry: &CatalogEntry) -> Result<(), StoreError> {
        let columns = self.variant.columns();
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.variant.table,
            columns.join(", "),
            placeholders
        );

        let mut params: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(columns.len());
        params.push(&entry.name);
        params.extend(entry.tags.iter().map(|t| t as &dyn rusqlite::types::ToSql));
        params.extend(entry.ratings.iter().map(|r| r as &dyn rusqlite::types::ToSql));
        params.push(&entry.average_rating);

        match self.conn.execute(&sql, params.as_slice()) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::Duplicate(entry.name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update(&mut self, entry: &CatalogEntry) -> Result<(), StoreError> {
        let n = self.variant.rating_columns.len();
        let assignments = self
            .variant
            .rating_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c, i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {}, average_rating = ?{}, updated_at = datetime('now') WHERE name = ?1",
            self.variant.table,
            assignments,
            n + 2
        );

        let mut params: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(n + 2);
        params.push(&entry.name);
        params.extend(entry.ratings.iter().map(|r| r as &dyn rusqlite::types::ToSql));
        params.push(&entry.average_rating);

        self.conn.execute(&sql, params.as_slice())?;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<CatalogEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY id",
            self.select_list(),
            self.variant.table
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| self.read_entry(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub fully_rated: usize,
    pub partially_rated: usize,
    pub unrated: usize,
    pub last_updated: Option<String>,
}
