//! Main store implementation.

use std::path::Path;

use rusqlite::Connection;
use time::{Date, OffsetDateTime};
use tracing::{debug, info};

use episeries_types::{Filter, RawRow, ReferenceEntity, RowShape, SortOrder};

use crate::error::{Error, Result};
use crate::models::NewRecord;
use crate::queries::{self, Params};
use crate::schema;

/// SQLite-based store for indicator records.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

fn row_date(timestamp: i64) -> Result<Date> {
    OffsetDateTime::from_unix_timestamp(timestamp)
        .map(|dt| dt.date())
        .map_err(|e| Error::InvalidTimestamp(format!("{}: {}", timestamp, e)))
}

fn param_refs(params: &Params) -> Vec<&dyn rusqlite::ToSql> {
    params.iter().map(|p| p.as_ref()).collect()
}

// Write operations
impl Store {
    /// Insert a record.
    pub fn insert_record(&self, record: &NewRecord) -> Result<i64> {
        let attributes = serde_json::to_string(&record.attributes)?;

        self.conn.execute(
            "INSERT INTO records (collection, date, location, period_type, source_id,
             is_date_total, attributes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                record.collection,
                record.date_timestamp(),
                record.location,
                record.period_type.as_str(),
                record.source_id,
                record.is_date_total,
                attributes,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Insert many records in one transaction.
    pub fn insert_records(&mut self, records: &[NewRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO records (collection, date, location, period_type, source_id,
                 is_date_total, attributes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in records {
                stmt.execute(rusqlite::params![
                    record.collection,
                    record.date_timestamp(),
                    record.location,
                    record.period_type.as_str(),
                    record.source_id,
                    record.is_date_total,
                    serde_json::to_string(&record.attributes)?,
                ])?;
            }
        }
        tx.commit()?;

        info!("Inserted {} records", records.len());
        Ok(records.len())
    }

    /// Insert or replace a reference entity.
    pub fn upsert_reference_entity(&self, entity: &ReferenceEntity) -> Result<()> {
        self.conn.execute(
            "INSERT INTO reference_entities (id, kind, name, attributes) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                kind = ?2,
                name = ?3,
                attributes = COALESCE(?4, attributes)",
            rusqlite::params![entity.id, entity.kind, entity.name, entity.attributes],
        )?;
        Ok(())
    }

    /// Count records, optionally for one collection.
    pub fn count_records(&self, collection: Option<&str>) -> Result<u64> {
        let count: i64 = match collection {
            Some(name) => self.conn.query_row(
                "SELECT COUNT(*) FROM records WHERE collection = ?",
                [name],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

// Read operations
impl Store {
    /// Grouped retrieval: one row per date (and split value), date ascending.
    pub fn aggregate_by_date(
        &self,
        collection: &str,
        filter: &Filter,
        shape: &RowShape,
    ) -> Result<Vec<RawRow>> {
        let (where_clause, params) = queries::build_where(collection, filter)?;
        let sql = queries::build_aggregate_sql(&where_clause, shape)?;

        debug!("Executing aggregate: {}", sql);

        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map(param_refs(&params).as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(ts, total, split_value)| {
                Ok(RawRow {
                    date: row_date(ts)?,
                    total,
                    split_value,
                    location: None,
                })
            })
            .collect()
    }

    /// Raw retrieval: one row per stored record.
    pub fn find_raw(
        &self,
        collection: &str,
        filter: &Filter,
        shape: &RowShape,
        order: SortOrder,
        limit: Option<u32>,
    ) -> Result<Vec<RawRow>> {
        let (where_clause, params) = queries::build_where(collection, filter)?;
        let sql = queries::build_raw_sql(&where_clause, shape, order, limit)?;

        debug!("Executing find: {}", sql);

        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map(param_refs(&params).as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(ts, total, split_value, location)| {
                Ok(RawRow {
                    date: row_date(ts)?,
                    total,
                    split_value,
                    location,
                })
            })
            .collect()
    }

    /// First record in the given date order.
    pub fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        shape: &RowShape,
        order: SortOrder,
    ) -> Result<Option<RawRow>> {
        let mut rows = self.find_raw(collection, filter, shape, order, Some(1))?;
        Ok(rows.pop())
    }

    /// Distinct data-source identifiers of matching records.
    pub fn find_distinct_sources(&self, collection: &str, filter: &Filter) -> Result<Vec<String>> {
        let (where_clause, params) = queries::build_where(collection, filter)?;
        let sql = queries::build_sources_sql(&where_clause);

        let mut stmt = self.conn.prepare(&sql)?;
        let sources = stmt
            .query_map(param_refs(&params).as_slice(), |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(sources)
    }

    /// Reference entities by id, ordered by id. Unknown ids are skipped.
    pub fn find_by_ids(&self, ids: &[String]) -> Result<Vec<ReferenceEntity>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, kind, name, attributes FROM reference_entities
             WHERE id IN ({}) ORDER BY id ASC",
            placeholders
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let entities = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                Ok(ReferenceEntity {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    name: row.get(2)?,
                    attributes: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entities)
    }
}
