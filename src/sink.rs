//! Staging table sinks.
//!
//! A sink creates the staging table on demand and appends validated chunks,
//! each append being atomic on its own. Sinks may additionally group the
//! appends of one file into a single unit through [`StagingSink::begin_file`].

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info};
use rusqlite::{
    Connection, params_from_iter,
    types::{ToSql, ToSqlOutput},
};

use crate::{
    data::Value,
    schema::{CanonicalField, NormalizedChunk},
    validate::ValidatedChunk,
};

pub const DEFAULT_TABLE: &str = "staging_eleicoes";

pub trait StagingSink {
    fn create_table_if_not_exists(&mut self) -> Result<()>;

    /// Appends every row of `chunk` as one batch and returns the row count.
    fn append_rows(&mut self, chunk: &ValidatedChunk) -> Result<usize>;

    fn begin_file(&mut self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn commit_file(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback_file(&mut self) -> Result<()> {
        Ok(())
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Float(f) => ToSqlOutput::from(*f),
        })
    }
}

pub struct SqliteSink {
    conn: Connection,
    table: String,
}

impl SqliteSink {
    pub fn open(path: &Path, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating database directory {parent:?}"))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("Opening staging database {path:?}"))?;
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }

    pub fn open_in_memory(table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let conn = Connection::open_in_memory().context("Opening in-memory staging database")?;
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn row_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
                row.get(0)
            })
            .with_context(|| format!("Counting rows in {}", self.table))?;
        Ok(count as usize)
    }
}

impl StagingSink for SqliteSink {
    fn create_table_if_not_exists(&mut self) -> Result<()> {
        self.conn
            .execute_batch(&create_table_sql(&self.table))
            .with_context(|| format!("Creating staging table {}", self.table))?;
        info!("Staging table '{}' ready", self.table);
        Ok(())
    }

    fn append_rows(&mut self, chunk: &ValidatedChunk) -> Result<usize> {
        let chunk = chunk.chunk();
        if chunk.is_empty() {
            return Ok(0);
        }
        let sql = insert_sql(&self.table, chunk.fields());
        let inserted = if self.conn.is_autocommit() {
            let tx = self.conn.transaction().context("Starting append transaction")?;
            let inserted = insert_all(&tx, &sql, chunk)?;
            tx.commit().context("Committing append transaction")?;
            inserted
        } else {
            insert_all(&self.conn, &sql, chunk)?
        };
        debug!("Appended {inserted} row(s) to {}", self.table);
        Ok(inserted)
    }

    fn begin_file(&mut self, key: &str) -> Result<()> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .with_context(|| format!("Starting file transaction for '{key}'"))
    }

    fn commit_file(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            bail!("No file transaction is open");
        }
        self.conn
            .execute_batch("COMMIT")
            .context("Committing file transaction")
    }

    fn rollback_file(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn
            .execute_batch("ROLLBACK")
            .context("Rolling back file transaction")
    }
}

fn insert_all(conn: &Connection, sql: &str, chunk: &NormalizedChunk) -> Result<usize> {
    let mut stmt = conn
        .prepare_cached(sql)
        .with_context(|| format!("Preparing insert: {sql}"))?;
    for row in chunk.rows() {
        stmt.execute(params_from_iter(row.iter()))
            .context("Inserting staging row")?;
    }
    Ok(chunk.len())
}

pub fn create_table_sql(table: &str) -> String {
    let columns = CanonicalField::ALL
        .iter()
        .map(|field| format!("    {} {}", field.column_name(), field.sql_type()))
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n{columns},\n    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n);"
    )
}

fn insert_sql(table: &str, fields: &[CanonicalField]) -> String {
    let columns = fields
        .iter()
        .map(|field| field.column_name())
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=fields.len())
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {table} ({columns}) VALUES ({placeholders})")
}

pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(anyhow!("Invalid staging table name '{table}'"))
    }
}

/// One append as seen by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct StagedBatch {
    pub fields: Vec<CanonicalField>,
    pub rows: Vec<Vec<Option<Value>>>,
}

#[derive(Debug, Default)]
pub struct MemorySink {
    pub table_created: bool,
    pub batches: Vec<StagedBatch>,
    file_start: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.rows.len()).sum()
    }

    pub fn largest_batch(&self) -> usize {
        self.batches
            .iter()
            .map(|batch| batch.rows.len())
            .max()
            .unwrap_or(0)
    }
}

impl StagingSink for MemorySink {
    fn create_table_if_not_exists(&mut self) -> Result<()> {
        self.table_created = true;
        Ok(())
    }

    fn append_rows(&mut self, chunk: &ValidatedChunk) -> Result<usize> {
        if !self.table_created {
            bail!("Staging table does not exist");
        }
        let chunk = chunk.chunk();
        self.batches.push(StagedBatch {
            fields: chunk.fields().to_vec(),
            rows: chunk.rows().to_vec(),
        });
        Ok(chunk.len())
    }

    fn begin_file(&mut self, _key: &str) -> Result<()> {
        self.file_start = Some(self.batches.len());
        Ok(())
    }

    fn commit_file(&mut self) -> Result<()> {
        self.file_start = None;
        Ok(())
    }

    fn rollback_file(&mut self) -> Result<()> {
        if let Some(start) = self.file_start.take() {
            self.batches.truncate(start);
        }
        Ok(())
    }
}
