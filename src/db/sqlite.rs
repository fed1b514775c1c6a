//! SQLite adapter (rusqlite)
//!
//! One connection guarded by a mutex; queries run on the blocking pool so the async
//! pipeline is never stalled by disk I/O.

use crate::config::ResultFormat;
use crate::db::result::QueryRows;
use crate::db::{quote_identifier, sample_rows_block, SqlDatabase};
use crate::error::{AnswerError, Result};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
    sample_rows: usize,
    format: ResultFormat,
}

impl SqliteDatabase {
    /// Open an existing database file. A missing file is an error, not a new database.
    pub fn open(path: &Path, sample_rows: usize, format: ResultFormat) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| AnswerError::Database(format!("Failed to open {}: {}", path.display(), e)))?;
        info!("✅ Opened SQLite database {}", path.display());
        Ok(Self::from_connection(conn, sample_rows, format))
    }

    pub fn open_in_memory(sample_rows: usize, format: ResultFormat) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn, sample_rows, format))
    }

    pub fn from_connection(conn: Connection, sample_rows: usize, format: ResultFormat) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            sample_rows,
            format,
        }
    }

    /// Run a batch of statements, e.g. to seed a database.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AnswerError::Database("SQLite connection lock poisoned".to_string()))
    }

    /// Run `work` against the connection on the blocking pool.
    async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| AnswerError::Database("SQLite connection lock poisoned".to_string()))?;
            work(&*guard)
        })
        .await
        .map_err(|e| AnswerError::Database(format!("SQLite task failed: {}", e)))?
    }

    pub async fn fetch(&self, sql: &str) -> Result<QueryRows> {
        let sql = sql.to_string();
        self.with_connection(move |conn| fetch_rows(conn, &sql, None)).await
    }
}

fn fetch_rows(conn: &Connection, sql: &str, limit: Option<usize>) -> Result<QueryRows> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let column_count = columns.len();
    let mut result = QueryRows::new(columns);

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        if limit.is_some_and(|max| result.total_rows >= max) {
            break;
        }
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            values.push(value_to_json(row.get_ref(idx)?));
        }
        result.push(values);
    }
    Ok(result)
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(bytes) => serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => serde_json::Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

fn describe_tables(conn: &Connection, sample_rows: usize) -> Result<String> {
    let mut stmt = conn.prepare(
        "SELECT name, sql FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND sql IS NOT NULL \
         ORDER BY name",
    )?;
    let tables: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<_, _>>()?;

    let mut sections = Vec::with_capacity(tables.len());
    for (name, ddl) in tables {
        let mut section = ddl.trim().to_string();
        if sample_rows > 0 {
            let sample_sql = format!("SELECT * FROM {} LIMIT {}", quote_identifier(&name), sample_rows);
            let rows = fetch_rows(conn, &sample_sql, Some(sample_rows))?;
            section.push('\n');
            section.push_str(&sample_rows_block(&name, &rows));
        }
        sections.push(section);
    }
    Ok(sections.join("\n\n"))
}

#[async_trait]
impl SqlDatabase for SqliteDatabase {
    fn dialect(&self) -> &str {
        "sqlite"
    }

    async fn table_info(&self) -> Result<String> {
        let sample_rows = self.sample_rows;
        self.with_connection(move |conn| describe_tables(conn, sample_rows)).await
    }

    async fn run_query(&self, sql: &str) -> Result<String> {
        debug!("Running SQLite query: {}", sql);
        let rows = self.fetch(sql).await?;
        debug!("SQLite query returned {} rows", rows.total_rows);
        Ok(rows.render(self.format))
    }
}
