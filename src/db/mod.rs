//! Database collaborators
//!
//! The pipeline only sees the [`SqlDatabase`] trait. Concrete adapters are chosen from
//! the connection string once at startup.

pub mod postgres;
pub mod result;
pub mod sqlite;

use crate::config::{mask_url, AppConfig, ResultFormat};
use crate::error::{AnswerError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub use postgres::PostgresDatabase;
pub use result::QueryRows;
pub use sqlite::SqliteDatabase;

/// A single pre-configured database connection.
#[async_trait]
pub trait SqlDatabase: Send + Sync {
    /// Dialect name used in prompts and for SQL parsing, e.g. "sqlite".
    fn dialect(&self) -> &str;

    /// Description of the available tables and columns.
    async fn table_info(&self) -> Result<String>;

    /// Run a query and render its rows. Errors come back as `AnswerError::Database`.
    async fn run_query(&self, sql: &str) -> Result<String>;
}

/// Where a connection string points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    SqliteFile(PathBuf),
    SqliteMemory,
    Postgres(String),
}

impl DatabaseTarget {
    /// Parse `sqlite://path`, `sqlite:path`, `sqlite::memory:`, `postgres://...`,
    /// `postgresql://...` or a bare file path.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AnswerError::Config("Database URL is empty".to_string()));
        }

        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(DatabaseTarget::Postgres(url.to_string()));
        }

        if let Some(rest) = url.strip_prefix("sqlite:") {
            if rest == ":memory:" || rest == "//:memory:" {
                return Ok(DatabaseTarget::SqliteMemory);
            }
            // sqlite:///abs/path keeps the leading slash, sqlite://rel.db does not
            let path = rest.strip_prefix("//").unwrap_or(rest);
            if path.is_empty() {
                return Err(AnswerError::Config(format!("No path in database URL '{}'", url)));
            }
            return Ok(DatabaseTarget::SqliteFile(PathBuf::from(path)));
        }

        if let Some(scheme_end) = url.find("://") {
            return Err(AnswerError::Config(format!(
                "Unsupported database scheme '{}' in {}",
                &url[..scheme_end],
                mask_url(url)
            )));
        }

        Ok(DatabaseTarget::SqliteFile(PathBuf::from(url)))
    }
}

/// Open the database named by `url`.
pub async fn connect(
    url: &str,
    sample_rows: usize,
    format: ResultFormat,
) -> Result<Arc<dyn SqlDatabase>> {
    let target = DatabaseTarget::parse(url)?;
    info!("Connecting to database: {}", mask_url(url));

    let db: Arc<dyn SqlDatabase> = match target {
        DatabaseTarget::SqliteFile(path) => Arc::new(SqliteDatabase::open(&path, sample_rows, format)?),
        DatabaseTarget::SqliteMemory => Arc::new(SqliteDatabase::open_in_memory(sample_rows, format)?),
        DatabaseTarget::Postgres(url) => Arc::new(PostgresDatabase::connect(&url, sample_rows, format).await?),
    };
    Ok(db)
}

pub async fn connect_from_config(config: &AppConfig) -> Result<Arc<dyn SqlDatabase>> {
    connect(&config.database_url, config.sample_rows, config.result_format).await
}

/// Double-quote an identifier for interpolation into SQL.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// LangChain-style sample block appended after each table's DDL.
pub(crate) fn sample_rows_block(table: &str, rows: &QueryRows) -> String {
    let mut block = format!("\n/*\n{} rows from {} table:\n", rows.rows.len(), table);
    block.push_str(&rows.columns.join("\t"));
    block.push('\n');
    for row in &rows.rows {
        let cells: Vec<String> = row.iter().map(result::cell_text).collect();
        block.push_str(&cells.join("\t"));
        block.push('\n');
    }
    block.push_str("*/");
    block
}
