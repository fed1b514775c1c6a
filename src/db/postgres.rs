//! PostgreSQL adapter (sqlx)
//!
//! Generated queries are arbitrary, so they go through the simple query protocol and
//! every value comes back as text. Numeric and boolean columns are converted back into
//! JSON numbers/booleans by their type name.

use crate::config::ResultFormat;
use crate::db::result::QueryRows;
use crate::db::{quote_identifier, sample_rows_block, SqlDatabase};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Executor, Row, Statement, TypeInfo};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

pub struct PostgresDatabase {
    pool: PgPool,
    sample_rows: usize,
    format: ResultFormat,
}

impl PostgresDatabase {
    pub async fn connect(database_url: &str, sample_rows: usize, format: ResultFormat) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        // Test the connection
        sqlx::query("SELECT 1").execute(&pool).await?;
        info!("✅ Connected to PostgreSQL");

        Ok(Self::from_pool(pool, sample_rows, format))
    }

    pub fn from_pool(pool: PgPool, sample_rows: usize, format: ResultFormat) -> Self {
        Self {
            pool,
            sample_rows,
            format,
        }
    }

    pub async fn fetch(&self, sql: &str) -> Result<QueryRows> {
        let rows: Vec<PgRow> = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;

        let columns = match rows.first() {
            Some(row) => column_names(row.columns()),
            None => self.describe_columns(sql).await,
        };
        let mut result = QueryRows::new(columns);

        for row in &rows {
            let mut values = Vec::with_capacity(row.len());
            for column in row.columns() {
                let text: Option<String> = row.try_get_unchecked(column.ordinal())?;
                values.push(text_to_json(text, column.type_info().name()));
            }
            result.push(values);
        }
        Ok(result)
    }

    /// Column names for a query that returned no rows, from its prepared statement.
    async fn describe_columns(&self, sql: &str) -> Vec<String> {
        match (&self.pool).prepare(sql).await {
            Ok(statement) => column_names(statement.columns()),
            Err(e) => {
                debug!("Could not describe result columns: {}", e);
                Vec::new()
            }
        }
    }

    async fn describe_tables(&self) -> Result<String> {
        let columns = sqlx::query_as::<_, (String, String, String, String)>(
            "SELECT table_name::text, column_name::text, data_type::text, is_nullable::text \
             FROM information_schema.columns \
             WHERE table_schema = 'public' \
             ORDER BY table_name, ordinal_position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tables: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (table, column, data_type, nullable) in columns {
            let not_null = if nullable == "NO" { " NOT NULL" } else { "" };
            tables
                .entry(table)
                .or_default()
                .push(format!("\t{} {}{}", quote_identifier(&column), data_type.to_uppercase(), not_null));
        }

        let mut sections = Vec::with_capacity(tables.len());
        for (table, column_defs) in tables {
            let mut section = format!("CREATE TABLE {} (\n{}\n)", quote_identifier(&table), column_defs.join(",\n"));
            if self.sample_rows > 0 {
                let sample_sql = format!("SELECT * FROM {} LIMIT {}", quote_identifier(&table), self.sample_rows);
                let rows = self.fetch(&sample_sql).await?;
                section.push('\n');
                section.push_str(&sample_rows_block(&table, &rows));
            }
            sections.push(section);
        }
        Ok(sections.join("\n\n"))
    }
}

fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

/// Parse a NUMERIC only when `f64` holds it exactly, so large decimals keep every digit.
fn exact_decimal(text: &str) -> Option<serde_json::Number> {
    let value = text.parse::<f64>().ok()?;
    let normalized = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    };
    if value.to_string() != normalized {
        return None;
    }
    serde_json::Number::from_f64(value)
}

/// Convert a text-format value back into JSON using the column's type name.
fn text_to_json(text: Option<String>, type_name: &str) -> serde_json::Value {
    let Some(text) = text else {
        return serde_json::Value::Null;
    };
    match type_name {
        "INT2" | "INT4" | "INT8" | "OID" => text
            .parse::<i64>()
            .map(|i| serde_json::Value::Number(i.into()))
            .unwrap_or(serde_json::Value::String(text)),
        "FLOAT4" | "FLOAT8" => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::String(text)),
        "NUMERIC" => exact_decimal(&text)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::String(text)),
        "BOOL" if matches!(text.as_str(), "t" | "true") => serde_json::Value::Bool(true),
        "BOOL" if matches!(text.as_str(), "f" | "false") => serde_json::Value::Bool(false),
        "JSON" | "JSONB" => serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)),
        _ => serde_json::Value::String(text),
    }
}

#[async_trait]
impl SqlDatabase for PostgresDatabase {
    fn dialect(&self) -> &str {
        "postgresql"
    }

    async fn table_info(&self) -> Result<String> {
        self.describe_tables().await
    }

    async fn run_query(&self, sql: &str) -> Result<String> {
        debug!("Running PostgreSQL query: {}", sql);
        let rows = self.fetch(sql).await?;
        debug!("PostgreSQL query returned {} rows", rows.total_rows);
        Ok(rows.render(self.format))
    }
}
