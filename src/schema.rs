use crate::db::SqlDatabase;
use crate::error::{AnswerError, Result};
use serde::{Deserialize, Serialize};

/// Read-only schema metadata handed to the query writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    /// SQL dialect name, e.g. "sqlite" or "postgresql"
    pub dialect: String,

    /// Table/column description (DDL plus sample rows)
    pub table_info: String,

    /// Row-limit hint for generated queries
    pub top_k: usize,
}

impl SchemaInfo {
    /// Snapshot the schema from a database collaborator.
    pub async fn from_database(db: &dyn SqlDatabase, top_k: usize) -> Result<Self> {
        let table_info = db.table_info().await?;
        if table_info.trim().is_empty() {
            return Err(AnswerError::Schema(
                "Database exposes no tables to query".to_string(),
            ));
        }
        Ok(Self {
            dialect: db.dialect().to_string(),
            table_info,
            top_k,
        })
    }
}
