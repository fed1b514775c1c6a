use crate::db::SqlDatabase;
use crate::error::AnswerError;
use crate::pipeline::state::ExecResult;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs generated queries against the one database configured at startup.
pub struct QueryExecutor {
    db: Arc<dyn SqlDatabase>,
}

impl QueryExecutor {
    pub fn new(db: Arc<dyn SqlDatabase>) -> Self {
        Self { db }
    }

    /// Never fails: a missing query yields the sentinel without touching the database,
    /// and database errors are carried forward as `ExecResult::Failed`.
    pub async fn execute(&self, query: Option<&str>) -> ExecResult {
        let Some(query) = query else {
            info!("No query to execute, skipping database call");
            return ExecResult::NoQuery;
        };

        match self.db.run_query(query).await {
            Ok(rows) => {
                info!("✅ Query executed ({} bytes of results)", rows.len());
                ExecResult::Rows(rows)
            }
            Err(e) => {
                warn!("Query execution failed: {}", e);
                match e {
                    AnswerError::Database(message) => ExecResult::failed(message),
                    other => ExecResult::failed(other),
                }
            }
        }
    }
}
