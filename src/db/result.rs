//! Query Result - row sets returned by the database adapters and their rendering

use crate::config::ResultFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Rows beyond this are dropped before rendering so results fit in a prompt.
pub const MAX_RENDERED_ROWS: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,

    /// Values in column order
    pub rows: Vec<Vec<serde_json::Value>>,

    /// Rows the query produced, including any not kept in `rows`
    pub total_rows: usize,
}

impl QueryRows {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            total_rows: 0,
        }
    }

    /// Append a row, counting but not storing rows past `MAX_RENDERED_ROWS`.
    pub fn push(&mut self, row: Vec<serde_json::Value>) {
        self.total_rows += 1;
        if self.rows.len() < MAX_RENDERED_ROWS {
            self.rows.push(row);
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.total_rows > self.rows.len()
    }

    pub fn render(&self, format: ResultFormat) -> String {
        match format {
            ResultFormat::Json => self.to_json().to_string(),
            ResultFormat::Text => self.to_text(),
        }
    }

    /// `{"columns": [...], "rows": [{col: value}, ...]}`. Repeated column names get a
    /// numeric suffix (`Name`, `Name_2`) so no value is overwritten.
    pub fn to_json(&self) -> serde_json::Value {
        let keys = unique_keys(&self.columns);
        let rows: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = keys
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();

        let mut json = serde_json::json!({
            "columns": keys,
            "rows": rows,
        });
        if self.is_truncated() {
            json["truncated"] = serde_json::json!(true);
            json["total_rows"] = serde_json::json!(self.total_rows);
        }
        json
    }

    pub fn to_text(&self) -> String {
        let mut lines = vec![self.columns.join(" | ")];
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(cell_text).collect();
            lines.push(cells.join(" | "));
        }
        if self.rows.is_empty() {
            lines.push("(no rows)".to_string());
        } else if self.is_truncated() {
            lines.push(format!("... {} more rows", self.total_rows - self.rows.len()));
        }
        lines.join("\n")
    }
}

fn unique_keys(columns: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(columns.len());
    let mut keys = Vec::with_capacity(columns.len());
    for column in columns {
        let mut key = column.clone();
        let mut n = 2;
        while seen.contains(&key) {
            key = format!("{}_{}", column, n);
            n += 1;
        }
        seen.insert(key.clone());
        keys.push(key);
    }
    keys
}

/// Plain rendering of one cell: strings unquoted, NULL spelled out.
pub fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
