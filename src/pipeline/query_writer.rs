//! Query Writer - question + schema → one SQL statement

use crate::error::{AnswerError, Result};
use crate::llm::LanguageModel;
use crate::pipeline::state::Question;
use crate::prompts;
use crate::schema::SchemaInfo;
use sqlparser::ast::{visit_relations, Statement};
use sqlparser::dialect::{dialect_from_str, Dialect, GenericDialect};
use sqlparser::parser::Parser;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{info, warn};

pub struct QueryWriter {
    llm: Arc<dyn LanguageModel>,
}

impl QueryWriter {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Ask the model for a query. `Err` is the failure marker; an empty query is never
    /// returned as success.
    pub async fn write(&self, question: &Question, schema: &SchemaInfo) -> Result<String> {
        let prompt = prompts::query_prompt(question.as_str(), schema);
        let output = self
            .llm
            .invoke_structured(&prompt, &prompts::query_output_schema())
            .await?;

        let raw = output
            .get("query")
            .and_then(|q| q.as_str())
            .ok_or_else(|| AnswerError::MalformedOutput("Missing 'query' in model output".to_string()))?;

        let query = clean_query(raw);
        if query.is_empty() {
            return Err(AnswerError::MalformedOutput("Model returned an empty query".to_string()));
        }

        check_single_statement(&query, &schema.dialect)?;
        info!("📝 Generated query: {}", query);
        Ok(query)
    }
}

/// Strip markdown fences, a leading `SQLQuery:` label and surrounding whitespace.
pub fn clean_query(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("sql").unwrap_or(rest);
        text = rest.strip_suffix("```").unwrap_or(rest).trim();
    }
    if let Some(rest) = text.strip_prefix("SQLQuery:") {
        text = rest.trim();
    }
    text.to_string()
}

fn parser_dialect(dialect: &str) -> Box<dyn Dialect> {
    let name = match dialect.to_lowercase().as_str() {
        "postgresql" | "postgres" => "postgresql".to_string(),
        other => other.to_string(),
    };
    dialect_from_str(name).unwrap_or_else(|| Box::new(GenericDialect {}))
}

fn parse(sql: &str, dialect: &str) -> std::result::Result<Vec<Statement>, sqlparser::parser::ParserError> {
    let dialect = parser_dialect(dialect);
    Parser::parse_sql(dialect.as_ref(), sql)
}

/// Reject multi-statement output. A query the parser cannot read is let through with a
/// warning; the database decides.
fn check_single_statement(sql: &str, dialect: &str) -> Result<()> {
    match parse(sql, dialect) {
        Ok(statements) if statements.len() > 1 => Err(AnswerError::MalformedOutput(format!(
            "Expected one SQL statement, got {}",
            statements.len()
        ))),
        Ok(statements) if statements.is_empty() => {
            Err(AnswerError::MalformedOutput("Model returned no SQL statement".to_string()))
        }
        Ok(_) => Ok(()),
        Err(e) => {
            warn!("Generated query did not parse as {}: {}", dialect, e);
            Ok(())
        }
    }
}

/// Tables a query reads from, lowercased and deduplicated in order of appearance.
pub fn referenced_tables(sql: &str, dialect: &str) -> Result<Vec<String>> {
    let statements = parse(sql, dialect)
        .map_err(|e| AnswerError::MalformedOutput(format!("Failed to parse query: {}", e)))?;

    let mut tables = Vec::new();
    let _ = visit_relations(&statements, |relation| {
        let name = relation.to_string().trim_matches('"').to_lowercase();
        if !tables.contains(&name) {
            tables.push(name);
        }
        ControlFlow::<()>::Continue(())
    });
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_query_strips_fences_and_labels() {
        assert_eq!(clean_query("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(clean_query("SQLQuery: SELECT 1"), "SELECT 1");
        assert_eq!(clean_query("  SELECT 1  "), "SELECT 1");
        assert_eq!(clean_query("```\n```"), "");
    }

    #[test]
    fn test_check_single_statement() {
        assert!(check_single_statement("SELECT COUNT(*) FROM customers", "sqlite").is_ok());
        let err = check_single_statement("SELECT 1; DROP TABLE customers", "sqlite").unwrap_err();
        assert!(matches!(err, AnswerError::MalformedOutput(_)));
    }

    #[test]
    fn test_unparseable_query_is_let_through() {
        assert!(check_single_statement("SELEKT what even", "sqlite").is_ok());
    }

    #[test]
    fn test_referenced_tables() {
        let tables = referenced_tables(
            "SELECT c.name, COUNT(o.id) FROM customers c JOIN orders o ON o.customer_id = c.id GROUP BY c.name",
            "postgresql",
        )
        .unwrap();
        assert_eq!(tables, vec!["customers".to_string(), "orders".to_string()]);
    }
}
