//! Pipeline State - the typed record threaded through the three stages

use crate::error::{AnswerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel text for an execution step that had no query.
pub const NO_QUERY_SENTINEL: &str = "No query to execute";

/// A non-empty question. Constructing one is the caller-side guard: the pipeline
/// only ever sees validated questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question(String);

impl Question {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(AnswerError::EmptyQuestion);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the execution step produced, tagged by origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum ExecResult {
    /// Rendered rows from the database
    Rows(String),
    /// The database rejected or failed the query; carries the error description
    Failed(String),
    /// There was no query to run
    NoQuery,
}

impl ExecResult {
    pub fn failed(message: impl fmt::Display) -> Self {
        ExecResult::Failed(format!("Error executing query: {}", message))
    }

    /// Text handed to the answer prompt and to the caller.
    pub fn as_text(&self) -> &str {
        match self {
            ExecResult::Rows(text) | ExecResult::Failed(text) => text,
            ExecResult::NoQuery => NO_QUERY_SENTINEL,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ExecResult::Failed(_))
    }
}

/// Slot that accepts exactly one write, absent values included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOnce<T> {
    value: Option<T>,
    written: bool,
}

impl<T> Default for WriteOnce<T> {
    fn default() -> Self {
        Self {
            value: None,
            written: false,
        }
    }
}

impl<T> WriteOnce<T> {
    pub fn set(&mut self, field: &str, value: Option<T>) -> Result<()> {
        if self.written {
            return Err(AnswerError::StateViolation(format!(
                "'{}' has already been written",
                field
            )));
        }
        self.value = value;
        self.written = true;
        Ok(())
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_written(&self) -> bool {
        self.written
    }

    pub fn into_inner(self) -> Option<T> {
        self.value
    }
}

/// State for one request. Each stage writes exactly one field:
///
/// | stage          | reads                     | writes   |
/// |----------------|---------------------------|----------|
/// | WriteQuery     | question                  | query    |
/// | ExecuteQuery   | query                     | result   |
/// | GenerateAnswer | question, query, result   | answer   |
#[derive(Debug, Clone)]
pub struct PipelineState {
    question: Question,
    query: WriteOnce<String>,
    result: WriteOnce<ExecResult>,
    answer: WriteOnce<String>,
}

impl PipelineState {
    pub fn new(question: Question) -> Self {
        Self {
            question,
            query: WriteOnce::default(),
            result: WriteOnce::default(),
            answer: WriteOnce::default(),
        }
    }

    pub fn question(&self) -> &Question {
        &self.question
    }

    pub fn query(&self) -> Option<&str> {
        self.query.get().map(String::as_str)
    }

    pub fn result(&self) -> Option<&ExecResult> {
        self.result.get()
    }

    pub fn answer(&self) -> Option<&str> {
        self.answer.get().map(String::as_str)
    }

    pub fn set_query(&mut self, query: Option<String>) -> Result<()> {
        self.query.set("query", query)
    }

    pub fn set_result(&mut self, result: Option<ExecResult>) -> Result<()> {
        if !self.query.is_written() {
            return Err(AnswerError::StateViolation(
                "'result' written before 'query'".to_string(),
            ));
        }
        self.result.set("result", result)
    }

    pub fn set_answer(&mut self, answer: Option<String>) -> Result<()> {
        if !self.result.is_written() {
            return Err(AnswerError::StateViolation(
                "'answer' written before 'result'".to_string(),
            ));
        }
        self.answer.set("answer", answer)
    }

    pub fn is_complete(&self) -> bool {
        self.query.is_written() && self.result.is_written() && self.answer.is_written()
    }

    pub fn into_output(self) -> PipelineOutput {
        PipelineOutput {
            query: self.query.into_inner(),
            result: self.result.into_inner().map(|r| r.as_text().to_string()),
            answer: self.answer.into_inner(),
        }
    }
}

/// The caller-facing triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub query: Option<String>,
    pub result: Option<String>,
    pub answer: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_rejects_blank() {
        assert!(matches!(Question::new(""), Err(AnswerError::EmptyQuestion)));
        assert!(matches!(Question::new("   \n"), Err(AnswerError::EmptyQuestion)));
        assert_eq!(Question::new("  How many? ").unwrap().as_str(), "How many?");
    }

    #[test]
    fn test_fields_are_write_once() {
        let mut state = PipelineState::new(Question::new("q").unwrap());
        state.set_query(None).unwrap();
        let err = state.set_query(Some("SELECT 1".to_string())).unwrap_err();
        assert!(matches!(err, AnswerError::StateViolation(_)));
        assert_eq!(state.query(), None);
    }

    #[test]
    fn test_fields_must_be_written_in_order() {
        let mut state = PipelineState::new(Question::new("q").unwrap());
        assert!(state.set_answer(Some("a".to_string())).is_err());
        assert!(state.set_result(Some(ExecResult::NoQuery)).is_err());

        state.set_query(Some("SELECT 1".to_string())).unwrap();
        state.set_result(Some(ExecResult::Rows("1".to_string()))).unwrap();
        state.set_answer(Some("one".to_string())).unwrap();
        assert!(state.is_complete());

        let output = state.into_output();
        assert_eq!(output.query.as_deref(), Some("SELECT 1"));
        assert_eq!(output.result.as_deref(), Some("1"));
        assert_eq!(output.answer.as_deref(), Some("one"));
    }

    #[test]
    fn test_exec_result_text() {
        assert_eq!(ExecResult::NoQuery.as_text(), NO_QUERY_SENTINEL);
        let failed = ExecResult::failed("connection refused");
        assert_eq!(failed.as_text(), "Error executing query: connection refused");
        assert!(failed.is_failure());
    }
}
