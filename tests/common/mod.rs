//! Stub collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use sql_answer::db::SqlDatabase;
use sql_answer::llm::{LanguageModel, OutputSchema, Prompt};
use sql_answer::{AnswerError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// What the stub model answers in structured mode.
#[derive(Clone)]
pub enum StructuredReply {
    Object(serde_json::Value),
    TransportError(String),
    Raw(String),
}

/// Deterministic language model. Free-text answers echo the `SQL Result:` (or
/// `SQL Error:`) line of the prompt so tests can see what was grounded on.
pub struct StubModel {
    structured: StructuredReply,
    answer_error: Option<String>,
    pub structured_calls: AtomicUsize,
    pub text_calls: AtomicUsize,
    pub prompts: Mutex<Vec<Prompt>>,
}

impl StubModel {
    pub fn with_query(query: &str) -> Self {
        Self::with_reply(StructuredReply::Object(serde_json::json!({ "query": query })))
    }

    pub fn with_reply(structured: StructuredReply) -> Self {
        Self {
            structured,
            answer_error: None,
            structured_calls: AtomicUsize::new(0),
            text_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_answers(mut self, message: &str) -> Self {
        self.answer_error = Some(message.to_string());
        self
    }

    pub fn structured_calls(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    pub fn first_prompt(&self) -> Option<Prompt> {
        self.prompts.lock().unwrap().first().cloned()
    }
}

fn line_after<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    text.lines()
        .find_map(|line| line.strip_prefix(label))
        .map(str::trim)
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn invoke(&self, prompt: &Prompt) -> Result<String> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(message) = &self.answer_error {
            return Err(AnswerError::Llm(message.clone()));
        }
        if let Some(error) = line_after(&prompt.user, "SQL Error:") {
            return Ok(format!("I could not retrieve the data: {}", error));
        }
        let result = line_after(&prompt.user, "SQL Result:").unwrap_or("nothing");
        Ok(format!("The answer is {}.", result))
    }

    async fn invoke_structured(
        &self,
        prompt: &Prompt,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        match &self.structured {
            StructuredReply::Object(value) => {
                schema.validate(value)?;
                Ok(value.clone())
            }
            StructuredReply::TransportError(message) => Err(AnswerError::Llm(message.clone())),
            StructuredReply::Raw(raw) => sql_answer::llm::parse_structured(raw, schema),
        }
    }
}

/// Database stub with a fixed schema and a fixed reply to every query.
pub struct StubDatabase {
    table_info: String,
    reply: std::result::Result<String, String>,
    pub query_calls: AtomicUsize,
    pub queries: Mutex<Vec<String>>,
}

impl StubDatabase {
    pub fn customers(reply: std::result::Result<&str, &str>) -> Self {
        Self {
            table_info: "CREATE TABLE customers (\n\tid INTEGER PRIMARY KEY,\n\tname TEXT,\n\tcountry TEXT\n)".to_string(),
            reply: reply.map(str::to_string).map_err(str::to_string),
            query_calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlDatabase for StubDatabase {
    fn dialect(&self) -> &str {
        "sqlite"
    }

    async fn table_info(&self) -> Result<String> {
        Ok(self.table_info.clone())
    }

    async fn run_query(&self, sql: &str) -> Result<String> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(sql.to_string());
        self.reply.clone().map_err(AnswerError::Database)
    }
}
