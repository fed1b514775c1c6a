use crate::config::AppConfig;
use crate::error::{AnswerError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// A chat prompt: optional system instructions plus the user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn new(system: Option<String>, user: impl Into<String>) -> Self {
        Self {
            system,
            user: user.into(),
        }
    }

    pub fn user(user: impl Into<String>) -> Self {
        Self::new(None, user)
    }
}

/// Shape a structured completion must have. Only top-level string fields are checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    pub required: Vec<String>,
    pub json_schema: serde_json::Value,
}

impl OutputSchema {
    /// Object with the given required string fields.
    pub fn strings(name: &str, description: &str, fields: &[(&str, &str)]) -> Self {
        let mut properties = serde_json::Map::new();
        for (field, field_description) in fields {
            properties.insert(
                field.to_string(),
                serde_json::json!({"type": "string", "description": field_description}),
            );
        }
        let required: Vec<String> = fields.iter().map(|(f, _)| f.to_string()).collect();

        Self {
            name: name.to_string(),
            description: description.to_string(),
            json_schema: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false
            }),
            required,
        }
    }

    /// Check that `value` is an object carrying every required field as a string.
    pub fn validate(&self, value: &serde_json::Value) -> Result<()> {
        let object = value.as_object().ok_or_else(|| {
            AnswerError::MalformedOutput(format!("{} output is not a JSON object", self.name))
        })?;
        for field in &self.required {
            match object.get(field) {
                Some(serde_json::Value::String(_)) => {}
                Some(other) => {
                    return Err(AnswerError::MalformedOutput(format!(
                        "Field '{}' should be a string, got {}",
                        field, other
                    )))
                }
                None => {
                    return Err(AnswerError::MalformedOutput(format!(
                        "Missing required field '{}'",
                        field
                    )))
                }
            }
        }
        Ok(())
    }
}

/// The language-model capability the pipeline depends on.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-text completion.
    async fn invoke(&self, prompt: &Prompt) -> Result<String>;

    /// Completion coerced into an object matching `schema`.
    ///
    /// Transport failures are `AnswerError::Llm`; replies that do not parse or do not
    /// match the schema are `AnswerError::MalformedOutput`.
    async fn invoke_structured(
        &self,
        prompt: &Prompt,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value>;
}

/// Pull a JSON object out of a reply that may wrap it in prose or markdown fences.
pub fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();
    // A reply that is already valid JSON is returned whole; fences may sit inside its strings
    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return trimmed;
    }
    if let Some(start) = trimmed.find("```json") {
        let after_start = &trimmed[start + 7..];
        if let Some(end) = after_start.find("```") {
            return after_start[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after_start = &trimmed[start + 3..];
        if let Some(end) = after_start.find("```") {
            return after_start[..end].trim();
        }
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Parse a raw structured reply and check it against `schema`.
pub fn parse_structured(raw: &str, schema: &OutputSchema) -> Result<serde_json::Value> {
    let json_str = extract_json_from_response(raw);
    let value: serde_json::Value = serde_json::from_str(json_str).map_err(|e| {
        AnswerError::MalformedOutput(format!("Failed to parse {} output: {}", schema.name, e))
    })?;
    schema.validate(&value)?;
    Ok(value)
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature: 0.0,
            max_tokens: 1000,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnswerError::Llm(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            temperature: config.temperature,
            ..Self::new(
                config.api_key.clone(),
                config.model.clone(),
                config.base_url.clone(),
            )
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &Prompt) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &prompt.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt.user}));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });

        // Newer OpenAI models reject max_tokens
        if self.model.starts_with("gpt-4") || self.model.starts_with("gpt-5") || self.model.contains("o1") {
            body["max_completion_tokens"] = serde_json::json!(self.max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(self.max_tokens);
        }
        body
    }

    async fn complete(&self, body: serde_json::Value) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AnswerError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AnswerError::Llm(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AnswerError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        extract_content(&response_json)
    }
}

/// Read `choices[0].message.content` out of a completion response.
fn extract_content(response_json: &serde_json::Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(AnswerError::Llm(format!("LLM API error: {}", error)));
    }

    let choice = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| AnswerError::Llm("No choices in LLM response".to_string()))?;

    match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("length") => warn!("LLM response was truncated due to length limit"),
        Some("content_filter") => {
            return Err(AnswerError::Llm(
                "LLM response was filtered by content policy".to_string(),
            ))
        }
        _ => {}
    }

    if let Some(refusal) = choice["message"].get("refusal").and_then(|r| r.as_str()) {
        return Err(AnswerError::Llm(format!("Model refused: {}", refusal)));
    }

    let content = choice["message"]["content"]
        .as_str()
        .ok_or_else(|| AnswerError::Llm("No content in LLM response".to_string()))?;

    Ok(content.to_string())
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn invoke(&self, prompt: &Prompt) -> Result<String> {
        debug!(model = %self.model, "Calling LLM");
        self.complete(self.request_body(prompt)).await
    }

    async fn invoke_structured(
        &self,
        prompt: &Prompt,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value> {
        debug!(model = %self.model, schema = %schema.name, "Calling LLM in structured mode");
        let mut body = self.request_body(prompt);
        body["response_format"] = serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "description": schema.description,
                "schema": schema.json_schema,
                "strict": true
            }
        });

        let raw = self.complete(body).await?;
        parse_structured(&raw, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_schema() -> OutputSchema {
        OutputSchema::strings("QueryOutput", "Generated SQL query.", &[("query", "SQL")])
    }

    #[test]
    fn test_extract_json_from_fenced_block() {
        let response = "Here's the JSON:\n```json\n{\"query\": \"SELECT 1\"}\n```";
        assert_eq!(extract_json_from_response(response), "{\"query\": \"SELECT 1\"}");
    }

    #[test]
    fn test_extract_json_from_prose() {
        let response = "Sure! {\"query\": \"SELECT 1\"} hope that helps";
        assert_eq!(extract_json_from_response(response), "{\"query\": \"SELECT 1\"}");
    }

    #[test]
    fn test_parse_structured_accepts_valid_object() {
        let value = parse_structured(r#"{"query": "SELECT COUNT(*) FROM customers"}"#, &query_schema()).unwrap();
        assert_eq!(value["query"], "SELECT COUNT(*) FROM customers");
    }

    #[test]
    fn test_parse_structured_keeps_fences_inside_strings() {
        let raw = "{\"query\": \"```sql\\nSELECT COUNT(*) FROM customers\\n```\"}";
        let value = parse_structured(raw, &query_schema()).unwrap();
        assert_eq!(value["query"], "```sql\nSELECT COUNT(*) FROM customers\n```");
    }

    #[test]
    fn test_parse_structured_rejects_prose() {
        let err = parse_structured("SELECT * FROM customers", &query_schema()).unwrap_err();
        assert!(matches!(err, AnswerError::MalformedOutput(_)));
    }

    #[test]
    fn test_parse_structured_rejects_missing_field() {
        let err = parse_structured(r#"{"sql": "SELECT 1"}"#, &query_schema()).unwrap_err();
        assert!(matches!(err, AnswerError::MalformedOutput(msg) if msg.contains("query")));
    }

    #[test]
    fn test_parse_structured_rejects_non_string_field() {
        let err = parse_structured(r#"{"query": 42}"#, &query_schema()).unwrap_err();
        assert!(matches!(err, AnswerError::MalformedOutput(_)));
    }

    #[test]
    fn test_schema_shape() {
        let schema = query_schema();
        assert_eq!(schema.required, vec!["query".to_string()]);
        assert_eq!(schema.json_schema["properties"]["query"]["type"], "string");
        assert_eq!(schema.json_schema["additionalProperties"], false);
    }

    #[test]
    fn test_extract_content_reads_first_choice() {
        let response = serde_json::json!({
            "choices": [{"message": {"content": "There are 42 customers."}, "finish_reason": "stop"}]
        });
        assert_eq!(extract_content(&response).unwrap(), "There are 42 customers.");
    }

    #[test]
    fn test_extract_content_surfaces_api_error() {
        let response = serde_json::json!({"error": {"message": "invalid api key"}});
        let err = extract_content(&response).unwrap_err();
        assert!(matches!(err, AnswerError::Llm(msg) if msg.contains("invalid api key")));
    }

    #[test]
    fn test_request_body_includes_system_message() {
        let client = LlmClient::new("k".to_string(), "gpt-4o-mini".to_string(), "http://x/v1/".to_string());
        let body = client.request_body(&Prompt::new(Some("sys".to_string()), "hi"));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["temperature"], 0.0);
        assert!(body.get("max_completion_tokens").is_some());
        assert_eq!(client.base_url, "http://x/v1");
    }
}
