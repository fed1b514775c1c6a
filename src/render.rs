//! Display helpers shared by the CLI and the HTTP server.

use crate::pipeline::PipelineOutput;
use serde::Serialize;

/// A result string classified for display: structured rows or plain text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DisplayResult {
    Json(serde_json::Value),
    Text(String),
}

impl DisplayResult {
    pub fn classify(result: &str) -> Self {
        let trimmed = result.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(result) {
                return DisplayResult::Json(value);
            }
        }
        DisplayResult::Text(result.to_string())
    }

    pub fn pretty(&self) -> String {
        match self {
            DisplayResult::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            DisplayResult::Text(text) => text.clone(),
        }
    }
}

/// Human-readable rendering of the output triple.
pub fn format_output(output: &PipelineOutput) -> String {
    let query = output.query.as_deref().unwrap_or("(no query generated)");
    let result = output
        .result
        .as_deref()
        .map(|r| DisplayResult::classify(r).pretty())
        .unwrap_or_else(|| "(no result)".to_string());
    let answer = output.answer.as_deref().unwrap_or("(no answer)");

    format!(
        "=== Query ===\n{}\n\n=== Result ===\n{}\n\n=== Answer ===\n{}",
        query, result, answer
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_json_rows() {
        let result = DisplayResult::classify(r#"{"columns":["n"],"rows":[{"n":42}]}"#);
        assert!(matches!(result, DisplayResult::Json(_)));
        assert!(result.pretty().contains("\"n\": 42"));
    }

    #[test]
    fn test_classify_plain_text() {
        assert_eq!(DisplayResult::classify("42"), DisplayResult::Text("42".to_string()));
        assert_eq!(
            DisplayResult::classify("{not json"),
            DisplayResult::Text("{not json".to_string())
        );
    }

    #[test]
    fn test_format_output_marks_absent_fields() {
        let output = PipelineOutput {
            query: None,
            result: Some("No query to execute".to_string()),
            answer: None,
        };
        let text = format_output(&output);
        assert!(text.contains("(no query generated)"));
        assert!(text.contains("No query to execute"));
        assert!(text.contains("(no answer)"));
    }
}
