use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnswerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Question must not be empty")]
    EmptyQuestion,

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Pipeline state error: {0}")]
    StateViolation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for AnswerError {
    fn from(err: rusqlite::Error) -> Self {
        AnswerError::Database(err.to_string())
    }
}

impl From<sqlx::Error> for AnswerError {
    fn from(err: sqlx::Error) -> Self {
        AnswerError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnswerError>;
