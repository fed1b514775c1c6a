pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod render;
pub mod schema;

pub use config::{AppConfig, ResultFormat};
pub use error::{AnswerError, Result};
pub use pipeline::{Pipeline, PipelineOutput, Question};
