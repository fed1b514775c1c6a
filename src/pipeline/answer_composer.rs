use crate::error::{AnswerError, Result};
use crate::llm::LanguageModel;
use crate::pipeline::state::{ExecResult, Question};
use crate::prompts::{self, NO_ANSWER_MESSAGE};
use std::sync::Arc;
use tracing::{debug, info};

/// Turns the question, query and execution result into a natural-language answer.
pub struct AnswerComposer {
    llm: Arc<dyn LanguageModel>,
}

impl AnswerComposer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Without a result (or with the no-query sentinel) the fixed
    /// [`NO_ANSWER_MESSAGE`] is returned and the model is not called.
    pub async fn compose(
        &self,
        question: &Question,
        query: Option<&str>,
        result: Option<&ExecResult>,
    ) -> Result<String> {
        let result = match result {
            None | Some(ExecResult::NoQuery) => {
                debug!("Nothing to summarise, returning fixed message");
                return Ok(NO_ANSWER_MESSAGE.to_string());
            }
            Some(result) => result,
        };

        let prompt = prompts::answer_prompt(
            question.as_str(),
            query,
            result.as_text(),
            result.is_failure(),
        );
        let answer = self.llm.invoke(&prompt).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(AnswerError::MalformedOutput("Model returned an empty answer".to_string()));
        }

        info!("💬 Answer composed");
        Ok(answer.to_string())
    }
}
