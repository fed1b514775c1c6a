//! Pipeline Runner
//!
//! Drives one question through `Start → WriteQuery → ExecuteQuery → GenerateAnswer → Done`.
//! Every step runs exactly once. A failing stage is reported to the observer and leaves
//! its field absent; the next stage's own guard handles the absence.

use crate::config::AppConfig;
use crate::db::{self, SqlDatabase};
use crate::error::{AnswerError, Result};
use crate::llm::{LanguageModel, LlmClient};
use crate::pipeline::answer_composer::AnswerComposer;
use crate::pipeline::observer::{PipelineObserver, PipelineStep, StepReport, TracingObserver};
use crate::pipeline::query_executor::QueryExecutor;
use crate::pipeline::query_writer::QueryWriter;
use crate::pipeline::state::{ExecResult, PipelineOutput, PipelineState, Question};
use crate::schema::SchemaInfo;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub struct Pipeline {
    db: Arc<dyn SqlDatabase>,
    writer: QueryWriter,
    executor: QueryExecutor,
    composer: AnswerComposer,
    top_k: usize,
}

impl Pipeline {
    pub fn new(llm: Arc<dyn LanguageModel>, db: Arc<dyn SqlDatabase>, top_k: usize) -> Self {
        Self {
            writer: QueryWriter::new(Arc::clone(&llm)),
            executor: QueryExecutor::new(Arc::clone(&db)),
            composer: AnswerComposer::new(llm),
            db,
            top_k,
        }
    }

    /// Validate the configuration, build the model client and open the database.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let llm: Arc<dyn LanguageModel> = Arc::new(LlmClient::from_config(config)?);
        let db = db::connect_from_config(config).await?;
        info!(
            model = %config.model,
            dialect = db.dialect(),
            top_k = config.top_k,
            "Pipeline ready"
        );
        Ok(Self::new(llm, db, config.top_k))
    }

    pub fn dialect(&self) -> &str {
        self.db.dialect()
    }

    pub async fn schema(&self) -> Result<SchemaInfo> {
        SchemaInfo::from_database(self.db.as_ref(), self.top_k).await
    }

    /// Run with step logging through `tracing`.
    pub async fn run(&self, question: &Question) -> PipelineOutput {
        self.run_with_observer(question, &TracingObserver).await
    }

    pub async fn run_with_observer(
        &self,
        question: &Question,
        observer: &dyn PipelineObserver,
    ) -> PipelineOutput {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", %run_id);

        async {
            info!("❓ Question: {}", question);
            let mut state = PipelineState::new(question.clone());
            let mut step = PipelineStep::Start;

            loop {
                step = step.next();
                if step == PipelineStep::Done {
                    break;
                }

                observer.on_step_started(run_id, step);
                let started = Instant::now();
                let output = self.advance(step, &mut state, run_id, observer).await;
                observer.on_step_finished(run_id, &StepReport::new(step, output, started.elapsed()));
            }

            debug_assert!(state.is_complete());
            state.into_output()
        }
        .instrument(span)
        .await
    }

    /// Run one stage, write its field, and return what it wrote for display.
    async fn advance(
        &self,
        step: PipelineStep,
        state: &mut PipelineState,
        run_id: Uuid,
        observer: &dyn PipelineObserver,
    ) -> Option<String> {
        let written = match step {
            PipelineStep::WriteQuery => {
                let query = match self.write_query(state.question()).await {
                    Ok(query) => Some(query),
                    Err(e) => {
                        observer.on_stage_failed(run_id, step, &e);
                        None
                    }
                };
                state.set_query(query.clone()).map(|_| query)
            }
            PipelineStep::ExecuteQuery => {
                let result = self.executor.execute(state.query()).await;
                if let ExecResult::Failed(message) = &result {
                    observer.on_stage_failed(run_id, step, &AnswerError::Database(message.clone()));
                }
                let text = result.as_text().to_string();
                state.set_result(Some(result)).map(|_| Some(text))
            }
            PipelineStep::GenerateAnswer => {
                let answer = match self
                    .composer
                    .compose(state.question(), state.query(), state.result())
                    .await
                {
                    Ok(answer) => Some(answer),
                    Err(e) => {
                        observer.on_stage_failed(run_id, step, &e);
                        None
                    }
                };
                state.set_answer(answer.clone()).map(|_| answer)
            }
            PipelineStep::Start | PipelineStep::Done => Ok(None),
        };

        written.unwrap_or_else(|e| {
            observer.on_stage_failed(run_id, step, &e);
            None
        })
    }

    async fn write_query(&self, question: &Question) -> Result<String> {
        let schema = self.schema().await?;
        self.writer.write(question, &schema).await
    }
}
