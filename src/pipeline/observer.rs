//! Step notifications for callers that display progress or collect stage errors.

use crate::error::AnswerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// States of the pipeline, in their only order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Start,
    WriteQuery,
    ExecuteQuery,
    GenerateAnswer,
    Done,
}

impl PipelineStep {
    pub fn next(self) -> PipelineStep {
        match self {
            PipelineStep::Start => PipelineStep::WriteQuery,
            PipelineStep::WriteQuery => PipelineStep::ExecuteQuery,
            PipelineStep::ExecuteQuery => PipelineStep::GenerateAnswer,
            PipelineStep::GenerateAnswer | PipelineStep::Done => PipelineStep::Done,
        }
    }

    /// Failure category reported when this step's stage fails.
    pub fn failure_kind(self) -> &'static str {
        match self {
            PipelineStep::WriteQuery => "GenerationFailure",
            PipelineStep::ExecuteQuery => "ExecutionFailure",
            PipelineStep::GenerateAnswer => "CompositionFailure",
            PipelineStep::Start | PipelineStep::Done => "PipelineFailure",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStep::Start => "start",
            PipelineStep::WriteQuery => "write_query",
            PipelineStep::ExecuteQuery => "execute_query",
            PipelineStep::GenerateAnswer => "generate_answer",
            PipelineStep::Done => "done",
        };
        f.write_str(name)
    }
}

/// What a finished step wrote, for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: PipelineStep,
    pub output: Option<String>,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl StepReport {
    pub fn new(step: PipelineStep, output: Option<String>, elapsed: Duration) -> Self {
        Self {
            step,
            output,
            elapsed_ms: elapsed.as_millis() as u64,
            finished_at: Utc::now(),
        }
    }
}

/// A stage error surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub step: PipelineStep,
    pub kind: String,
    pub message: String,
}

/// Receives step events while a pipeline run progresses. All methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    fn on_step_started(&self, _run_id: Uuid, _step: PipelineStep) {}

    fn on_step_finished(&self, _run_id: Uuid, _report: &StepReport) {}

    fn on_stage_failed(&self, _run_id: Uuid, _step: PipelineStep, _error: &AnswerError) {}
}

/// Discards everything.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Logs each step through `tracing`.
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_step_started(&self, run_id: Uuid, step: PipelineStep) {
        info!(%run_id, %step, "▶️  Step started");
    }

    fn on_step_finished(&self, run_id: Uuid, report: &StepReport) {
        info!(
            %run_id,
            step = %report.step,
            elapsed_ms = report.elapsed_ms,
            produced = report.output.is_some(),
            "Step finished"
        );
    }

    fn on_stage_failed(&self, run_id: Uuid, step: PipelineStep, error: &AnswerError) {
        warn!(%run_id, %step, kind = step.failure_kind(), "Stage failed: {}", error);
    }
}

/// Keeps stage failures so a caller can return them alongside the output.
#[derive(Default)]
pub struct CollectingObserver {
    failures: Mutex<Vec<StageFailure>>,
    reports: Mutex<Vec<StepReport>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<StageFailure> {
        self.failures.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn reports(&self) -> Vec<StepReport> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl PipelineObserver for CollectingObserver {
    fn on_step_finished(&self, _run_id: Uuid, report: &StepReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
    }

    fn on_stage_failed(&self, _run_id: Uuid, step: PipelineStep, error: &AnswerError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(StageFailure {
                step,
                kind: step.failure_kind().to_string(),
                message: error.to_string(),
            });
        }
    }
}

/// Forwards every event to each wrapped observer in turn.
pub struct FanOut<'a>(pub Vec<&'a dyn PipelineObserver>);

impl PipelineObserver for FanOut<'_> {
    fn on_step_started(&self, run_id: Uuid, step: PipelineStep) {
        for observer in &self.0 {
            observer.on_step_started(run_id, step);
        }
    }

    fn on_step_finished(&self, run_id: Uuid, report: &StepReport) {
        for observer in &self.0 {
            observer.on_step_finished(run_id, report);
        }
    }

    fn on_stage_failed(&self, run_id: Uuid, step: PipelineStep, error: &AnswerError) {
        for observer in &self.0 {
            observer.on_stage_failed(run_id, step, error);
        }
    }
}
