use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sql_answer::pipeline::{
    FanOut, Pipeline, PipelineObserver, PipelineStep, Question, StepReport, TracingObserver,
};
use sql_answer::render::format_output;
use sql_answer::{AnswerError, AppConfig, ResultFormat};
use std::io::{BufRead, IsTerminal, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "sql-answer")]
#[command(about = "Ask questions about a SQL database in natural language")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Settings {
    /// Database connection string (or set DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// LLM API key (or set OPENAI_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Model name (or set OPENAI_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Base URL of an OpenAI-compatible API (or set OPENAI_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Default row limit for generated queries
    #[arg(long, global = true)]
    top_k: Option<usize>,

    /// How query results are rendered
    #[arg(long, global = true, value_enum)]
    result_format: Option<ResultFormat>,

    /// Print the output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a single question
    Ask {
        /// The question in natural language
        question: String,
    },
    /// Read questions from stdin, one per line
    Repl,
    /// Print the schema description the model sees
    Schema,
}

/// Streams step progress to stderr while a question is being answered.
struct ConsoleObserver;

impl PipelineObserver for ConsoleObserver {
    fn on_step_started(&self, _run_id: Uuid, step: PipelineStep) {
        eprintln!("⏳ {}...", step);
    }

    fn on_step_finished(&self, _run_id: Uuid, report: &StepReport) {
        eprintln!("✅ {} ({} ms)", report.step, report.elapsed_ms);
    }

    fn on_stage_failed(&self, _run_id: Uuid, step: PipelineStep, error: &AnswerError) {
        eprintln!("❌ {} [{}]: {}", step, step.failure_kind(), error);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.settings.verbose);

    let config = load_config(&cli.settings)?;
    info!(?config, "Configuration loaded");
    let pipeline = Pipeline::from_config(&config)
        .await
        .context("Failed to initialise pipeline")?;

    match cli.command {
        Command::Ask { question } => {
            let question = Question::new(question)?;
            answer(&pipeline, &question, cli.settings.json).await?;
        }
        Command::Repl => repl(&pipeline, cli.settings.json).await?,
        Command::Schema => {
            let schema = pipeline.schema().await?;
            println!("Dialect: {}\n\n{}", schema.dialect, schema.table_info);
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(settings: &Settings) -> Result<AppConfig> {
    let mut config = AppConfig::from_env()?;

    if let Some(url) = &settings.database_url {
        config.database_url = url.clone();
    }
    if let Some(key) = &settings.api_key {
        config.api_key = key.clone();
    }
    if let Some(model) = &settings.model {
        config.model = model.clone();
    }
    if let Some(base_url) = &settings.base_url {
        config.base_url = base_url.trim_end_matches('/').to_string();
    }
    if let Some(top_k) = settings.top_k {
        config.top_k = top_k;
    }
    if let Some(format) = settings.result_format {
        config.result_format = format;
    }

    if !config.missing_secrets().is_empty() && std::io::stdin().is_terminal() {
        prompt_for_secrets(&mut config)?;
    }

    config.validate()?;
    Ok(config)
}

/// Ask for whichever secrets are still missing.
fn prompt_for_secrets(config: &mut AppConfig) -> Result<()> {
    for name in config.missing_secrets() {
        let value = read_line(&format!("Enter {}: ", name))?;
        match name {
            "OPENAI_API_KEY" => config.api_key = value,
            "DATABASE_URL" => config.database_url = value,
            _ => {}
        }
    }
    Ok(())
}

fn read_line(prompt: &str) -> Result<String> {
    eprint!("{}", prompt);
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn answer(pipeline: &Pipeline, question: &Question, json: bool) -> Result<()> {
    let observers: Vec<&dyn PipelineObserver> = vec![&ConsoleObserver, &TracingObserver];
    let output = pipeline.run_with_observer(question, &FanOut(observers)).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", format_output(&output));
    }
    Ok(())
}

async fn repl(pipeline: &Pipeline, json: bool) -> Result<()> {
    let interactive = std::io::stdin().is_terminal();
    loop {
        let line = if interactive {
            read_line("\nQuestion (empty line or 'exit' to quit): ")?
        } else {
            let mut line = String::new();
            if std::io::stdin().lock().read_line(&mut line)? == 0 {
                break;
            }
            line.trim().to_string()
        };

        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }
        // Blank input never reaches the pipeline
        let question = match Question::new(line) {
            Ok(question) => question,
            Err(_) if interactive => break,
            Err(_) => continue,
        };
        answer(pipeline, &question, json).await?;
    }
    Ok(())
}
