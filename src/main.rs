mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pidtune_backend::export::{HistoryTable, SessionReport};
use pidtune_backend::tuning::LoopSettings;
use pidtune_backend::{
    AdvisoryEndpoint, Aggressiveness, ClosedLoopSimulator, LlmClient, TunerConfig,
    TuningMode, TuningOrchestrator, TuningSession,
};

/// Tune a simulated PID loop with an LLM proposing the gains.
#[derive(Debug, Parser)]
#[command(name = "pidtune", version)]
struct Args {
    /// Config file (default: pidtune.toml next to the executable)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Advisory model; names starting with "gpt" use the OpenAI API
    #[arg(long)]
    model: Option<String>,

    /// speedup, reduce_overshoot or balanced
    #[arg(long)]
    mode: Option<TuningMode>,

    /// aggressive, moderate or fine
    #[arg(long)]
    aggressiveness: Option<Aggressiveness>,

    /// Percentage change versus the baseline that stops the run
    #[arg(long, allow_hyphen_values = true)]
    goal: Option<f64>,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Pause between iterations in milliseconds
    #[arg(long)]
    pause_ms: Option<u64>,

    /// CSV file for the iteration history
    #[arg(long)]
    output: Option<String>,

    /// Optional JSON report with history and transcript
    #[arg(long)]
    report: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut TunerConfig) {
        if let Some(model) = &self.model {
            config.llm_model = model.clone();
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(level) = self.aggressiveness {
            config.aggressiveness = level;
        }
        if let Some(goal) = self.goal {
            config.goal = goal;
        }
        if let Some(max) = self.max_iterations {
            config.max_iterations = max;
        }
        if let Some(pause) = self.pause_ms {
            config.iteration_pause_ms = pause;
        }
        if let Some(output) = &self.output {
            config.output_csv = output.clone();
        }
        if let Some(report) = &self.report {
            config.report_json = Some(report.clone());
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let dotenv = dotenvy::dotenv();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,pidtune=debug,pidtune_backend=debug"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded environment from {:?}", path);
    }

    let mut config = match &args.config {
        Some(path) => TunerConfig::load_from(path)?,
        None => TunerConfig::load(),
    };
    args.apply(&mut config);

    let endpoint = AdvisoryEndpoint::resolve(&config)?;
    let advisor = LlmClient::from_endpoint(&endpoint, &config.llm_model, config.advisory_timeout())
        .context("failed to build advisory client")?
        .with_sampling(config.temperature, config.max_tokens);
    tracing::info!("Advisory model: {} ({})", advisor.model(), endpoint.api_url);

    let simulator = ClosedLoopSimulator::from_plant_config(&config.plant, config.time_base)
        .context("invalid plant description")?;
    let orchestrator =
        TuningOrchestrator::new(simulator, Arc::new(advisor), LoopSettings::from_config(&config));
    let mut session = TuningSession::from_config(&config);

    let rt = tokio::runtime::Runtime::new().context("failed to start tuning runtime")?;
    let summary = rt.block_on(orchestrator.run(&mut session));

    print!("{}", report::render(&session.history, &summary));

    HistoryTable::from_history(&session.history).write_csv(Path::new(&config.output_csv))?;
    if let Some(path) = &config.report_json {
        SessionReport::new(&session, &summary).write_json(Path::new(path))?;
    }

    Ok(())
}
