//! `assay` — replay a recorded session transcript through the pipeline.
//!
//! Reads a JSONL transcript of telemetry events, candidate turns, and state
//! transitions, drives a session through the full pipeline, and prints the
//! final verdict as JSON. Generation is echoed (no external model), so a
//! replay is fully deterministic.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tracing::info;

use assay_core::config::EngineConfig;
use assay_core::generate::EchoGenerator;
use assay_core::profiles::ProfileCatalog;
use assay_core::session::{ProblemRef, RoundVerdict, SessionManager, SessionState};
use assay_core::store::MemoryStore;
use assay_core::telemetry::TelemetryEvent;
use assay_core::timers::TimerRegistry;
use assay_core::types::{Category, InterviewMode};

#[derive(Parser)]
#[command(name = "assay", about = "Behavioral assessment session replay")]
struct Cli {
    /// Optional TOML config file (ASSAY_* env vars override it).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a JSONL transcript and print the verdict.
    Replay {
        /// Transcript file, one JSON record per line.
        file: PathBuf,

        #[arg(long, default_value = "candidate")]
        user: String,

        /// Hiring company; unknown names use the default profile.
        #[arg(long, default_value = "default")]
        company: String,

        #[arg(long, value_enum, default_value_t = ModeArg::Standard)]
        mode: ModeArg,

        #[arg(long, value_enum, default_value_t = CategoryArg::General)]
        category: CategoryArg,
    },
    /// List the built-in company profiles.
    Profiles,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Standard,
    Behavioral,
    ExpertSprint,
    Marathon,
}

impl From<ModeArg> for InterviewMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Standard => Self::Standard,
            ModeArg::Behavioral => Self::Behavioral,
            ModeArg::ExpertSprint => Self::ExpertSprint,
            ModeArg::Marathon => Self::Marathon,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CategoryArg {
    Behavioral,
    Mern,
    Javascript,
    Node,
    Systems,
    General,
}

impl From<CategoryArg> for Category {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Behavioral => Self::Behavioral,
            CategoryArg::Mern => Self::Mern,
            CategoryArg::Javascript => Self::JavaScript,
            CategoryArg::Node => Self::Node,
            CategoryArg::Systems => Self::Systems,
            CategoryArg::General => Self::General,
        }
    }
}

/// One transcript line.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplayRecord {
    /// Raw telemetry event, fed to the analyzer.
    Event {
        #[serde(flatten)]
        event: TelemetryEvent,
    },
    /// A candidate turn, run through the full decision pipeline.
    Turn { at_ms: f64, text: String },
    /// Session state transition.
    Transition { state: SessionState },
    /// Round result recorded by the interviewer.
    Round {
        verdict: RoundVerdict,
        scorecard: Vec<f64>,
        #[serde(default)]
        summary: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::from_env(),
    };

    match cli.command {
        Command::Replay {
            file,
            user,
            company,
            mode,
            category,
        } => replay(config, &file, &user, &company, mode.into(), category.into()).await,
        Command::Profiles => {
            let catalog = load_catalog(&config)?;
            let mut profiles: Vec<_> = catalog.profiles().collect();
            profiles.sort_by(|a, b| a.name.cmp(&b.name));
            for profile in profiles {
                println!("{} ({:?})", profile.name, profile.context);
            }
            Ok(())
        }
    }
}

fn load_catalog(config: &EngineConfig) -> Result<ProfileCatalog> {
    match &config.profile_catalog {
        Some(path) => ProfileCatalog::with_catalog_file(std::path::Path::new(path)),
        None => Ok(ProfileCatalog::builtin()),
    }
}

async fn replay(
    config: EngineConfig,
    file: &PathBuf,
    user: &str,
    company: &str,
    mode: InterviewMode,
    category: Category,
) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read transcript {}", file.display()))?;

    let catalog = load_catalog(&config)?;

    let problems = (1..=config.total_rounds)
        .map(|i| ProblemRef {
            id: format!("replay-{i}"),
            category,
            difficulty: 1,
        })
        .collect();

    let mut manager = SessionManager::new(
        config,
        Arc::new(catalog),
        Arc::new(MemoryStore::new()),
        Arc::new(EchoGenerator),
        Arc::new(TimerRegistry::new()),
        user,
        company,
        mode,
        problems,
    );

    for (line_no, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: ReplayRecord = serde_json::from_str(line)
            .with_context(|| format!("Malformed record at line {}", line_no + 1))?;
        match record {
            ReplayRecord::Event { event } => {
                let outcome = manager.ingest_event(event);
                if let Some(action) = outcome.pressure {
                    info!(reason = %action.reason, level = ?action.level, "Pressure action");
                }
            }
            ReplayRecord::Turn { at_ms, text } => {
                let outcome = manager.handle_turn(&text, at_ms).await;
                info!(
                    loss = outcome.decision.loss_score,
                    probe = %outcome.decision.probe.probe_type,
                    reply = %outcome.reply,
                    "Turn"
                );
            }
            ReplayRecord::Transition { state } => {
                manager.transition(state).await?;
            }
            ReplayRecord::Round {
                verdict,
                scorecard,
                summary,
            } => {
                manager.complete_round(verdict, scorecard, &summary).await?;
            }
        }
    }

    if manager.session().state != SessionState::Verdict {
        bail!(
            "Transcript ended in {} — a replay must reach VERDICT to produce a result",
            manager.session().state
        );
    }

    let verdict = manager.finalize().await?;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}
