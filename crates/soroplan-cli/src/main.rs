//! CLI for soroplan.
//!
//! Drives session plans through their lifecycle against a local JSON state
//! file, reports mastery and session outcomes, and runs the seeded
//! multi-mode simulation. Results go to stdout, mostly as JSON; diagnostics
//! go to stderr via `tracing`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use soroplan_bkt::{BlameMethod, SkillEvidence};
use soroplan_core::{
    clamp_p_known, Attempt, AttemptHistory, HelpLevel, HelpTrigger, ProblemGenerationMode,
    SkillBktParams, SkillId, SlotResult, SystemClock,
};
use soroplan_feedback::simulation::{self, SeededGenerator, SimulationConfig};
use soroplan_feedback::SessionAnalyzer;
use soroplan_scheduler::{
    InMemoryStore, PlanRequest, PlannerConfig, SessionContext, SessionService, StaticProgress,
    StoreSnapshot,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the state file
    #[arg(long, global = true, default_value = "data/soroplan.state.json")]
    state: PathBuf,

    /// Planner configuration (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Skill priors (JSON map of skill id to BKT parameters)
    #[arg(long, global = true, env = "SOROPLAN_PRIORS")]
    priors: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the skills a player is currently practicing
    Practice {
        player: String,
        #[arg(required = true)]
        skills: Vec<SkillId>,
    },
    /// Import attempts from a JSONL file into a player's history
    Import {
        player: String,
        #[arg(long)]
        path: PathBuf,
    },
    /// Generate a draft session plan
    Plan {
        player: String,
        /// Session length in minutes
        #[arg(long, default_value = "10")]
        minutes: u32,
        /// classic, adaptive or adaptive-bkt
        #[arg(long, default_value = "adaptive-bkt")]
        mode: ProblemGenerationMode,
        /// Seed for reproducible plans
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Approve a draft plan
    Approve { plan_id: String },
    /// Start an approved plan, generating one problem per slot
    Start {
        plan_id: String,
        /// Seed of the problem generator
        #[arg(long, default_value = "0")]
        seed: u64,
    },
    /// Record the answer to one slot of an active plan
    #[command(disable_help_flag = true)]
    Record {
        plan_id: String,
        #[arg(long)]
        slot: usize,
        #[arg(long)]
        answer: i64,
        #[arg(long, default_value = "0")]
        response_ms: u64,
        /// Help level used (0-3)
        #[arg(long, default_value = "0")]
        help: u8,
        #[arg(long, default_value = "0")]
        incorrect_attempts: u32,
    },
    /// Complete an active plan whose duration has run out
    Expire { plan_id: String },
    /// Print a stored plan
    Show { plan_id: String },
    /// Outcome summary of a plan
    Summary { plan_id: String },
    /// Mastery estimates of a player from the stored history
    Mastery {
        player: String,
        /// Include the blame decisions of the replay
        #[arg(long)]
        trace: bool,
    },
    /// Split the blame of one failed attempt across its skills
    Blame {
        /// Exercised skill and its current estimate, as `skill=p_known`
        #[arg(long = "skill", required = true, value_parser = parse_skill_estimate)]
        skills: Vec<(SkillId, f64)>,
        #[arg(long, value_enum, default_value = "bayesian")]
        method: MethodArg,
    },
    /// Compare the three modes on a seeded simulated learner
    Simulate {
        /// Simulation setup (JSON); defaults apply when omitted
        #[arg(long)]
        setup: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        sessions: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Heuristic,
    Bayesian,
}

impl From<MethodArg> for BlameMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Heuristic => BlameMethod::Heuristic,
            MethodArg::Bayesian => BlameMethod::Bayesian,
        }
    }
}

/// Skill ids may contain `=` themselves, so the estimate is split off the end.
fn parse_skill_estimate(raw: &str) -> std::result::Result<(SkillId, f64), String> {
    let (skill, p) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected skill=p_known, got '{raw}'"))?;
    if skill.is_empty() {
        return Err(format!("missing skill id in '{raw}'"));
    }
    let p: f64 = p
        .parse()
        .map_err(|e| format!("invalid p_known in '{raw}': {e}"))?;
    if !(0.0..=1.0).contains(&p) {
        return Err(format!("p_known must be within 0..=1, got {p}"));
    }
    Ok((skill.to_string(), p))
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct CliState {
    #[serde(default)]
    practicing: StaticProgress,
    #[serde(flatten)]
    store: StoreSnapshot,
    #[serde(default, with = "time::serde::iso8601::option")]
    last_saved: Option<OffsetDateTime>,
}

impl CliState {
    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = File::open(path)?;
        let state = serde_json::from_reader(BufReader::new(file))?;
        Ok(state)
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.last_saved = Some(OffsetDateTime::now_utc());
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

fn load_priors(path: Option<&Path>) -> Result<HashMap<SkillId, SkillBktParams>> {
    let Some(path) = path else {
        return Ok(HashMap::new());
    };
    let file = File::open(path).with_context(|| format!("Failed to open priors {path:?}"))?;
    let priors: HashMap<SkillId, SkillBktParams> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse priors {path:?}"))?;
    for (skill, params) in &priors {
        params
            .validate()
            .with_context(|| format!("Invalid priors for skill '{skill}'"))?;
    }
    Ok(priors)
}

fn load_config(path: Option<&Path>) -> Result<PlannerConfig> {
    let Some(path) = path else {
        return Ok(PlannerConfig::default());
    };
    let file = File::open(path).with_context(|| format!("Failed to open config {path:?}"))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse config {path:?}"))
}

fn read_attempts(path: &Path) -> Result<Vec<Attempt>> {
    let f = File::open(path).context("Failed to open input file")?;
    let mut attempts = Vec::new();
    for (idx, line) in BufReader::new(f).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let attempt: Attempt = serde_json::from_str(&line)
            .with_context(|| format!("Invalid attempt on line {}", idx + 1))?;
        attempts.push(attempt);
    }
    Ok(attempts)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("soroplan=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;

    // Commands that never touch the state file.
    match &cli.command {
        Commands::Blame { skills, method } => {
            let priors = load_priors(cli.priors.as_deref())?;
            let evidence: Vec<SkillEvidence> = skills
                .iter()
                .map(|(skill_id, p)| SkillEvidence {
                    skill_id: skill_id.clone(),
                    p_known: clamp_p_known(*p),
                    params: priors.get(skill_id).copied().unwrap_or_default(),
                })
                .collect();
            let results = config
                .estimator()
                .attributor
                .attribute(&evidence, (*method).into());
            return print_json(&results);
        }
        Commands::Simulate {
            setup,
            seed,
            sessions,
        } => {
            let mut sim: SimulationConfig = match setup {
                Some(path) => {
                    let file = File::open(path)
                        .with_context(|| format!("Failed to open simulation setup {path:?}"))?;
                    serde_json::from_reader(BufReader::new(file))
                        .with_context(|| format!("Failed to parse simulation setup {path:?}"))?
                }
                None => SimulationConfig {
                    planner: config.clone(),
                    ..SimulationConfig::default()
                },
            };
            if let Some(seed) = seed {
                sim.seed = *seed;
            }
            if let Some(sessions) = sessions {
                sim.sessions = *sessions;
            }
            let report = simulation::run(&sim).context("Simulation failed")?;
            return print_json(&report);
        }
        _ => {}
    }

    let priors = load_priors(cli.priors.as_deref())?;
    let service = SessionService::with_config(config.clone()).context("Invalid planner config")?;
    let mut state = CliState::load(&cli.state)
        .with_context(|| format!("Failed to read state {:?}", cli.state))?;
    let initial = std::mem::take(&mut state.store);
    let store = InMemoryStore::from_snapshot(initial.clone());
    let clock = SystemClock;

    let outcome = {
        let ctx = SessionContext {
            plans: &store,
            history: &store,
            priors: &priors,
            progress: &state.practicing,
            clock: &clock,
        };
        run_stateful(cli.command, &service, &ctx, &store, &config)
    };

    // A failed command may still have committed (a timed-out plan is
    // completed before the error surfaces), so persist whatever changed.
    let snapshot = store.snapshot();
    let mut dirty = snapshot != initial;
    if let Ok(Some((player, skills))) = &outcome {
        tracing::info!(%player, count = skills.len(), "practicing skills updated");
        state.practicing.set(player.clone(), skills.clone());
        dirty = true;
    }
    if dirty {
        state.store = snapshot;
        state
            .save(&cli.state)
            .with_context(|| format!("Failed to save state {:?}", cli.state))?;
    }
    outcome.map(|_| ())
}

/// Runs a command against the store; returns a practicing-skills update
/// for the caller to apply.
fn run_stateful(
    command: Commands,
    service: &SessionService,
    ctx: &SessionContext<'_>,
    store: &InMemoryStore,
    config: &PlannerConfig,
) -> Result<Option<(String, Vec<SkillId>)>> {
    match command {
        Commands::Practice { player, skills } => {
            print_json(&skills)?;
            Ok(Some((player, skills)))
        }
        Commands::Import { player, path } => {
            let attempts = read_attempts(&path)?;
            let count = attempts.len();
            for attempt in attempts {
                store.append_attempt(&player, attempt);
            }
            println!("Imported {count} attempts for {player}.");
            Ok(None)
        }
        Commands::Plan {
            player,
            minutes,
            mode,
            seed,
        } => {
            let request = PlanRequest {
                player_id: player,
                duration_minutes: minutes,
                mode,
            };
            let plan = match seed {
                Some(seed) => service.generate_session_plan(
                    ctx,
                    &request,
                    &mut ChaCha8Rng::seed_from_u64(seed),
                ),
                None => service.generate_session_plan(ctx, &request, &mut rand::thread_rng()),
            }?;
            print_json(&plan)?;
            Ok(None)
        }
        Commands::Approve { plan_id } => {
            print_json(&service.approve_session_plan(ctx, &plan_id)?)?;
            Ok(None)
        }
        Commands::Start { plan_id, seed } => {
            let mut generator = SeededGenerator::new(seed);
            print_json(&service.start_session_plan(ctx, &mut generator, &plan_id)?)?;
            Ok(None)
        }
        Commands::Record {
            plan_id,
            slot,
            answer,
            response_ms,
            help,
            incorrect_attempts,
        } => {
            let plan = service
                .get_session_plan(ctx, &plan_id)?
                .with_context(|| format!("Plan {plan_id} not found"))?;
            let problem = plan
                .slot(slot)
                .and_then(|s| s.problem.clone())
                .with_context(|| format!("Slot {slot} of plan {plan_id} has no problem yet"))?;
            let help_level_used = HelpLevel::try_from(help).map_err(anyhow::Error::msg)?;
            let result = SlotResult {
                slot_index: slot,
                is_correct: answer == problem.answer,
                problem,
                student_answer: answer,
                response_time_ms: response_ms,
                skills_exercised: Vec::new(),
                help_level_used,
                incorrect_attempts,
                help_trigger: if help_level_used == HelpLevel::None {
                    HelpTrigger::None
                } else {
                    HelpTrigger::Manual
                },
            };
            service.record_slot_result(ctx, &plan_id, result)?;
            print_json(&service.get_session_plan(ctx, &plan_id)?)?;
            Ok(None)
        }
        Commands::Expire { plan_id } => {
            print_json(&service.expire_overdue(ctx, &plan_id)?)?;
            Ok(None)
        }
        Commands::Show { plan_id } => {
            let plan = service
                .get_session_plan(ctx, &plan_id)?
                .with_context(|| format!("Plan {plan_id} not found"))?;
            print_json(&plan)?;
            Ok(None)
        }
        Commands::Summary { plan_id } => {
            let plan = service
                .get_session_plan(ctx, &plan_id)?
                .with_context(|| format!("Plan {plan_id} not found"))?;
            print_json(&SessionAnalyzer::default().summarize_plan(&plan))?;
            Ok(None)
        }
        Commands::Mastery { player, trace } => {
            let attempts = store.recent_attempts(&player, config.history_window)?;
            let practicing = ctx.progress.practicing_skills(&player)?;
            let replay = config
                .estimator()
                .estimate_with_trace(&attempts, ctx.priors, &practicing);
            if trace {
                print_json(&replay)?;
            } else {
                print_json(&replay.masteries)?;
            }
            Ok(None)
        }
        Commands::Blame { .. } | Commands::Simulate { .. } => Ok(None),
    }
}
