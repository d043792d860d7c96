//! Closed-loop robotic pick CLI.
//!
//! `armloop run` drives plan → execute → judge → critique against the
//! built-in kinematic arm until the cube is lifted or the attempt budget is
//! spent. The other commands expose individual stages for inspection.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use armloop::core::classifier::classify;
use armloop::core::plan::parse_plan;
use armloop::core::types::{Evidence, Outcome};
use armloop::execute::execute_plan_traced;
use armloop::exit_codes;
use armloop::io::actuator::Actuator;
use armloop::io::config::{DEFAULT_CONFIG_PATH, LoopConfig, load_config, write_config};
use armloop::io::critic::LlmCritic;
use armloop::io::kinematic::KinematicArm;
use armloop::io::llm::HttpChatClient;
use armloop::io::planner::LlmPlanner;
use armloop::judge::Referee;
use armloop::logging;
use armloop::looping::{AttemptReport, AttemptResult, LoopStop, RetryController};

#[derive(Parser)]
#[command(
    name = "armloop",
    version,
    about = "Closed-loop plan, execute, judge and critique for a robotic pick"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file if missing.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Check a plan file against the plan schema.
    Validate {
        /// Plan JSON file.
        plan: PathBuf,
    },
    /// Classify referee evidence into an outcome.
    Classify {
        /// Cube height above the table (metres).
        #[arg(long)]
        height: f64,
        /// Contacts between the arm and the cube.
        #[arg(long)]
        contacts: u32,
    },
    /// Execute one plan file on the kinematic arm and judge it.
    Simulate {
        /// Plan JSON file.
        plan: PathBuf,
    },
    /// Run the closed loop for an instruction.
    Run {
        /// Natural-language task, e.g. "pick up the cube".
        #[arg(short, long)]
        instruction: String,
        /// Override the configured attempt budget.
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Write per-attempt artifacts under this directory.
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Validate { plan } => cmd_validate(&plan),
        Command::Classify { height, contacts } => cmd_classify(height, contacts),
        Command::Simulate { plan } => cmd_simulate(&cli.config, &plan),
        Command::Run {
            instruction,
            max_attempts,
            log_dir,
        } => cmd_run(&cli.config, &instruction, max_attempts, log_dir),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        println!("{} already exists", config_path.display());
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &LoopConfig::default())
        .with_context(|| format!("write {}", config_path.display()))?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(plan_path: &Path) -> Result<i32> {
    let raw = read_plan(plan_path)?;
    match parse_plan(&raw) {
        Ok(plan) => {
            println!("{}: valid ({} steps)", plan.plan_id, plan.steps.len());
            Ok(exit_codes::OK)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(exit_codes::INVALID)
        }
    }
}

fn cmd_classify(height: f64, contacts: u32) -> Result<i32> {
    if !height.is_finite() {
        bail!("height must be a finite number");
    }
    let outcome = classify(Evidence {
        cube_height: height,
        contact_count: contacts,
    });
    print_json(&outcome)?;
    Ok(exit_codes::OK)
}

fn cmd_simulate(config_path: &Path, plan_path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
    let plan = parse_plan(&read_plan(plan_path)?)
        .with_context(|| format!("invalid plan {}", plan_path.display()))?;

    let mut arm = KinematicArm::new();
    arm.reset().context("reset arm")?;
    let referee = Referee::new(config.target_object.clone());
    let (trace, execution) = execute_plan_traced(&mut arm, &plan, &config.executor);
    let outcome = match execution {
        Ok(()) => referee.judge(&arm).context("judge plan")?,
        Err(err) if err.is_fatal() => return Err(anyhow::Error::new(err).context("execute plan")),
        Err(err) => {
            eprintln!(
                "execution aborted after {} of {} steps: {err}",
                trace.steps.len(),
                plan.steps.len()
            );
            referee.judge_aborted(&arm).context("judge plan")?
        }
    };
    print_json(&outcome)?;
    Ok(verdict_code(&outcome))
}

fn cmd_run(
    config_path: &Path,
    instruction: &str,
    max_attempts: Option<u32>,
    log_dir: Option<PathBuf>,
) -> Result<i32> {
    let mut config = load_config(config_path)?;
    if let Some(max_attempts) = max_attempts {
        config.max_attempts = max_attempts;
    }
    if log_dir.is_some() {
        config.log.dir = log_dir;
    }
    config.validate().context("invalid options")?;

    let client = HttpChatClient::from_config(&config.llm)?;
    let planner = LlmPlanner::new(
        client.clone(),
        config.executor.safe_height_m,
        config.llm.planner_temperature,
    );
    let critic = LlmCritic::new(client);
    let mut controller = RetryController::new(KinematicArm::new(), planner, critic, &config);

    let outcome = controller.run(instruction, print_attempt)?;
    match outcome.stop {
        LoopStop::Success { attempts } => {
            println!("SUCCESS: cube lifted on attempt {attempts} ({})", outcome.run_id);
            Ok(exit_codes::OK)
        }
        LoopStop::Exhausted {
            attempts,
            last_critique,
        } => {
            println!("FAILED: no success after {attempts} attempts ({})", outcome.run_id);
            if let Some(critique) = last_critique {
                println!("last diagnosis: {}", critique.diagnosis);
                println!("last suggestion: {}", critique.suggestion);
            }
            Ok(exit_codes::EXHAUSTED)
        }
    }
}

fn print_attempt(report: &AttemptReport) {
    let plan_id = report.plan_id.as_deref().unwrap_or("-");
    match &report.result {
        AttemptResult::PlanRejected(err) => {
            println!(
                "attempt {}/{}: no usable plan: {err}",
                report.attempt, report.max_attempts
            );
        }
        AttemptResult::Judged(outcome) => {
            println!(
                "attempt {}/{} [{plan_id}]: {} (height {:.3} m, contacts {})",
                report.attempt,
                report.max_attempts,
                outcome.failure_reason,
                outcome.metrics.final_height,
                outcome.metrics.contacts
            );
        }
        AttemptResult::Aborted { outcome, error } => {
            println!(
                "attempt {}/{} [{plan_id}]: {} ({error})",
                report.attempt, report.max_attempts, outcome.failure_reason
            );
        }
    }
    if let Some(critique) = &report.critique {
        println!("  diagnosis: {}", critique.diagnosis);
        println!("  suggestion: {}", critique.suggestion);
    }
}

fn verdict_code(outcome: &Outcome) -> i32 {
    if outcome.success {
        exit_codes::OK
    } else {
        exit_codes::EXHAUSTED
    }
}

fn read_plan(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
