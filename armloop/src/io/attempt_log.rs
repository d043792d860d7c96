//! Per-attempt artifacts under `<log dir>/<run_id>/<attempt>/`.
//!
//! Written for traceability only; nothing reads them back.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use crate::core::history::Critique;
use crate::core::plan::ManipulationPlan;
use crate::core::types::{FailureReason, Outcome};
use crate::execute::ExecutionTrace;

/// How an attempt ended, as recorded in `meta.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Failed,
    Aborted,
    PlanRejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptMeta {
    pub run_id: String,
    pub attempt: u32,
    pub status: AttemptStatus,
    pub plan_id: Option<String>,
    pub failure_reason: Option<FailureReason>,
    pub error: Option<String>,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub raw_plan_path: PathBuf,
    pub plan_path: PathBuf,
    pub trace_path: PathBuf,
    pub outcome_path: PathBuf,
    pub critique_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(root: &Path, run_id: &str, attempt: u32) -> Self {
        let dir = root.join(run_id).join(attempt.to_string());
        Self {
            dir: dir.clone(),
            meta_path: dir.join("meta.json"),
            raw_plan_path: dir.join("plan.raw.txt"),
            plan_path: dir.join("plan.json"),
            trace_path: dir.join("trace.json"),
            outcome_path: dir.join("outcome.json"),
            critique_path: dir.join("critique.json"),
        }
    }
}

pub struct AttemptWriteRequest<'a> {
    pub meta: &'a AttemptMeta,
    pub raw_plan: Option<&'a str>,
    pub plan: Option<&'a ManipulationPlan>,
    pub trace: Option<&'a ExecutionTrace>,
    pub outcome: Option<&'a Outcome>,
    pub critique: Option<&'a Critique>,
}

/// Writer rooted at the configured log directory.
#[derive(Debug, Clone)]
pub struct AttemptLog {
    root: PathBuf,
}

impl AttemptLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Reserve a fresh `<root>/<run_id>` directory derived from `base`.
    ///
    /// `base` is used as-is when free, otherwise `-2`, `-3`, ... are appended.
    /// Directory creation is the claim, so concurrent runs never share one.
    pub fn claim_run_id(&self, base: &str) -> Result<String> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create log dir {}", self.root.display()))?;
        for suffix in 1..=999u32 {
            let id = if suffix == 1 {
                base.to_string()
            } else {
                format!("{base}-{suffix}")
            };
            let dir = self.root.join(&id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok(id),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("create run dir {}", dir.display()));
                }
            }
        }
        Err(anyhow!(
            "unable to claim unique run id from base '{base}' (too many existing runs)"
        ))
    }

    pub fn write(&self, request: &AttemptWriteRequest<'_>) -> Result<AttemptPaths> {
        let paths = AttemptPaths::new(&self.root, &request.meta.run_id, request.meta.attempt);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;

        // Write in deterministic order to keep logs stable.
        write_json(&paths.meta_path, request.meta)?;
        if let Some(raw) = request.raw_plan {
            write_text(&paths.raw_plan_path, raw)?;
        }
        if let Some(plan) = request.plan {
            write_json(&paths.plan_path, plan)?;
        }
        if let Some(trace) = request.trace {
            write_json(&paths.trace_path, trace)?;
        }
        if let Some(outcome) = request.outcome {
            write_json(&paths.outcome_path, outcome)?;
        }
        if let Some(critique) = request.critique {
            write_json(&paths.critique_path, critique)?;
        }

        Ok(paths)
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
