//! Retry controller: reset → plan → execute → judge → critique, bounded by an attempt budget.
//!
//! Every attempt-level failure (planner transport errors, invalid plans,
//! aborted execution, critic failures) consumes one attempt and the loop moves
//! on. Only a broken simulator or an unwritable attempt log ends `run` with an
//! error.

use std::fmt;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::history::{Critique, CritiqueHistory};
use crate::core::plan::{ManipulationPlan, PlanError, parse_plan};
use crate::core::types::Outcome;
use crate::execute::{ExecutionError, ExecutionTrace, execute_plan_traced};
use crate::io::actuator::Actuator;
use crate::io::attempt_log::{AttemptLog, AttemptMeta, AttemptStatus, AttemptWriteRequest};
use crate::io::config::{ExecutorConfig, LoopConfig};
use crate::io::critic::{CritiqueRequest, CritiqueService};
use crate::io::llm::ServiceError;
use crate::io::planner::PlanningService;
use crate::judge::Referee;

/// Controller state. Transitions are logged at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    Planning,
    Executing,
    Judging,
    Critiquing,
    Success,
    Terminated,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoopState::Init => "init",
            LoopState::Planning => "planning",
            LoopState::Executing => "executing",
            LoopState::Judging => "judging",
            LoopState::Critiquing => "critiquing",
            LoopState::Success => "success",
            LoopState::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// Recoverable failure of a single attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttemptError {
    #[error("planning service failed: {0}")]
    Service(#[from] ServiceError),
    #[error("plan rejected: {0}")]
    Validation(#[from] PlanError),
    #[error("execution aborted: {0}")]
    Execution(#[from] ExecutionError),
}

/// What happened in one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptResult {
    /// No usable plan was obtained; nothing was executed or critiqued.
    PlanRejected(AttemptError),
    /// The plan ran to completion and was judged.
    Judged(Outcome),
    /// Execution stopped early; reported as `MISSED_GRASP`.
    Aborted {
        outcome: Outcome,
        error: AttemptError,
    },
}

impl AttemptResult {
    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            AttemptResult::PlanRejected(_) => None,
            AttemptResult::Judged(outcome) | AttemptResult::Aborted { outcome, .. } => {
                Some(outcome)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptResult::Judged(outcome) if outcome.success)
    }

    pub fn error(&self) -> Option<&AttemptError> {
        match self {
            AttemptResult::PlanRejected(error) | AttemptResult::Aborted { error, .. } => {
                Some(error)
            }
            AttemptResult::Judged(_) => None,
        }
    }

    fn status(&self) -> AttemptStatus {
        match self {
            AttemptResult::PlanRejected(_) => AttemptStatus::PlanRejected,
            AttemptResult::Judged(outcome) if outcome.success => AttemptStatus::Success,
            AttemptResult::Judged(_) => AttemptStatus::Failed,
            AttemptResult::Aborted { .. } => AttemptStatus::Aborted,
        }
    }
}

/// Per-attempt summary handed to the caller before the next attempt starts.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptReport {
    /// 1-indexed attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    pub plan_id: Option<String>,
    pub result: AttemptResult,
    /// Critique appended to the history for this attempt, if any.
    pub critique: Option<Critique>,
}

/// Reason why `run` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// An attempt was judged successful.
    Success { attempts: u32 },
    /// The attempt budget ran out.
    Exhausted {
        attempts: u32,
        last_critique: Option<Critique>,
    },
}

/// Summary of a controller run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub run_id: String,
    pub attempts_used: u32,
    pub final_state: LoopState,
    pub stop: LoopStop,
    pub history: CritiqueHistory,
}

/// Everything produced by one attempt, before it is reported.
struct AttemptRecord {
    raw_plan: Option<String>,
    plan: Option<ManipulationPlan>,
    trace: Option<ExecutionTrace>,
    result: AttemptResult,
    critique: Option<Critique>,
}

impl AttemptRecord {
    fn rejected(raw_plan: Option<String>, error: AttemptError) -> Self {
        Self {
            raw_plan,
            plan: None,
            trace: None,
            result: AttemptResult::PlanRejected(error),
            critique: None,
        }
    }
}

/// Drives the closed loop over an injected arm, planner and critic.
pub struct RetryController<A, P, C> {
    arm: A,
    planner: P,
    critic: C,
    referee: Referee,
    max_attempts: u32,
    executor: ExecutorConfig,
    attempt_log: Option<AttemptLog>,
    state: LoopState,
}

impl<A: Actuator, P: PlanningService, C: CritiqueService> RetryController<A, P, C> {
    pub fn new(arm: A, planner: P, critic: C, config: &LoopConfig) -> Self {
        Self {
            arm,
            planner,
            critic,
            referee: Referee::new(config.target_object.clone()),
            max_attempts: config.max_attempts,
            executor: config.executor.clone(),
            attempt_log: config.log.dir.clone().map(AttemptLog::new),
            state: LoopState::Init,
        }
    }

    pub fn with_attempt_log(mut self, log: AttemptLog) -> Self {
        self.attempt_log = Some(log);
        self
    }

    pub fn arm(&self) -> &A {
        &self.arm
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    pub fn critic(&self) -> &C {
        &self.critic
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run attempts until one succeeds or the budget is spent.
    ///
    /// `on_attempt` is called once per attempt, in order, before the next
    /// attempt begins. The critique history lives only for this call.
    #[instrument(skip_all, fields(max_attempts = self.max_attempts))]
    pub fn run<F: FnMut(&AttemptReport)>(
        &mut self,
        instruction: &str,
        mut on_attempt: F,
    ) -> Result<LoopOutcome> {
        let run_id = self.allocate_run_id()?;
        let mut history = CritiqueHistory::new();
        info!(%run_id, instruction, "run started");

        for attempt in 1..=self.max_attempts {
            let started_at = Utc::now();
            let clock = Instant::now();
            debug!(attempt, history_len = history.len(), "attempt started");

            let record = self.run_attempt(instruction, &history)?;
            if let Some(critique) = &record.critique {
                history.append(critique.clone());
            }

            let report = AttemptReport {
                attempt,
                max_attempts: self.max_attempts,
                plan_id: record.plan.as_ref().map(|plan| plan.plan_id.clone()),
                result: record.result.clone(),
                critique: record.critique.clone(),
            };
            if let Some(log) = &self.attempt_log {
                let meta = AttemptMeta {
                    run_id: run_id.clone(),
                    attempt,
                    status: report.result.status(),
                    plan_id: report.plan_id.clone(),
                    failure_reason: report.result.outcome().map(|o| o.failure_reason),
                    error: report.result.error().map(ToString::to_string),
                    started_at: started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                    ended_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                    duration_ms: clock.elapsed().as_millis() as u64,
                };
                log.write(&AttemptWriteRequest {
                    meta: &meta,
                    raw_plan: record.raw_plan.as_deref(),
                    plan: record.plan.as_ref(),
                    trace: record.trace.as_ref(),
                    outcome: report.result.outcome(),
                    critique: record.critique.as_ref(),
                })
                .with_context(|| format!("write attempt {attempt} log"))?;
            }
            on_attempt(&report);

            if report.result.is_success() {
                info!(%run_id, attempts = attempt, "run succeeded");
                return Ok(LoopOutcome {
                    run_id,
                    attempts_used: attempt,
                    final_state: self.state,
                    stop: LoopStop::Success { attempts: attempt },
                    history,
                });
            }
        }

        self.transition(LoopState::Terminated);
        warn!(%run_id, attempts = self.max_attempts, "attempt budget exhausted");
        Ok(LoopOutcome {
            run_id,
            attempts_used: self.max_attempts,
            final_state: self.state,
            stop: LoopStop::Exhausted {
                attempts: self.max_attempts,
                last_critique: history.last().cloned(),
            },
            history,
        })
    }

    fn run_attempt(&mut self, instruction: &str, history: &CritiqueHistory) -> Result<AttemptRecord> {
        self.transition(LoopState::Init);
        self.arm.reset().context("reset arm")?;

        self.transition(LoopState::Planning);
        let raw = match self.planner.propose(instruction, history.snapshot()) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "planning service failed");
                return Ok(AttemptRecord::rejected(None, err.into()));
            }
        };
        let plan = match parse_plan(&raw) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(error = %err, "plan rejected");
                return Ok(AttemptRecord::rejected(Some(raw), err.into()));
            }
        };
        info!(plan_id = %plan.plan_id, steps = plan.steps.len(), "plan accepted");

        self.transition(LoopState::Executing);
        let (trace, execution) = execute_plan_traced(&mut self.arm, &plan, &self.executor);

        self.transition(LoopState::Judging);
        let (outcome, abort) = match execution {
            Ok(()) => (self.referee.judge(&self.arm).context("judge attempt")?, None),
            Err(err) if err.is_fatal() => {
                return Err(anyhow::Error::new(err).context("execute plan"));
            }
            Err(err) => {
                let outcome = self
                    .referee
                    .judge_aborted(&self.arm)
                    .context("judge aborted attempt")?;
                (outcome, Some(err))
            }
        };

        if outcome.success {
            self.transition(LoopState::Success);
            return Ok(AttemptRecord {
                raw_plan: Some(raw),
                plan: Some(plan),
                trace: Some(trace),
                result: AttemptResult::Judged(outcome),
                critique: None,
            });
        }

        self.transition(LoopState::Critiquing);
        let request = CritiqueRequest {
            instruction: instruction.to_string(),
            failure_reason: outcome.failure_reason,
            metrics: outcome.metrics,
            executed_steps: trace.executed_actions(&plan),
            planned_steps: abort.as_ref().map(|_| plan.steps.clone()),
            abort_reason: abort.as_ref().map(ToString::to_string),
        };
        let critique = match self.critic.critique(&request) {
            Ok(raw) => Critique::parse_or_placeholder(&raw),
            Err(err) => {
                warn!(error = %err, "critique service failed; using placeholder");
                Critique::placeholder()
            }
        };

        let result = match abort {
            Some(err) => AttemptResult::Aborted {
                outcome,
                error: err.into(),
            },
            None => AttemptResult::Judged(outcome),
        };
        Ok(AttemptRecord {
            raw_plan: Some(raw),
            plan: Some(plan),
            trace: Some(trace),
            result,
            critique: Some(critique),
        })
    }

    fn transition(&mut self, next: LoopState) {
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }
}

impl<A, P, C> RetryController<A, P, C> {
    /// Timestamp-based run id, claimed in the attempt log when one is configured.
    fn allocate_run_id(&self) -> Result<String> {
        let base = format!("run-{}", Utc::now().format("%Y%m%d_%H%M%S"));
        match &self.attempt_log {
            Some(log) => log.claim_run_id(&base).context("claim run id"),
            None => Ok(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::{Action, ActionType};
    use crate::core::types::FailureReason;
    use crate::io::actuator::ActuationError;
    use crate::test_support::{
        RecordingArm, ScriptedCritic, ScriptedPlanner, critique_json, pick_steps, plan_json,
    };

    fn config(max_attempts: u32) -> LoopConfig {
        LoopConfig {
            max_attempts,
            ..LoopConfig::default()
        }
    }

    fn failing_arm() -> RecordingArm {
        RecordingArm::at([0.3, 0.0, 0.5]).with_evidence(0.025, 0)
    }

    #[test]
    fn always_failing_run_uses_exact_budget_then_terminates() {
        let mut controller = RetryController::new(
            failing_arm(),
            ScriptedPlanner::repeating(plan_json(pick_steps())),
            ScriptedCritic::numbered(3),
            &config(3),
        );

        let outcome = controller.run("pick up the cube", |_| {}).expect("run");

        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(outcome.final_state, LoopState::Terminated);
        assert_eq!(
            outcome.stop,
            LoopStop::Exhausted {
                attempts: 3,
                last_critique: Some(Critique::new("diagnosis 3", "suggestion 3")),
            }
        );
        assert_eq!(controller.planner().call_count(), 3);
        assert_eq!(controller.critic().requests().len(), 3);
        assert_eq!(controller.arm().reset_count(), 3);
    }

    #[test]
    fn history_grows_in_attempt_order_and_reaches_planner() {
        let mut controller = RetryController::new(
            failing_arm(),
            ScriptedPlanner::repeating(plan_json(pick_steps())),
            ScriptedCritic::numbered(3),
            &config(3),
        );

        let outcome = controller.run("pick up the cube", |_| {}).expect("run");

        let c1 = Critique::new("diagnosis 1", "suggestion 1");
        let c2 = Critique::new("diagnosis 2", "suggestion 2");
        let c3 = Critique::new("diagnosis 3", "suggestion 3");
        assert_eq!(
            controller.planner().seen_history(),
            vec![vec![], vec![c1.clone()], vec![c1.clone(), c2.clone()]]
        );
        assert_eq!(outcome.history.snapshot(), &[c1, c2, c3]);
    }

    #[test]
    fn stops_on_first_success() {
        let arm = RecordingArm::at([0.3, 0.0, 0.5])
            .with_evidence_per_attempt(vec![(0.025, 0), (0.15, 2)]);
        let mut controller = RetryController::new(
            arm,
            ScriptedPlanner::repeating(plan_json(pick_steps())),
            ScriptedCritic::numbered(3),
            &config(3),
        );

        let outcome = controller.run("pick up the cube", |_| {}).expect("run");

        assert_eq!(outcome.stop, LoopStop::Success { attempts: 2 });
        assert_eq!(outcome.final_state, LoopState::Success);
        assert_eq!(outcome.history.len(), 1);
        let requests = controller.critic().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].failure_reason, FailureReason::MissedGrasp);
        assert_eq!(requests[0].executed_steps, pick_steps());
        assert_eq!(requests[0].planned_steps, None);
    }

    #[test]
    fn malformed_plan_consumes_attempt_without_critique() {
        let planner = ScriptedPlanner::new(vec![
            Ok("definitely not json".to_string()),
            Ok(plan_json(pick_steps())),
        ]);
        let arm = RecordingArm::at([0.3, 0.0, 0.5]).with_evidence(0.15, 2);
        let mut controller =
            RetryController::new(arm, planner, ScriptedCritic::numbered(1), &config(3));

        let mut reports = Vec::new();
        let outcome = controller
            .run("pick up the cube", |report| reports.push(report.clone()))
            .expect("run");

        assert_eq!(outcome.stop, LoopStop::Success { attempts: 2 });
        assert!(outcome.history.is_empty());
        assert!(controller.critic().requests().is_empty());
        assert!(matches!(
            reports[0].result,
            AttemptResult::PlanRejected(AttemptError::Validation(PlanError::InvalidJson(_)))
        ));
        assert_eq!(reports[0].plan_id, None);
        assert_eq!(controller.planner().seen_history(), vec![vec![], vec![]]);
    }

    #[test]
    fn unknown_action_type_is_a_rejected_plan() {
        let raw = r#"{"plan_id":"p","instruction":"i","steps":[{"action_type":"JUMP"}]}"#;
        let mut controller = RetryController::new(
            failing_arm(),
            ScriptedPlanner::repeating(raw),
            ScriptedCritic::numbered(1),
            &config(2),
        );

        let mut reports = Vec::new();
        let outcome = controller
            .run("pick", |report| reports.push(report.clone()))
            .expect("run");

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|report| matches!(
            report.result,
            AttemptResult::PlanRejected(AttemptError::Validation(
                PlanError::UnknownActionType { .. }
            ))
        )));
        assert_eq!(
            outcome.stop,
            LoopStop::Exhausted {
                attempts: 2,
                last_critique: None
            }
        );
    }

    #[test]
    fn planner_outage_exhausts_budget_without_error() {
        let mut controller = RetryController::new(
            failing_arm(),
            ScriptedPlanner::new(vec![Err(ServiceError::Timeout(60))]),
            ScriptedCritic::numbered(1),
            &config(3),
        );

        let outcome = controller.run("pick", |_| {}).expect("run");

        assert_eq!(outcome.final_state, LoopState::Terminated);
        assert_eq!(controller.planner().call_count(), 3);
        assert!(outcome.history.is_empty());
    }

    #[test]
    fn critic_failure_appends_placeholder() {
        let mut controller = RetryController::new(
            failing_arm(),
            ScriptedPlanner::repeating(plan_json(pick_steps())),
            ScriptedCritic::new(vec![
                Err(ServiceError::Status(500)),
                Ok("{\"diagnosis\": 3}".to_string()),
            ]),
            &config(2),
        );

        let outcome = controller.run("pick", |_| {}).expect("run");

        assert_eq!(
            outcome.history.snapshot(),
            &[Critique::placeholder(), Critique::placeholder()]
        );
    }

    #[test]
    fn missing_parameter_aborts_attempt_as_missed_grasp() {
        let steps = vec![
            Action::new(ActionType::OpenGripper),
            Action::new(ActionType::MoveEe),
            Action::new(ActionType::CloseGripper),
            Action::new(ActionType::Lift).with_dz(0.2),
        ];
        let mut controller = RetryController::new(
            RecordingArm::at([0.3, 0.0, 0.5]).with_evidence(0.15, 2),
            ScriptedPlanner::repeating(plan_json(steps.clone())),
            ScriptedCritic::new(vec![Ok(critique_json("No target.", "Give xyz."))]),
            &config(1),
        );

        let mut reports = Vec::new();
        let outcome = controller
            .run("pick", |report| reports.push(report.clone()))
            .expect("run");

        assert!(matches!(
            &reports[0].result,
            AttemptResult::Aborted {
                outcome,
                error: AttemptError::Execution(ExecutionError::MissingParameter { step: 1, .. }),
            } if outcome.failure_reason == FailureReason::MissedGrasp
        ));
        let request = &controller.critic().requests()[0];
        assert_eq!(request.failure_reason, FailureReason::MissedGrasp);
        assert_eq!(request.executed_steps, vec![Action::new(ActionType::OpenGripper)]);
        assert_eq!(request.planned_steps.as_ref(), Some(&steps));
        assert!(
            request
                .abort_reason
                .as_deref()
                .is_some_and(|reason| reason.contains("xyz"))
        );
        assert_eq!(outcome.final_state, LoopState::Terminated);
    }

    #[test]
    fn fatal_actuation_failure_ends_run_with_error() {
        let arm = failing_arm().failing_moves(ActuationError::Unavailable("gone".to_string()));
        let mut controller = RetryController::new(
            arm,
            ScriptedPlanner::repeating(plan_json(pick_steps())),
            ScriptedCritic::numbered(3),
            &config(3),
        );

        let err = controller.run("pick", |_| {}).unwrap_err();

        assert!(format!("{err:#}").contains("simulator unavailable"));
        assert_eq!(controller.planner().call_count(), 1);
    }

    #[test]
    fn rejected_actuation_only_fails_the_attempt() {
        let arm = failing_arm().failing_moves(ActuationError::Rejected("out of reach".to_string()));
        let mut controller = RetryController::new(
            arm,
            ScriptedPlanner::repeating(plan_json(pick_steps())),
            ScriptedCritic::numbered(2),
            &config(2),
        );

        let outcome = controller.run("pick", |_| {}).expect("run");

        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.final_state, LoopState::Terminated);
    }

    #[test]
    fn reset_failure_is_fatal() {
        let arm = failing_arm().failing_reset(ActuationError::Unavailable("no scene".to_string()));
        let mut controller = RetryController::new(
            arm,
            ScriptedPlanner::repeating(plan_json(pick_steps())),
            ScriptedCritic::numbered(1),
            &config(3),
        );

        let err = controller.run("pick", |_| {}).unwrap_err();
        assert!(format!("{err:#}").contains("reset arm"));
        assert_eq!(controller.planner().call_count(), 0);
    }

    #[test]
    fn reports_every_attempt_in_order() {
        let mut controller = RetryController::new(
            failing_arm(),
            ScriptedPlanner::repeating(plan_json(pick_steps())),
            ScriptedCritic::numbered(3),
            &config(3),
        );

        let mut seen = Vec::new();
        controller
            .run("pick", |report| {
                seen.push((report.attempt, report.max_attempts, report.critique.is_some()));
            })
            .expect("run");

        assert_eq!(seen, vec![(1, 3, true), (2, 3, true), (3, 3, true)]);
    }

    #[test]
    fn each_run_starts_with_empty_history() {
        let mut controller = RetryController::new(
            failing_arm(),
            ScriptedPlanner::repeating(plan_json(pick_steps())),
            ScriptedCritic::numbered(4),
            &config(2),
        );

        controller.run("pick", |_| {}).expect("first run");
        let second = controller.run("pick", |_| {}).expect("second run");

        assert_eq!(second.history.len(), 2);
        assert_eq!(controller.planner().seen_history()[2], Vec::<Critique>::new());
    }

    #[test]
    fn writes_attempt_artifacts_when_log_configured() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut controller = RetryController::new(
            failing_arm(),
            ScriptedPlanner::repeating(plan_json(pick_steps())),
            ScriptedCritic::numbered(1),
            &config(1),
        )
        .with_attempt_log(AttemptLog::new(temp.path()));

        let outcome = controller.run("pick", |_| {}).expect("run");

        let dir = temp.path().join(&outcome.run_id).join("1");
        assert!(dir.join("meta.json").is_file());
        assert!(dir.join("plan.json").is_file());
        assert!(dir.join("trace.json").is_file());
        assert!(dir.join("outcome.json").is_file());
        assert!(dir.join("critique.json").is_file());
    }

    #[test]
    fn back_to_back_runs_get_separate_log_dirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut controller = RetryController::new(
            failing_arm(),
            ScriptedPlanner::repeating(plan_json(pick_steps())),
            ScriptedCritic::numbered(2),
            &config(1),
        )
        .with_attempt_log(AttemptLog::new(temp.path()));

        let first = controller.run("pick", |_| {}).expect("first run");
        let second = controller.run("pick", |_| {}).expect("second run");

        assert_ne!(first.run_id, second.run_id);
        let first_critique = temp.path().join(&first.run_id).join("1/critique.json");
        let second_critique = temp.path().join(&second.run_id).join("1/critique.json");
        let first_json = std::fs::read_to_string(first_critique).expect("first critique");
        let second_json = std::fs::read_to_string(second_critique).expect("second critique");
        assert!(first_json.contains("diagnosis 1"));
        assert!(second_json.contains("diagnosis 2"));
    }
}
