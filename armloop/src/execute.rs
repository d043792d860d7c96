//! Sequential plan execution against an [`Actuator`].
//!
//! Steps run strictly in list order. Every step is followed by a settle
//! window of simulated time before the next one is issued, so each physical
//! motion completes before the next begins.

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::core::plan::{Action, ActionType, ManipulationPlan};
use crate::io::actuator::{ActuationError, Actuator};
use crate::io::config::ExecutorConfig;

/// Aperture commanded by `CLOSE_GRIPPER`.
pub const CLOSED_APERTURE: f64 = 0.0;

/// Actuation command issued for a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssuedCommand {
    MoveTo { target: [f64; 3] },
    SetGripper { aperture: f64, force: f64 },
}

/// One executed step and the command it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutedStep {
    pub index: usize,
    pub action_type: ActionType,
    pub command: IssuedCommand,
}

/// Record of a fully executed plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionTrace {
    pub steps: Vec<ExecutedStep>,
}

impl ExecutionTrace {
    /// Plan actions that actually ran, in execution order.
    pub fn executed_actions(&self, plan: &ManipulationPlan) -> Vec<Action> {
        self.steps
            .iter()
            .filter_map(|step| plan.steps.get(step.index).cloned())
            .collect()
    }
}

/// Step failure that aborts the rest of the plan.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("step {step} ({action_type}): missing required parameter '{param}'")]
    MissingParameter {
        step: usize,
        action_type: ActionType,
        param: &'static str,
    },
    #[error("step {step} ({action_type}): {source}")]
    Actuation {
        step: usize,
        action_type: ActionType,
        source: ActuationError,
    },
}

impl ExecutionError {
    /// True when the simulator itself failed and the run cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecutionError::Actuation { source, .. } if source.is_fatal())
    }
}

/// Execute every step of `plan` in order, settling after each one.
pub fn execute_plan<A: Actuator>(
    arm: &mut A,
    plan: &ManipulationPlan,
    config: &ExecutorConfig,
) -> Result<ExecutionTrace, ExecutionError> {
    let (trace, result) = execute_plan_traced(arm, plan, config);
    result.map(|()| trace)
}

/// Like [`execute_plan`], but also returns the steps that completed before an abort.
#[instrument(skip_all, fields(plan_id = %plan.plan_id, steps = plan.steps.len()))]
pub fn execute_plan_traced<A: Actuator>(
    arm: &mut A,
    plan: &ManipulationPlan,
    config: &ExecutorConfig,
) -> (ExecutionTrace, Result<(), ExecutionError>) {
    let mut trace = ExecutionTrace::default();
    let result = run_steps(arm, plan, config, &mut trace);
    (trace, result)
}

fn run_steps<A: Actuator>(
    arm: &mut A,
    plan: &ManipulationPlan,
    config: &ExecutorConfig,
    trace: &mut ExecutionTrace,
) -> Result<(), ExecutionError> {
    for (index, action) in plan.steps.iter().enumerate() {
        debug!(step = index, action_type = %action.action_type, "executing step");
        let command = execute_step(arm, index, action, config)?;
        arm.advance_time(config.settle_steps)
            .map_err(|source| actuation_error(index, action, source))?;
        trace.steps.push(ExecutedStep {
            index,
            action_type: action.action_type,
            command,
        });
    }
    Ok(())
}

fn execute_step<A: Actuator>(
    arm: &mut A,
    index: usize,
    action: &Action,
    config: &ExecutorConfig,
) -> Result<IssuedCommand, ExecutionError> {
    let command = match action.action_type {
        ActionType::MoveEe => IssuedCommand::MoveTo {
            target: require_xyz(index, action)?,
        },
        ActionType::Approach => {
            let [x, y, _] = require_xyz(index, action)?;
            IssuedCommand::MoveTo {
                target: [x, y, config.safe_height_m],
            }
        }
        ActionType::Descend => {
            let dz = require_dz(index, action)?;
            let [x, y, z] = current_position(arm, index, action)?;
            IssuedCommand::MoveTo {
                target: [x, y, z - dz],
            }
        }
        ActionType::Lift => {
            let dz = require_dz(index, action)?;
            let [x, y, z] = current_position(arm, index, action)?;
            IssuedCommand::MoveTo {
                target: [x, y, z + dz],
            }
        }
        ActionType::Retract => {
            let [x, y, _] = current_position(arm, index, action)?;
            IssuedCommand::MoveTo {
                target: [x, y, config.safe_height_m],
            }
        }
        ActionType::OpenGripper => IssuedCommand::SetGripper {
            aperture: config.open_aperture_m,
            force: action.force(),
        },
        ActionType::CloseGripper => IssuedCommand::SetGripper {
            aperture: CLOSED_APERTURE,
            force: action.force(),
        },
    };

    let issued = match &command {
        IssuedCommand::MoveTo { target } => arm.move_to(*target),
        IssuedCommand::SetGripper { aperture, force } => arm.set_gripper(*aperture, *force),
    };
    issued.map_err(|source| actuation_error(index, action, source))?;
    Ok(command)
}

fn require_xyz(step: usize, action: &Action) -> Result<[f64; 3], ExecutionError> {
    action.xyz.ok_or(ExecutionError::MissingParameter {
        step,
        action_type: action.action_type,
        param: "xyz",
    })
}

fn require_dz(step: usize, action: &Action) -> Result<f64, ExecutionError> {
    action.dz.ok_or(ExecutionError::MissingParameter {
        step,
        action_type: action.action_type,
        param: "dz",
    })
}

fn current_position<A: Actuator>(
    arm: &A,
    step: usize,
    action: &Action,
) -> Result<[f64; 3], ExecutionError> {
    arm.end_effector_position()
        .map_err(|source| actuation_error(step, action, source))
}

fn actuation_error(step: usize, action: &Action, source: ActuationError) -> ExecutionError {
    warn!(step, action_type = %action.action_type, error = %source, "actuation failed");
    ExecutionError::Actuation {
        step,
        action_type: action.action_type,
        source,
    }
}
