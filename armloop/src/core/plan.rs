//! Typed manipulation plans and the validating decode from planner output.
//!
//! Planner output is untrusted JSON. Decoding happens in three passes:
//! unknown `action_type` literals are reported first (so the error names the
//! offending literal), then the payload is checked against the embedded JSON
//! Schema, then it is decoded into typed values. Cross-field requirements
//! (e.g. `MOVE_EE` without `xyz`) are left to the executor.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON Schema for planner output (Draft 2020-12). Also embedded in the planner prompt.
pub const PLAN_SCHEMA: &str = include_str!("../../schemas/manipulation_plan.schema.json");

/// Gripper force used when a step does not specify one.
pub const DEFAULT_FORCE: f64 = 100.0;

static PLAN_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(PLAN_SCHEMA).expect("embedded plan schema should be valid json");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("embedded plan schema should compile")
});

/// The closed vocabulary of robot actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    MoveEe,
    Approach,
    Descend,
    CloseGripper,
    OpenGripper,
    Lift,
    Retract,
}

impl ActionType {
    pub const ALL: [ActionType; 7] = [
        ActionType::MoveEe,
        ActionType::Approach,
        ActionType::Descend,
        ActionType::CloseGripper,
        ActionType::OpenGripper,
        ActionType::Lift,
        ActionType::Retract,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::MoveEe => "MOVE_EE",
            ActionType::Approach => "APPROACH",
            ActionType::Descend => "DESCEND",
            ActionType::CloseGripper => "CLOSE_GRIPPER",
            ActionType::OpenGripper => "OPEN_GRIPPER",
            ActionType::Lift => "LIFT",
            ActionType::Retract => "RETRACT",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|action_type| action_type.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// One atomic robot instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    /// Absolute target `[x, y, z]`; required for `MOVE_EE` and `APPROACH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xyz: Option<[f64; 3]>,
    /// Vertical distance; required for `DESCEND` and `LIFT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dz: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<f64>,
}

impl Action {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            xyz: None,
            dz: None,
            target_object: None,
            force: None,
        }
    }

    pub fn with_xyz(mut self, xyz: [f64; 3]) -> Self {
        self.xyz = Some(xyz);
        self
    }

    pub fn with_dz(mut self, dz: f64) -> Self {
        self.dz = Some(dz);
        self
    }

    pub fn with_force(mut self, force: f64) -> Self {
        self.force = Some(force);
        self
    }

    /// Gripper force, falling back to [`DEFAULT_FORCE`].
    pub fn force(&self) -> f64 {
        self.force.unwrap_or(DEFAULT_FORCE)
    }
}

/// Ordered action sequence produced by the planner for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManipulationPlan {
    pub plan_id: String,
    pub instruction: String,
    pub steps: Vec<Action>,
}

/// Reasons a planner payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("plan is not valid json: {0}")]
    InvalidJson(String),
    #[error("step {step}: unknown action_type '{found}'")]
    UnknownActionType { step: usize, found: String },
    #[error("malformed plan:\n- {}", .violations.join("\n- "))]
    MalformedAction { violations: Vec<String> },
}

/// Parse raw planner output into a validated plan.
pub fn parse_plan(raw: &str) -> Result<ManipulationPlan, PlanError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| PlanError::InvalidJson(err.to_string()))?;
    parse_plan_value(&value)
}

/// Validate an already-parsed JSON value as a plan.
pub fn parse_plan_value(value: &Value) -> Result<ManipulationPlan, PlanError> {
    check_action_types(value)?;

    let violations: Vec<String> = PLAN_VALIDATOR
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect();
    if !violations.is_empty() {
        return Err(PlanError::MalformedAction { violations });
    }

    serde_json::from_value(value.clone()).map_err(|err| PlanError::MalformedAction {
        violations: vec![err.to_string()],
    })
}

/// Report the first string `action_type` outside the vocabulary.
///
/// Non-string or missing literals are structural problems and are left to the
/// schema pass.
fn check_action_types(value: &Value) -> Result<(), PlanError> {
    let Some(steps) = value.get("steps").and_then(Value::as_array) else {
        return Ok(());
    };
    for (step, action) in steps.iter().enumerate() {
        let unknown = action
            .get("action_type")
            .and_then(Value::as_str)
            .filter(|found| found.parse::<ActionType>().is_err());
        if let Some(found) = unknown {
            return Err(PlanError::UnknownActionType {
                step,
                found: found.to_string(),
            });
        }
    }
    Ok(())
}
