//! Shared deterministic types for the control loop.
//!
//! These types define stable contracts between the classifier, the critique
//! step and the retry controller. They must not depend on external state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw simulator signals sampled after a plan has executed and settled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Height of the target object's base, metres above the table.
    pub cube_height: f64,
    /// Contact points between the robot and the target object.
    pub contact_count: u32,
}

/// Classified failure mode of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    None,
    MissedGrasp,
    GraspSlip,
    UnstableLift,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::None => "NONE",
            FailureReason::MissedGrasp => "MISSED_GRASP",
            FailureReason::GraspSlip => "GRASP_SLIP",
            FailureReason::UnstableLift => "UNSTABLE_LIFT",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric evidence reported alongside an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Object height rounded to millimetres.
    pub final_height: f64,
    pub contacts: u32,
}

/// Verdict for one attempt. `failure_reason` is `None` iff `success`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub failure_reason: FailureReason,
    pub metrics: Metrics,
}
