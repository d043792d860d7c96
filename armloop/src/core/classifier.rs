//! Deterministic failure classification from simulator evidence.

use crate::core::types::{Evidence, FailureReason, Metrics, Outcome};

/// Objects above this height (metres) count as lifted.
pub const LIFT_THRESHOLD_M: f64 = 0.1;

/// Classify post-execution evidence into an [`Outcome`].
///
/// | lifted | held  | result          |
/// |--------|-------|-----------------|
/// | yes    | yes   | success         |
/// | yes    | no    | `UNSTABLE_LIFT` |
/// | no     | yes   | `GRASP_SLIP`    |
/// | no     | no    | `MISSED_GRASP`  |
pub fn classify(evidence: Evidence) -> Outcome {
    let is_lifted = evidence.cube_height > LIFT_THRESHOLD_M;
    let is_held = evidence.contact_count > 0;

    let failure_reason = match (is_lifted, is_held) {
        (true, true) => FailureReason::None,
        (true, false) => FailureReason::UnstableLift,
        (false, true) => FailureReason::GraspSlip,
        (false, false) => FailureReason::MissedGrasp,
    };

    Outcome {
        success: failure_reason == FailureReason::None,
        failure_reason,
        metrics: Metrics {
            final_height: round_mm(evidence.cube_height),
            contacts: evidence.contact_count,
        },
    }
}

fn round_mm(metres: f64) -> f64 {
    (metres * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence(cube_height: f64, contact_count: u32) -> Evidence {
        Evidence {
            cube_height,
            contact_count,
        }
    }

    #[test]
    fn lifted_and_held_is_success() {
        let outcome = classify(evidence(0.15, 2));
        assert!(outcome.success);
        assert_eq!(outcome.failure_reason, FailureReason::None);
    }

    #[test]
    fn lifted_without_contact_is_unstable_lift() {
        let outcome = classify(evidence(0.15, 0));
        assert!(!outcome.success);
        assert_eq!(outcome.failure_reason, FailureReason::UnstableLift);
    }

    #[test]
    fn held_on_table_is_grasp_slip() {
        let outcome = classify(evidence(0.05, 3));
        assert!(!outcome.success);
        assert_eq!(outcome.failure_reason, FailureReason::GraspSlip);
    }

    #[test]
    fn untouched_on_table_is_missed_grasp() {
        let outcome = classify(evidence(0.05, 0));
        assert!(!outcome.success);
        assert_eq!(outcome.failure_reason, FailureReason::MissedGrasp);
    }

    /// The threshold is strict: exactly 0.1 m is still on the table.
    #[test]
    fn threshold_is_exclusive() {
        let outcome = classify(evidence(LIFT_THRESHOLD_M, 1));
        assert_eq!(outcome.failure_reason, FailureReason::GraspSlip);
    }

    #[test]
    fn metrics_round_height_to_millimetres() {
        let outcome = classify(evidence(0.123_456, 4));
        assert_eq!(outcome.metrics.final_height, 0.123);
        assert_eq!(outcome.metrics.contacts, 4);
    }

    #[test]
    fn classification_is_idempotent() {
        let input = evidence(0.087, 1);
        assert_eq!(classify(input), classify(input));
    }

    #[test]
    fn failure_reason_serializes_as_literal() {
        let value = serde_json::to_value(FailureReason::UnstableLift).expect("serialize");
        assert_eq!(value, "UNSTABLE_LIFT");
    }
}
