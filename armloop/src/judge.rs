//! Post-execution judging: sample simulator evidence and classify it.

use tracing::{debug, instrument};

use crate::core::classifier::classify;
use crate::core::types::{Evidence, FailureReason, Outcome};
use crate::io::actuator::{ActuationError, Actuator};

/// Reads referee evidence for one target object.
#[derive(Debug, Clone)]
pub struct Referee {
    object: String,
}

impl Referee {
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
        }
    }

    pub fn evidence<A: Actuator>(&self, arm: &A) -> Result<Evidence, ActuationError> {
        Ok(Evidence {
            cube_height: arm.object_height(&self.object)?,
            contact_count: arm.contact_count(&self.object)?,
        })
    }

    /// Classify the current (settled) simulator state.
    #[instrument(skip_all, fields(object = %self.object))]
    pub fn judge<A: Actuator>(&self, arm: &A) -> Result<Outcome, ActuationError> {
        let evidence = self.evidence(arm)?;
        let outcome = classify(evidence);
        debug!(
            height = evidence.cube_height,
            contacts = evidence.contact_count,
            failure_reason = %outcome.failure_reason,
            "judged attempt"
        );
        Ok(outcome)
    }

    /// Outcome for an attempt whose execution aborted before finishing.
    ///
    /// No grasp was completed, so the attempt is reported as `MISSED_GRASP`
    /// whatever the scene looks like; metrics still reflect the scene.
    pub fn judge_aborted<A: Actuator>(&self, arm: &A) -> Result<Outcome, ActuationError> {
        let measured = classify(self.evidence(arm)?);
        Ok(Outcome {
            success: false,
            failure_reason: FailureReason::MissedGrasp,
            metrics: measured.metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingArm;

    #[test]
    fn judge_reads_height_and_contacts() {
        let arm = RecordingArm::at([0.5, 0.0, 0.2]).with_evidence(0.15, 2);
        let outcome = Referee::new("cube").judge(&arm).expect("judge");
        assert!(outcome.success);
        assert_eq!(outcome.metrics.contacts, 2);
    }

    #[test]
    fn aborted_attempt_is_missed_grasp_even_when_lifted() {
        let arm = RecordingArm::at([0.5, 0.0, 0.2]).with_evidence(0.15, 2);
        let outcome = Referee::new("cube").judge_aborted(&arm).expect("judge");
        assert!(!outcome.success);
        assert_eq!(outcome.failure_reason, FailureReason::MissedGrasp);
        assert_eq!(outcome.metrics.final_height, 0.15);
    }
}
