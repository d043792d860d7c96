//! Test-only doubles for the actuation, planning and critique seams.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::core::history::Critique;
use crate::core::plan::{Action, ActionType, ManipulationPlan};
use crate::io::actuator::{ActuationError, Actuator};
use crate::io::critic::{CritiqueRequest, CritiqueService};
use crate::io::llm::ServiceError;
use crate::io::planner::PlanningService;

/// Actuator call observed by [`RecordingArm`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArmCall {
    Reset,
    Position,
    MoveTo([f64; 3]),
    SetGripper { aperture: f64, force: f64 },
    AdvanceTime(u32),
}

/// Arm that records every command and reports scripted evidence.
///
/// Moves complete instantly. Evidence is chosen by attempt: after the n-th
/// reset the n-th scripted `(height, contacts)` pair is reported, with the
/// last pair repeating.
#[derive(Debug)]
pub struct RecordingArm {
    start: [f64; 3],
    position: [f64; 3],
    evidence: Vec<(f64, u32)>,
    resets: usize,
    move_error: Option<ActuationError>,
    reset_error: Option<ActuationError>,
    calls: RefCell<Vec<ArmCall>>,
}

impl RecordingArm {
    pub fn at(start: [f64; 3]) -> Self {
        Self {
            start,
            position: start,
            evidence: vec![(0.025, 0)],
            resets: 0,
            move_error: None,
            reset_error: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_evidence(self, height: f64, contacts: u32) -> Self {
        self.with_evidence_per_attempt(vec![(height, contacts)])
    }

    pub fn with_evidence_per_attempt(mut self, evidence: Vec<(f64, u32)>) -> Self {
        assert!(!evidence.is_empty(), "evidence script must be non-empty");
        self.evidence = evidence;
        self
    }

    pub fn failing_moves(mut self, error: ActuationError) -> Self {
        self.move_error = Some(error);
        self
    }

    pub fn failing_reset(mut self, error: ActuationError) -> Self {
        self.reset_error = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<ArmCall> {
        self.calls.borrow().clone()
    }

    pub fn reset_count(&self) -> usize {
        self.resets
    }

    fn current_evidence(&self) -> (f64, u32) {
        let index = self.resets.saturating_sub(1).min(self.evidence.len() - 1);
        self.evidence[index]
    }

    fn record(&self, call: ArmCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl Actuator for RecordingArm {
    fn reset(&mut self) -> Result<(), ActuationError> {
        self.record(ArmCall::Reset);
        if let Some(err) = &self.reset_error {
            return Err(err.clone());
        }
        self.resets += 1;
        self.position = self.start;
        Ok(())
    }

    fn end_effector_position(&self) -> Result<[f64; 3], ActuationError> {
        self.record(ArmCall::Position);
        Ok(self.position)
    }

    fn move_to(&mut self, target: [f64; 3]) -> Result<(), ActuationError> {
        self.record(ArmCall::MoveTo(target));
        if let Some(err) = &self.move_error {
            return Err(err.clone());
        }
        self.position = target;
        Ok(())
    }

    fn set_gripper(&mut self, aperture: f64, force: f64) -> Result<(), ActuationError> {
        self.record(ArmCall::SetGripper { aperture, force });
        Ok(())
    }

    fn advance_time(&mut self, steps: u32) -> Result<(), ActuationError> {
        self.record(ArmCall::AdvanceTime(steps));
        Ok(())
    }

    fn object_height(&self, _object: &str) -> Result<f64, ActuationError> {
        Ok(self.current_evidence().0)
    }

    fn contact_count(&self, _object: &str) -> Result<u32, ActuationError> {
        Ok(self.current_evidence().1)
    }
}

/// Planner that replays queued responses and records the history it was shown.
///
/// Once the queue is down to one response, that response repeats.
pub struct ScriptedPlanner {
    responses: RefCell<VecDeque<Result<String, ServiceError>>>,
    seen_history: RefCell<Vec<Vec<Critique>>>,
}

impl ScriptedPlanner {
    pub fn new(responses: Vec<Result<String, ServiceError>>) -> Self {
        assert!(!responses.is_empty(), "planner script must be non-empty");
        Self {
            responses: RefCell::new(responses.into()),
            seen_history: RefCell::new(Vec::new()),
        }
    }

    pub fn repeating(raw: impl Into<String>) -> Self {
        Self::new(vec![Ok(raw.into())])
    }

    /// History snapshots passed to each `propose` call, in call order.
    pub fn seen_history(&self) -> Vec<Vec<Critique>> {
        self.seen_history.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.seen_history.borrow().len()
    }
}

impl PlanningService for ScriptedPlanner {
    fn propose(&self, _instruction: &str, history: &[Critique]) -> Result<String, ServiceError> {
        self.seen_history.borrow_mut().push(history.to_vec());
        next_response(&self.responses)
    }
}

/// Critic that replays queued responses and records every request.
pub struct ScriptedCritic {
    responses: RefCell<VecDeque<Result<String, ServiceError>>>,
    requests: RefCell<Vec<CritiqueRequest>>,
}

impl ScriptedCritic {
    pub fn new(responses: Vec<Result<String, ServiceError>>) -> Self {
        assert!(!responses.is_empty(), "critic script must be non-empty");
        Self {
            responses: RefCell::new(responses.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Critic answering `Attempt N` diagnoses/suggestions, numbered per call.
    pub fn numbered(count: usize) -> Self {
        Self::new(
            (1..=count)
                .map(|n| Ok(critique_json(&format!("diagnosis {n}"), &format!("suggestion {n}"))))
                .collect(),
        )
    }

    pub fn requests(&self) -> Vec<CritiqueRequest> {
        self.requests.borrow().clone()
    }
}

impl CritiqueService for ScriptedCritic {
    fn critique(&self, request: &CritiqueRequest) -> Result<String, ServiceError> {
        self.requests.borrow_mut().push(request.clone());
        next_response(&self.responses)
    }
}

fn next_response(
    queue: &RefCell<VecDeque<Result<String, ServiceError>>>,
) -> Result<String, ServiceError> {
    let mut queue = queue.borrow_mut();
    if queue.len() > 1 {
        queue.pop_front().expect("queue has more than one response")
    } else {
        queue.front().cloned().expect("queue is non-empty")
    }
}

/// Build a plan with a fixed id and instruction.
pub fn plan(steps: Vec<Action>) -> ManipulationPlan {
    ManipulationPlan {
        plan_id: "plan-1".to_string(),
        instruction: "pick up the cube".to_string(),
        steps,
    }
}

/// Serialize a plan as a planner would return it.
pub fn plan_json(steps: Vec<Action>) -> String {
    serde_json::to_string(&plan(steps)).expect("serialize plan")
}

/// Open, hover, descend, close, lift: the canonical pick.
pub fn pick_steps() -> Vec<Action> {
    vec![
        Action::new(ActionType::OpenGripper),
        Action::new(ActionType::MoveEe).with_xyz([0.5, 0.0, 0.3]),
        Action::new(ActionType::Descend).with_dz(0.28),
        Action::new(ActionType::CloseGripper).with_force(100.0),
        Action::new(ActionType::Lift).with_dz(0.2),
    ]
}

pub fn critique_json(diagnosis: &str, suggestion: &str) -> String {
    serde_json::to_string(&Critique::new(diagnosis, suggestion)).expect("serialize critique")
}
