//! Investigation tests for the live planning and critique services.
//!
//! These tests call a real chat-completion endpoint and are excluded from
//! regular CI runs because they require network access and API credentials.
//!
//! Run with: `cargo test -p armloop --test investigation_llm -- --ignored`

use armloop::core::history::Critique;
use armloop::core::plan::parse_plan;
use armloop::core::types::{FailureReason, Metrics};
use armloop::io::config::LoopConfig;
use armloop::io::critic::{CritiqueRequest, CritiqueService, LlmCritic};
use armloop::io::llm::HttpChatClient;
use armloop::io::planner::{LlmPlanner, PlanningService};
use armloop::test_support::pick_steps;

#[test]
#[ignore = "requires network access and an API key"]
fn live_planner_returns_schema_valid_plan() {
    let config = LoopConfig::default();
    let client = HttpChatClient::from_config(&config.llm).expect("client");
    let planner = LlmPlanner::new(
        client,
        config.executor.safe_height_m,
        config.llm.planner_temperature,
    );

    let history = [Critique::new(
        "Gripper closed 5 cm above the cube.",
        "Descend further before closing.",
    )];
    let raw = planner
        .propose("pick up the cube", &history)
        .expect("propose");
    let plan = parse_plan(&raw).expect("valid plan");
    assert!(!plan.steps.is_empty());
}

#[test]
#[ignore = "requires network access and an API key"]
fn live_critic_returns_diagnosis_and_suggestion() {
    let config = LoopConfig::default();
    let critic = LlmCritic::new(HttpChatClient::from_config(&config.llm).expect("client"));

    let raw = critic
        .critique(&CritiqueRequest {
            instruction: "pick up the cube".to_string(),
            failure_reason: FailureReason::GraspSlip,
            metrics: Metrics {
                final_height: 0.025,
                contacts: 2,
            },
            executed_steps: pick_steps(),
            planned_steps: None,
            abort_reason: None,
        })
        .expect("critique");
    Critique::parse(&raw).expect("schema-valid critique");
}
