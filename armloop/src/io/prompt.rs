//! Prompt rendering for the planner and critic.

use minijinja::{Environment, context};

use crate::core::history::{CRITIQUE_SCHEMA, Critique};
use crate::core::plan::PLAN_SCHEMA;

const PLANNER_SYSTEM_TEMPLATE: &str = include_str!("prompts/planner_system.md");
const PLANNER_USER_TEMPLATE: &str = include_str!("prompts/planner_user.md");
const CRITIC_SYSTEM_TEMPLATE: &str = include_str!("prompts/critic_system.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("planner_system", PLANNER_SYSTEM_TEMPLATE)
            .expect("planner system template should be valid");
        env.add_template("planner_user", PLANNER_USER_TEMPLATE)
            .expect("planner user template should be valid");
        env.add_template("critic_system", CRITIC_SYSTEM_TEMPLATE)
            .expect("critic system template should be valid");
        Self { env }
    }

    pub fn planner_system(&self, safe_height_m: f64) -> Result<String, minijinja::Error> {
        self.env.get_template("planner_system")?.render(context! {
            safe_height => safe_height_m,
            schema => PLAN_SCHEMA.trim(),
        })
    }

    /// Instruction followed by every prior critique, numbered in attempt order.
    pub fn planner_user(
        &self,
        instruction: &str,
        history: &[Critique],
    ) -> Result<String, minijinja::Error> {
        self.env.get_template("planner_user")?.render(context! {
            instruction => instruction.trim(),
            history => history,
        })
    }

    pub fn critic_system(&self) -> Result<String, minijinja::Error> {
        self.env.get_template("critic_system")?.render(context! {
            schema => CRITIQUE_SCHEMA.trim(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_user_without_history_is_just_instruction() {
        let engine = PromptEngine::new();
        let rendered = engine.planner_user("pick up the cube", &[]).expect("render");
        assert_eq!(rendered, "Instruction: pick up the cube");
    }

    #[test]
    fn planner_user_lists_history_in_order() {
        let engine = PromptEngine::new();
        let history = vec![
            Critique::new("Gripper stayed open.", "Close the gripper."),
            Critique::new("Grip too weak.", "Use force 100."),
        ];
        let rendered = engine
            .planner_user("pick up the cube", &history)
            .expect("render");

        let expected = "Instruction: pick up the cube\n\n\
PREVIOUS ATTEMPTS & FEEDBACK:\n\
Attempt 1 Diagnosis: Gripper stayed open.\n\
Attempt 1 Suggestion: Close the gripper.\n\
Attempt 2 Diagnosis: Grip too weak.\n\
Attempt 2 Suggestion: Use force 100.";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn planner_system_embeds_schema_and_safe_height() {
        let engine = PromptEngine::new();
        let rendered = engine.planner_system(0.3).expect("render");
        assert!(rendered.contains("z=0.3"));
        assert!(rendered.contains("\"CLOSE_GRIPPER\""));
        assert!(rendered.contains("\"plan_id\""));
    }

    #[test]
    fn critic_system_names_failure_modes() {
        let engine = PromptEngine::new();
        let rendered = engine.critic_system().expect("render");
        for mode in ["MISSED_GRASP", "GRASP_SLIP", "UNSTABLE_LIFT"] {
            assert!(rendered.contains(mode), "missing {mode}");
        }
        assert!(rendered.contains("\"diagnosis\""));
    }
}
