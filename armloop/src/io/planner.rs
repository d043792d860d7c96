//! Planning service: instruction + critique history in, raw plan JSON out.

use tracing::{debug, info, instrument};

use crate::core::history::Critique;
use crate::io::llm::{ChatClient, ChatRequest, ServiceError};
use crate::io::prompt::PromptEngine;

/// Abstraction over plan producers.
///
/// Implementations return the raw payload; validation is the caller's job.
pub trait PlanningService {
    fn propose(&self, instruction: &str, history: &[Critique]) -> Result<String, ServiceError>;
}

/// Planner backed by a chat-completion model.
pub struct LlmPlanner<C> {
    client: C,
    prompts: PromptEngine,
    safe_height_m: f64,
    temperature: f64,
}

impl<C: ChatClient> LlmPlanner<C> {
    pub fn new(client: C, safe_height_m: f64, temperature: f64) -> Self {
        Self {
            client,
            prompts: PromptEngine::new(),
            safe_height_m,
            temperature,
        }
    }
}

impl<C: ChatClient> PlanningService for LlmPlanner<C> {
    #[instrument(skip_all, fields(history_len = history.len()))]
    fn propose(&self, instruction: &str, history: &[Critique]) -> Result<String, ServiceError> {
        info!(instruction, "requesting plan");
        let system = self
            .prompts
            .planner_system(self.safe_height_m)
            .map_err(|err| ServiceError::Prompt(err.to_string()))?;
        let user = self
            .prompts
            .planner_user(instruction, history)
            .map_err(|err| ServiceError::Prompt(err.to_string()))?;

        let raw = self.client.complete(&ChatRequest {
            system: &system,
            user: &user,
            temperature: Some(self.temperature),
        })?;
        debug!(bytes = raw.len(), "plan received");
        Ok(raw)
    }
}
