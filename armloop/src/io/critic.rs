//! Critique service: failed-attempt evidence in, raw critique JSON out.

use serde::Serialize;
use tracing::{info, instrument};

use crate::core::plan::Action;
use crate::core::types::{FailureReason, Metrics};
use crate::io::llm::{ChatClient, ChatRequest, ServiceError};
use crate::io::prompt::PromptEngine;

/// Evidence packet describing one failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CritiqueRequest {
    pub instruction: String,
    pub failure_reason: FailureReason,
    pub metrics: Metrics,
    /// Steps that actually ran; a prefix of the plan when execution aborted.
    pub executed_steps: Vec<Action>,
    /// Full plan, sent only when execution aborted before the last step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_steps: Option<Vec<Action>>,
    /// Why execution stopped early, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

/// Abstraction over critique producers.
pub trait CritiqueService {
    fn critique(&self, request: &CritiqueRequest) -> Result<String, ServiceError>;
}

/// Critic backed by a chat-completion model.
pub struct LlmCritic<C> {
    client: C,
    prompts: PromptEngine,
}

impl<C: ChatClient> LlmCritic<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            prompts: PromptEngine::new(),
        }
    }
}

impl<C: ChatClient> CritiqueService for LlmCritic<C> {
    #[instrument(skip_all, fields(failure_reason = %request.failure_reason))]
    fn critique(&self, request: &CritiqueRequest) -> Result<String, ServiceError> {
        info!("requesting critique");
        let system = self
            .prompts
            .critic_system()
            .map_err(|err| ServiceError::Prompt(err.to_string()))?;
        let user = serde_json::to_string(request)
            .map_err(|err| ServiceError::Prompt(format!("serialize evidence: {err}")))?;
        self.client.complete(&ChatRequest {
            system: &system,
            user: &user,
            temperature: None,
        })
    }
}
