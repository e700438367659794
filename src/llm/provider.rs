use async_trait::async_trait;

use crate::errors::PilotResult;
use crate::llm::types::DecisionRequest;

/// Capability: the external multimodal decision service.
///
/// Returns the model's raw text. Network, authentication and quota
/// failures come back as [`crate::errors::PilotError::Transport`] or
/// [`crate::errors::PilotError::Http`]; deadlines are the implementation's
/// concern.
#[async_trait]
pub trait DecisionTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: DecisionRequest) -> PilotResult<String>;
}
