use async_trait::async_trait;

use crate::error::Result;

/// One non-streaming completion round against a chat model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}
