pub mod groq;

use crate::prompt::Conversation;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Groq,
}

#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Sends the conversation and returns the text of the first choice.
    async fn complete(&self, conversation: Conversation, temperature: f32)
        -> anyhow::Result<String>;
}
