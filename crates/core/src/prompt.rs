//! Turns a fetched data bundle plus the user's question into the two-message
//! conversation sent to the language model.

use serde::Serialize;

pub const FINANCIAL_ANALYST_INSTRUCTION: &str = "You are a financial analysis AI. \
Analyze the provided financial data and respond with insights.\n\
Focus on the most important metrics and recent trends. \
Use markdown formatting for tables and structure your response clearly.";

pub const WEB_SEARCH_ANALYST_INSTRUCTION: &str = "You are a web search analysis AI. \
Analyze the search results and provide a comprehensive response.\n\
Always include sources and use markdown formatting.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Exactly one system message followed by one user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Conversation([ChatMessage; 2]);

impl Conversation {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self([
            ChatMessage {
                role: Role::System,
                content: system.into(),
            },
            ChatMessage {
                role: Role::User,
                content: user.into(),
            },
        ])
    }

    pub fn messages(&self) -> &[ChatMessage; 2] {
        &self.0
    }

    pub fn system(&self) -> &str {
        &self.0[0].content
    }

    pub fn user(&self) -> &str {
        &self.0[1].content
    }
}

/// Anything that can be placed into a prompt: it serializes itself and knows
/// how to introduce itself to the model.
pub trait PromptSubject: Serialize {
    fn framing(&self) -> String;
}

pub fn compose<S: PromptSubject + ?Sized>(
    instruction: &str,
    subject: &S,
    query: &str,
) -> anyhow::Result<Conversation> {
    let data = serde_json::to_string(subject)?;
    let user = format!("{}: {data}. Query: {query}", subject.framing());
    Ok(Conversation::new(instruction, user))
}
