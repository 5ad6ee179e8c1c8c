use crate::config::Settings;
use crate::error::CompletionError;
use crate::llm::{CompletionClient, Provider};
use crate::prompt::Conversation;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

const CHAT_COMPLETIONS_PATH: &str = "/openai/v1/chat/completions";

/// Chat client for Groq's OpenAI-compatible endpoint. The credential is kept
/// optional here and only checked when a completion is requested.
#[derive(Debug, Clone)]
pub struct GroqClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl GroqClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key: settings.groq_api_key.clone(),
            base_url: settings.groq_base_url.clone(),
            model: settings.groq_model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!(
            "{}{CHAT_COMPLETIONS_PATH}",
            self.base_url.trim_end_matches('/')
        )
    }

    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let api_key = self.api_key.as_deref().ok_or(crate::error::ConfigurationError {
            key: "GROQ_API_KEY",
        })?;

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
            diagnostics("request", format!("invalid credential header: {e}"), None)
        })?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }

    fn request<'a>(&'a self, conversation: &'a Conversation, temperature: f32) -> ChatRequest<'a> {
        ChatRequest {
            messages: conversation,
            model: &self.model,
            temperature,
        }
    }

    fn first_choice_text(text: &str) -> anyhow::Result<String> {
        let raw_json = serde_json::from_str::<serde_json::Value>(text).map_err(|e| {
            diagnostics("decode", format!("response is not JSON: {e}"), Some(text))
        })?;
        let parsed = serde_json::from_value::<ChatResponse>(raw_json.clone()).map_err(|e| {
            CompletionError {
                provider: Provider::Groq,
                stage: "decode",
                detail: format!("unexpected response shape: {e}"),
                raw_output: Some(text.to_string()),
                raw_response_json: Some(raw_json.clone()),
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);

        match content {
            Some(content) => Ok(content),
            None => Err(CompletionError {
                provider: Provider::Groq,
                stage: "empty",
                detail: "response carried no message content".to_string(),
                raw_output: Some(text.to_string()),
                raw_response_json: Some(raw_json),
            }
            .into()),
        }
    }
}

fn diagnostics(stage: &'static str, detail: String, raw: Option<&str>) -> CompletionError {
    CompletionError {
        provider: Provider::Groq,
        stage,
        detail,
        raw_output: raw.map(str::to_string),
        raw_response_json: None,
    }
}

#[async_trait::async_trait]
impl CompletionClient for GroqClient {
    fn provider(&self) -> Provider {
        Provider::Groq
    }

    async fn complete(
        &self,
        conversation: Conversation,
        temperature: f32,
    ) -> anyhow::Result<String> {
        let headers = self.headers()?;
        let req = self.request(&conversation, temperature);

        tracing::debug!(model = %self.model, temperature, "sending chat completion");

        let res = self
            .http
            .post(self.url())
            .headers(headers)
            .json(&req)
            .send()
            .await
            .map_err(|e| diagnostics("http", format!("request failed: {e}"), None))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| diagnostics("http", format!("failed to read body: {e}"), None))?;

        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(CompletionError {
                provider: Provider::Groq,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let content = Self::first_choice_text(&text)?;
        tracing::debug!(model = %self.model, chars = content.len(), "chat completion received");
        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a Conversation,
    model: &'a str,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
