//! Failure kinds raised inside a flow. They travel inside `anyhow::Error` and
//! are recovered with `downcast_ref` where the kind matters (logging, tests).

use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

/// The provider answered but had nothing usable for this symbol or query.
#[derive(Debug, Clone)]
pub struct DataUnavailable {
    pub subject: String,
    pub reason: String,
}

impl DataUnavailable {
    pub fn new(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DataUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data unavailable for {}: {}", self.subject, self.reason)
    }
}

impl std::error::Error for DataUnavailable {}

#[derive(Debug, Clone)]
pub struct CompletionError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "completion error (provider={:?}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for CompletionError {}

/// A required setting was absent. Raised lazily by the component needing it.
#[derive(Debug, Clone)]
pub struct ConfigurationError {
    pub key: &'static str,
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is required", self.key)
    }
}

impl std::error::Error for ConfigurationError {}
