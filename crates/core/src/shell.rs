//! Flow state machine behind the two panels: take input, fetch, compose,
//! complete, render. Failures never leave a flow; they become a fixed message.

use std::sync::Arc;

use crate::llm::{CompletionClient, DEFAULT_TEMPERATURE};
use crate::market::MarketDataProvider;
use crate::prompt::{self, FINANCIAL_ANALYST_INSTRUCTION, WEB_SEARCH_ANALYST_INSTRUCTION};
use crate::search::SearchProvider;

pub const FINANCIAL_FALLBACK_MESSAGE: &str =
    "Unable to process financial data. Please try a different stock symbol or query.";
pub const SEARCH_FALLBACK_MESSAGE: &str =
    "Unable to complete the web search. Please try a different query.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Financial,
    Search,
}

impl FlowKind {
    pub fn fallback_message(self) -> &'static str {
        match self {
            FlowKind::Financial => FINANCIAL_FALLBACK_MESSAGE,
            FlowKind::Search => SEARCH_FALLBACK_MESSAGE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlowKind::Financial => "financial",
            FlowKind::Search => "search",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    AwaitingInput,
    Fetching,
    Rendering,
}

#[derive(Debug, Clone)]
pub enum FlowInput {
    Financial { symbol: String, query: String },
    Search { query: String },
}

impl FlowInput {
    pub fn kind(&self) -> FlowKind {
        match self {
            FlowInput::Financial { .. } => FlowKind::Financial,
            FlowInput::Search { .. } => FlowKind::Search,
        }
    }

    /// All required inputs are present.
    pub fn is_ready(&self) -> bool {
        match self {
            FlowInput::Financial { symbol, query } => {
                !symbol.trim().is_empty() && !query.trim().is_empty()
            }
            FlowInput::Search { query } => !query.trim().is_empty(),
        }
    }
}

#[derive(Debug)]
pub enum FlowOutcome {
    /// The trigger was inert: inputs were missing, nothing was fetched.
    Inert,
    Rendered { markdown: String },
    /// `message` is what the user sees; `error` is for logs only.
    Failed {
        message: &'static str,
        error: anyhow::Error,
    },
}

/// One panel's flow. Starts `Idle` and keeps every state it passed through.
#[derive(Debug, Clone)]
pub struct Flow {
    kind: FlowKind,
    state: FlowState,
    history: Vec<FlowState>,
}

impl Flow {
    pub fn new(kind: FlowKind) -> Self {
        Self {
            kind,
            state: FlowState::Idle,
            history: vec![FlowState::Idle],
        }
    }

    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn history(&self) -> &[FlowState] {
        &self.history
    }

    fn transition(&mut self, next: FlowState) {
        tracing::trace!(flow = self.kind.as_str(), from = ?self.state, to = ?next, "flow transition");
        self.state = next;
        self.history.push(next);
    }
}

#[derive(Clone)]
pub struct Assistant {
    market: Arc<dyn MarketDataProvider>,
    search: Arc<dyn SearchProvider>,
    llm: Arc<dyn CompletionClient>,
}

impl Assistant {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn CompletionClient>,
    ) -> Self {
        Self {
            market,
            search,
            llm,
        }
    }

    pub async fn run(&self, flow: &mut Flow, input: FlowInput) -> FlowOutcome {
        if input.kind() != flow.kind() {
            tracing::warn!(
                flow = flow.kind().as_str(),
                input = input.kind().as_str(),
                "input does not belong to this flow; ignoring"
            );
            return FlowOutcome::Inert;
        }

        if flow.state() != FlowState::AwaitingInput {
            flow.transition(FlowState::AwaitingInput);
        }
        if !input.is_ready() {
            return FlowOutcome::Inert;
        }

        let flow_id = uuid::Uuid::new_v4();
        let kind = flow.kind();
        flow.transition(FlowState::Fetching);
        tracing::info!(%flow_id, flow = kind.as_str(), "flow started");

        let result = match input {
            FlowInput::Financial { symbol, query } => self.financial(&symbol, &query).await,
            FlowInput::Search { query } => self.web_search(&query).await,
        };

        match result {
            Ok(markdown) => {
                flow.transition(FlowState::Rendering);
                tracing::info!(%flow_id, flow = kind.as_str(), chars = markdown.len(), "flow rendered");
                flow.transition(FlowState::Idle);
                FlowOutcome::Rendered { markdown }
            }
            Err(error) => {
                tracing::error!(%flow_id, flow = kind.as_str(), error = %error, "flow failed");
                flow.transition(FlowState::Idle);
                FlowOutcome::Failed {
                    message: kind.fallback_message(),
                    error,
                }
            }
        }
    }

    async fn financial(&self, symbol: &str, query: &str) -> anyhow::Result<String> {
        let bundle = self.market.ticker_bundle(symbol).await?;
        let conversation = prompt::compose(FINANCIAL_ANALYST_INSTRUCTION, &bundle, query)?;
        drop(bundle);
        self.llm.complete(conversation, DEFAULT_TEMPERATURE).await
    }

    async fn web_search(&self, query: &str) -> anyhow::Result<String> {
        let results = self
            .search
            .search(query, self.search.default_max_results())
            .await?;
        let conversation = prompt::compose(WEB_SEARCH_ANALYST_INSTRUCTION, &results, query)?;
        self.llm.complete(conversation, DEFAULT_TEMPERATURE).await
    }
}
