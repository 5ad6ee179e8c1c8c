use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pulldown_cmark::{html, Event, Options, Parser};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use finsight_core::shell::{Assistant, Flow, FlowInput, FlowOutcome};

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct AppState {
    pub assistant: Assistant,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/api/financial", post(run_financial))
        .route("/api/search", post(run_search))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct FinancialRequest {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    query: String,
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum FlowResponse {
    Rendered { markdown: String, html: String },
    Failed { message: &'static str },
    Inert,
}

impl IntoResponse for FlowResponse {
    fn into_response(self) -> Response {
        let status = match self {
            FlowResponse::Inert => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::OK,
        };
        (status, Json(self)).into_response()
    }
}

async fn run_financial(
    State(state): State<AppState>,
    Json(req): Json<FinancialRequest>,
) -> FlowResponse {
    let input = FlowInput::Financial {
        symbol: req.symbol,
        query: req.query,
    };
    run_flow(&state.assistant, input).await
}

async fn run_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> FlowResponse {
    run_flow(&state.assistant, FlowInput::Search { query: req.query }).await
}

// Each request is one complete flow; nothing carries over between requests.
async fn run_flow(assistant: &Assistant, input: FlowInput) -> FlowResponse {
    let mut flow = Flow::new(input.kind());
    match assistant.run(&mut flow, input).await {
        FlowOutcome::Rendered { markdown } => {
            let html = render_markdown(&markdown);
            FlowResponse::Rendered { markdown, html }
        }
        FlowOutcome::Failed { message, error } => {
            sentry_anyhow::capture_anyhow(&error);
            FlowResponse::Failed { message }
        }
        FlowOutcome::Inert => FlowResponse::Inert,
    }
}

/// Model output is untrusted: raw HTML in it is shown as text.
fn render_markdown(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let events = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}
