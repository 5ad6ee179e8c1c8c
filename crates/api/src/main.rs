use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finsight_core::llm::groq::GroqClient;
use finsight_core::market::yahoo::YahooFinanceClient;
use finsight_core::search::DuckDuckGoClient;
use finsight_core::shell::Assistant;

mod routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = finsight_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    if settings.groq_api_key.is_none() {
        tracing::warn!("GROQ_API_KEY is not set; every flow will fail at the completion step");
    }

    let market = YahooFinanceClient::from_settings(&settings)?;
    let search = DuckDuckGoClient::from_settings(&settings)?;
    let llm = GroqClient::from_settings(&settings)?;
    tracing::info!(model = llm.model(), "completion client ready");

    let assistant = Assistant::new(Arc::new(market), Arc::new(search), Arc::new(llm));
    let app = routes::router(routes::AppState { assistant });

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(%addr, "assistant listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &finsight_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
