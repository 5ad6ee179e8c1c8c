pub mod types;
pub mod yahoo;

use anyhow::Result;

use crate::error::DataUnavailable;
use crate::market::types::{Fundamentals, NewsItem, RecommendationRow, TickerBundle};

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Latest close. Fails with `DataUnavailable` when there is no recent
    /// trading data for the symbol.
    async fn get_price(&self, symbol: &str) -> Result<f64>;

    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals>;

    /// Up to five rows, most recent first; `None` when the provider has none.
    async fn get_recommendations(&self, symbol: &str) -> Result<Option<Vec<RecommendationRow>>>;

    /// Up to three headlines.
    async fn get_news(&self, symbol: &str) -> Result<Vec<NewsItem>>;

    async fn ticker_bundle(&self, symbol: &str) -> Result<TickerBundle> {
        let symbol = normalize_symbol(symbol)?;

        let current_price = self.get_price(&symbol).await?;
        let fundamentals = self.get_fundamentals(&symbol).await?;
        let recommendations = self.get_recommendations(&symbol).await?;
        let news = self.get_news(&symbol).await?;

        tracing::debug!(
            %symbol,
            provider = self.provider_name(),
            current_price,
            has_balance_sheet = fundamentals.balance_sheet.is_some(),
            has_cash_flow = fundamentals.cash_flow.is_some(),
            has_earnings = fundamentals.earnings.is_some(),
            recommendations = recommendations.as_ref().map_or(0, Vec::len),
            news = news.len(),
            "ticker data collected"
        );

        Ok(TickerBundle::new(
            symbol,
            current_price,
            fundamentals.key_metrics,
            recommendations,
            news,
        ))
    }
}

pub fn normalize_symbol(symbol: &str) -> Result<String> {
    let symbol = symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(DataUnavailable::new("<empty>", "symbol must be non-empty").into());
    }
    Ok(symbol)
}
