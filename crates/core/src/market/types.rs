use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::prompt::PromptSubject;

pub const MAX_RECOMMENDATIONS: usize = 5;
pub const MAX_NEWS_ITEMS: usize = 3;

/// Fixed subset of quote metrics. Every key is always serialized; a metric
/// the provider did not report is `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyMetrics {
    #[serde(rename = "marketCap")]
    pub market_cap: Option<f64>,
    #[serde(rename = "forwardPE")]
    pub forward_pe: Option<f64>,
    #[serde(rename = "dividendYield")]
    pub dividend_yield: Option<f64>,
    #[serde(rename = "fiftyTwoWeekHigh")]
    pub fifty_two_week_high: Option<f64>,
    #[serde(rename = "fiftyTwoWeekLow")]
    pub fifty_two_week_low: Option<f64>,
    #[serde(rename = "trailingEps")]
    pub trailing_eps: Option<f64>,
    pub sector: Option<String>,
    pub industry: Option<String>,
}

/// One column of a financial statement: its end date and the line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementColumn {
    pub end_date: Option<NaiveDate>,
    pub items: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsRecord {
    /// Fiscal year as reported; absent when the provider omits it.
    pub period: Option<String>,
    pub revenue: Option<f64>,
    pub earnings: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub key_metrics: KeyMetrics,
    pub balance_sheet: Option<StatementColumn>,
    pub cash_flow: Option<StatementColumn>,
    pub earnings: Option<EarningsRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRow {
    pub period: String,
    #[serde(default)]
    pub strong_buy: u32,
    #[serde(default)]
    pub buy: u32,
    #[serde(default)]
    pub hold: u32,
    #[serde(default)]
    pub sell: u32,
    #[serde(default)]
    pub strong_sell: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub publisher: String,
}

/// Everything the financial prompt needs about one ticker. Built per request
/// and dropped once the conversation is composed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerBundle {
    symbol: String,
    current_price: f64,
    key_metrics: KeyMetrics,
    recent_news: Vec<NewsItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recent_recommendations: Option<Vec<RecommendationRow>>,
}

impl TickerBundle {
    pub fn new(
        symbol: impl Into<String>,
        current_price: f64,
        key_metrics: KeyMetrics,
        recommendations: Option<Vec<RecommendationRow>>,
        mut news: Vec<NewsItem>,
    ) -> Self {
        news.truncate(MAX_NEWS_ITEMS);
        let recent_recommendations = recommendations
            .map(|mut rows| {
                rows.truncate(MAX_RECOMMENDATIONS);
                rows
            })
            .filter(|rows| !rows.is_empty());

        Self {
            symbol: symbol.into(),
            current_price,
            key_metrics,
            recent_news: news,
            recent_recommendations,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn current_price(&self) -> f64 {
        self.current_price
    }

    pub fn key_metrics(&self) -> &KeyMetrics {
        &self.key_metrics
    }

    pub fn recent_recommendations(&self) -> Option<&[RecommendationRow]> {
        self.recent_recommendations.as_deref()
    }

    pub fn recent_news(&self) -> &[NewsItem] {
        &self.recent_news
    }
}

impl PromptSubject for TickerBundle {
    fn framing(&self) -> String {
        format!("Analyze this data for {}", self.symbol)
    }
}
