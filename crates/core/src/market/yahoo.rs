use crate::config::Settings;
use crate::error::DataUnavailable;
use crate::market::types::{
    EarningsRecord, Fundamentals, KeyMetrics, NewsItem, RecommendationRow, StatementColumn,
    MAX_NEWS_ITEMS, MAX_RECOMMENDATIONS,
};
use crate::market::MarketDataProvider;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use yahoo_finance_api as yahoo;

const CLIENT_USER_AGENT: &str = "Mozilla/5.0 (compatible; finsight/0.1)";

const FUNDAMENTAL_MODULES: &str = "summaryDetail,defaultKeyStatistics,assetProfile,\
balanceSheetHistory,cashflowStatementHistory,earnings";
const RECOMMENDATION_MODULES: &str = "recommendationTrend";

// Statement entries that are bookkeeping rather than line items.
const STATEMENT_META_KEYS: [&str; 2] = ["maxAge", "endDate"];

/// Market data from Yahoo Finance. Prices come through `yahoo_finance_api`;
/// quoteSummary and news are read from the JSON endpoints with a cookie
/// session and a crumb that is fetched once and refreshed on rejection.
#[derive(Clone)]
pub struct YahooFinanceClient {
    http: reqwest::Client,
    quotes: Arc<yahoo::YahooConnector>,
    base_url: String,
    cookie_url: String,
    crumb: Arc<Mutex<Option<String>>>,
}

enum Fetched<T> {
    Found(T),
    NotFound(String),
    Unauthorized(String),
}

impl YahooFinanceClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .context("failed to build market data http client")?;

        let quotes = yahoo::YahooConnector::new()
            .map_err(|e| anyhow::anyhow!("failed to build quote connector: {e}"))?;

        Ok(Self {
            http,
            quotes: Arc::new(quotes),
            base_url: settings.yahoo_base_url.clone(),
            cookie_url: settings.yahoo_cookie_url.clone(),
            crumb: Arc::new(Mutex::new(None)),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("invalid market data base url: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("market data base url cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch<T: DeserializeOwned>(&self, url: Url, query: &[(&str, &str)]) -> Result<Fetched<T>> {
        let res = self
            .http
            .get(url.clone())
            .query(query)
            .send()
            .await
            .with_context(|| format!("market data request failed: {url}"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;

        match status {
            StatusCode::NOT_FOUND => return Ok(Fetched::NotFound(text)),
            StatusCode::UNAUTHORIZED => return Ok(Fetched::Unauthorized(text)),
            s if !s.is_success() => anyhow::bail!("market data HTTP {status} from {url}: {text}"),
            _ => {}
        }

        let parsed = serde_json::from_str::<T>(&text)
            .with_context(|| format!("market data response has unexpected shape: {text}"))?;
        Ok(Fetched::Found(parsed))
    }

    fn cached_crumb(&self) -> Option<String> {
        self.crumb
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the session crumb, running the cookie handshake when there is
    /// none cached or `refresh` is set.
    async fn crumb(&self, refresh: bool) -> Result<String> {
        if !refresh {
            if let Some(crumb) = self.cached_crumb() {
                return Ok(crumb);
            }
        }

        // The cookie host answers with an error status but still sets the cookie.
        let res = self
            .http
            .get(self.cookie_url.as_str())
            .send()
            .await
            .with_context(|| format!("market data cookie request failed: {}", self.cookie_url))?;
        tracing::debug!(status = %res.status(), "market data session cookie requested");

        let url = self.endpoint(&["v1", "test", "getcrumb"])?;
        let res = self
            .http
            .get(url)
            .send()
            .await
            .context("market data crumb request failed")?;
        let status = res.status();
        let text = res.text().await.context("failed to read crumb response")?;

        let crumb = text.trim();
        if !status.is_success() || crumb.is_empty() || crumb.contains(char::is_whitespace) || crumb.contains('<') {
            anyhow::bail!("market data crumb unavailable (HTTP {status}): {text}");
        }

        *self.crumb.lock().unwrap_or_else(PoisonError::into_inner) = Some(crumb.to_string());
        tracing::debug!(refresh, "market data crumb acquired");
        Ok(crumb.to_string())
    }

    async fn quote_summary(&self, symbol: &str, modules: &str) -> Result<Option<SummaryResult>> {
        let url = self.endpoint(&["v10", "finance", "quoteSummary", symbol])?;
        let mut refresh = false;
        loop {
            let crumb = self.crumb(refresh).await?;
            let query = [("modules", modules), ("crumb", crumb.as_str())];
            match self.fetch::<QuoteSummaryResponse>(url.clone(), &query).await? {
                Fetched::Found(res) => {
                    return Ok(res.quote_summary.result.into_iter().flatten().next())
                }
                Fetched::NotFound(body) => {
                    tracing::warn!(%symbol, modules, body = %body, "quoteSummary returned not found");
                    return Ok(None);
                }
                Fetched::Unauthorized(body) if !refresh => {
                    tracing::info!(%symbol, body = %body, "crumb rejected; refreshing session");
                    refresh = true;
                }
                Fetched::Unauthorized(body) => {
                    anyhow::bail!("market data HTTP 401 for {symbol} after crumb refresh: {body}")
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for YahooFinanceClient {
    fn provider_name(&self) -> &'static str {
        "yahoo_finance"
    }

    async fn get_price(&self, symbol: &str) -> Result<f64> {
        let close = self
            .quotes
            .get_latest_quotes(symbol, "1d")
            .await
            .and_then(|res| res.last_quote())
            .map(|quote| quote.close);
        checked_price(symbol, close)
    }

    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
        let summary = self.quote_summary(symbol, FUNDAMENTAL_MODULES).await?;
        Ok(summary.map(fundamentals_from_summary).unwrap_or_default())
    }

    async fn get_recommendations(&self, symbol: &str) -> Result<Option<Vec<RecommendationRow>>> {
        let summary = self.quote_summary(symbol, RECOMMENDATION_MODULES).await?;
        let rows = summary
            .and_then(|s| s.recommendation_trend)
            .map(|t| t.trend)
            .unwrap_or_default();
        Ok(most_recent_recommendations(rows))
    }

    async fn get_news(&self, symbol: &str) -> Result<Vec<NewsItem>> {
        let url = self.endpoint(&["v1", "finance", "search"])?;
        let news_count = MAX_NEWS_ITEMS.to_string();
        let query = [
            ("q", symbol),
            ("quotesCount", "0"),
            ("newsCount", news_count.as_str()),
        ];
        match self.fetch::<SearchResponse>(url, &query).await? {
            Fetched::Found(res) => Ok(news_items(res.news)),
            Fetched::NotFound(_) => Ok(Vec::new()),
            Fetched::Unauthorized(body) => anyhow::bail!("market data HTTP 401 for news on {symbol}: {body}"),
        }
    }
}

/// The connector reports an unknown symbol, an empty history and a missing
/// close all as errors; each of them means there is no price to show.
fn checked_price<E: std::fmt::Display>(symbol: &str, close: std::result::Result<f64, E>) -> Result<f64> {
    let price = close.map_err(|e| {
        tracing::warn!(%symbol, error = %e, "latest quote unavailable");
        DataUnavailable::new(symbol, e.to_string())
    })?;
    if !price.is_finite() || price <= 0.0 {
        return Err(DataUnavailable::new(symbol, format!("no usable closing price ({price})")).into());
    }
    Ok(price)
}

fn fundamentals_from_summary(summary: SummaryResult) -> Fundamentals {
    let detail = summary.summary_detail.unwrap_or_default();
    let stats = summary.default_key_statistics.unwrap_or_default();
    let profile = summary.asset_profile.unwrap_or_default();

    let key_metrics = KeyMetrics {
        market_cap: raw_number(&detail, "marketCap"),
        forward_pe: raw_number(&detail, "forwardPE").or_else(|| raw_number(&stats, "forwardPE")),
        dividend_yield: raw_number(&detail, "dividendYield"),
        fifty_two_week_high: raw_number(&detail, "fiftyTwoWeekHigh"),
        fifty_two_week_low: raw_number(&detail, "fiftyTwoWeekLow"),
        trailing_eps: raw_number(&stats, "trailingEps"),
        sector: profile.sector.filter(|s| !s.is_empty()),
        industry: profile.industry.filter(|s| !s.is_empty()),
    };

    let balance_sheet = summary
        .balance_sheet_history
        .and_then(|h| h.balance_sheet_statements.into_iter().next())
        .map(statement_column);
    let cash_flow = summary
        .cashflow_statement_history
        .and_then(|h| h.cashflow_statements.into_iter().next())
        .map(statement_column);
    let earnings = summary
        .earnings
        .and_then(|e| e.financials_chart)
        .and_then(|c| c.yearly.into_iter().last())
        .map(|y| EarningsRecord {
            period: match y.date {
                Value::String(s) if !s.is_empty() => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            },
            revenue: y.revenue.and_then(|v| v.raw),
            earnings: y.earnings.and_then(|v| v.raw),
        });

    Fundamentals {
        key_metrics,
        balance_sheet,
        cash_flow,
        earnings,
    }
}

/// Reads `{"raw": n, "fmt": ".."}` style fields as well as bare numbers.
fn raw_number(module: &Map<String, Value>, key: &str) -> Option<f64> {
    match module.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::Object(o) => o.get("raw").and_then(Value::as_f64),
        _ => None,
    }
}

fn statement_column(statement: Map<String, Value>) -> StatementColumn {
    let end_date = raw_number(&statement, "endDate")
        .and_then(|ts| chrono::DateTime::from_timestamp(ts as i64, 0))
        .map(|dt| dt.date_naive());

    let items: BTreeMap<String, f64> = statement
        .keys()
        .filter(|k| !STATEMENT_META_KEYS.contains(&k.as_str()))
        .filter_map(|k| raw_number(&statement, k).map(|v| (k.clone(), v)))
        .collect();

    StatementColumn { end_date, items }
}

/// Orders rows by their month offset ("0m", "-1m", ...), most recent first,
/// and keeps at most `MAX_RECOMMENDATIONS`.
fn most_recent_recommendations(mut rows: Vec<RecommendationRow>) -> Option<Vec<RecommendationRow>> {
    if rows.is_empty() {
        return None;
    }
    rows.sort_by_key(|row| std::cmp::Reverse(month_offset(&row.period)));
    rows.truncate(MAX_RECOMMENDATIONS);
    Some(rows)
}

fn month_offset(period: &str) -> Option<i32> {
    period.trim().strip_suffix('m')?.parse::<i32>().ok()
}

fn news_items(raw: Vec<RawNews>) -> Vec<NewsItem> {
    raw.into_iter()
        .filter(|n| !n.title.trim().is_empty())
        .take(MAX_NEWS_ITEMS)
        .map(|n| {
            if let Some(ts) = n
                .provider_publish_time
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            {
                tracing::trace!(title = %n.title, published_at = %ts, "news item");
            }
            NewsItem {
                title: n.title,
                publisher: n.publisher,
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryBody {
    #[serde(default)]
    result: Option<Vec<SummaryResult>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    #[serde(default)]
    summary_detail: Option<Map<String, Value>>,
    #[serde(default)]
    default_key_statistics: Option<Map<String, Value>>,
    #[serde(default)]
    asset_profile: Option<AssetProfile>,
    #[serde(default)]
    balance_sheet_history: Option<BalanceSheetHistory>,
    #[serde(default)]
    cashflow_statement_history: Option<CashflowStatementHistory>,
    #[serde(default)]
    earnings: Option<EarningsModule>,
    #[serde(default)]
    recommendation_trend: Option<RecommendationTrend>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetProfile {
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    industry: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceSheetHistory {
    #[serde(default)]
    balance_sheet_statements: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CashflowStatementHistory {
    #[serde(default)]
    cashflow_statements: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EarningsModule {
    #[serde(default)]
    financials_chart: Option<FinancialsChart>,
}

#[derive(Debug, Deserialize)]
struct FinancialsChart {
    #[serde(default)]
    yearly: Vec<YearlyEarnings>,
}

#[derive(Debug, Deserialize)]
struct YearlyEarnings {
    #[serde(default)]
    date: Value,
    #[serde(default)]
    revenue: Option<RawValue>,
    #[serde(default)]
    earnings: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RecommendationTrend {
    #[serde(default)]
    trend: Vec<RecommendationRow>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news: Vec<RawNews>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNews {
    #[serde(default)]
    title: String,
    #[serde(default)]
    publisher: String,
    #[serde(default)]
    provider_publish_time: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn summary(v: Value) -> SummaryResult {
        serde_json::from_value::<QuoteSummaryResponse>(json!({"quoteSummary": {"result": [v], "error": null}}))
            .unwrap()
            .quote_summary
            .result
            .unwrap()
            .remove(0)
    }

    #[test]
    fn quote_close_is_the_price() {
        let price = checked_price::<&str>("AAPL", Ok(189.5)).unwrap();
        assert_eq!(price, 189.5);
    }

    #[test]
    fn connector_error_is_data_unavailable() {
        let err = checked_price("ZZZZ999", Err("No data found, symbol may be delisted")).unwrap_err();
        let du = err.downcast_ref::<DataUnavailable>().unwrap();
        assert_eq!(du.subject, "ZZZZ999");
        assert_eq!(du.reason, "No data found, symbol may be delisted");
    }

    #[test]
    fn non_finite_close_is_data_unavailable() {
        for close in [f64::NAN, f64::INFINITY, 0.0] {
            let err = checked_price::<&str>("X", Ok(close)).unwrap_err();
            assert!(err.downcast_ref::<DataUnavailable>().is_some(), "{close}");
        }
    }

    #[test]
    fn fundamentals_mark_missing_metrics_absent() {
        let s = summary(json!({
            "summaryDetail": {
                "marketCap": {"raw": 2.9e12, "fmt": "2.9T"},
                "dividendYield": {},
                "fiftyTwoWeekHigh": {"raw": 199.62, "fmt": "199.62"}
            },
            "defaultKeyStatistics": {"trailingEps": {"raw": 6.13}},
            "assetProfile": {"sector": "Technology"}
        }));
        let f = fundamentals_from_summary(s);
        assert_eq!(f.key_metrics.market_cap, Some(2.9e12));
        assert_eq!(f.key_metrics.dividend_yield, None);
        assert_eq!(f.key_metrics.forward_pe, None);
        assert_eq!(f.key_metrics.fifty_two_week_high, Some(199.62));
        assert_eq!(f.key_metrics.trailing_eps, Some(6.13));
        assert_eq!(f.key_metrics.sector.as_deref(), Some("Technology"));
        assert_eq!(f.key_metrics.industry, None);
        assert!(f.balance_sheet.is_none());
        assert!(f.cash_flow.is_none());
        assert!(f.earnings.is_none());
    }

    #[test]
    fn empty_statement_lists_do_not_fail() {
        let s = summary(json!({
            "balanceSheetHistory": {"balanceSheetStatements": []},
            "cashflowStatementHistory": {"cashflowStatements": []},
            "earnings": {"financialsChart": {"yearly": []}}
        }));
        let f = fundamentals_from_summary(s);
        assert_eq!(f, Fundamentals::default());
    }

    #[test]
    fn takes_most_recent_statement_and_earnings() {
        let s = summary(json!({
            "balanceSheetHistory": {"balanceSheetStatements": [
                {"maxAge": 1, "endDate": {"raw": 1696032000, "fmt": "2023-09-30"},
                 "totalAssets": {"raw": 352583000000.0}, "cash": {"raw": 29965000000.0}},
                {"maxAge": 1, "endDate": {"raw": 1664496000}, "totalAssets": {"raw": 1.0}}
            ]},
            "cashflowStatementHistory": {"cashflowStatements": [
                {"endDate": {"raw": 1696032000}, "netIncome": {"raw": 96995000000.0}, "note": "x"}
            ]},
            "earnings": {"financialsChart": {"yearly": [
                {"date": 2022, "revenue": {"raw": 394328000000.0}, "earnings": {"raw": 99803000000.0}},
                {"date": 2023, "revenue": {"raw": 383285000000.0}, "earnings": {"raw": 96995000000.0}}
            ]}}
        }));
        let f = fundamentals_from_summary(s);

        let bs = f.balance_sheet.unwrap();
        assert_eq!(bs.end_date, NaiveDate::from_ymd_opt(2023, 9, 30));
        assert_eq!(bs.items.len(), 2);
        assert_eq!(bs.items.get("totalAssets").copied(), Some(352583000000.0));

        let cf = f.cash_flow.unwrap();
        assert_eq!(cf.items.keys().collect::<Vec<_>>(), vec!["netIncome"]);

        let e = f.earnings.unwrap();
        assert_eq!(e.period.as_deref(), Some("2023"));
        assert_eq!(e.revenue, Some(383285000000.0));
    }

    #[test]
    fn earnings_without_a_date_have_no_period() {
        let s = summary(json!({
            "earnings": {"financialsChart": {"yearly": [
                {"revenue": {"raw": 1.0}, "earnings": {"raw": 2.0}}
            ]}}
        }));
        let e = fundamentals_from_summary(s).earnings.unwrap();
        assert_eq!(e.period, None);
        assert_eq!(e.revenue, Some(1.0));
        assert_eq!(serde_json::to_value(&e).unwrap()["period"], Value::Null);
    }

    #[test]
    fn recommendations_keep_five_most_recent() {
        let rows: Vec<RecommendationRow> = serde_json::from_value(json!([
            {"period": "-3m", "strongBuy": 1, "buy": 1, "hold": 1, "sell": 0, "strongSell": 0},
            {"period": "0m", "strongBuy": 9, "buy": 20, "hold": 7, "sell": 1, "strongSell": 0},
            {"period": "-1m", "strongBuy": 8},
            {"period": "-2m", "strongBuy": 7},
            {"period": "-5m", "strongBuy": 5},
            {"period": "-4m", "strongBuy": 6}
        ]))
        .unwrap();
        let kept = most_recent_recommendations(rows).unwrap();
        let periods: Vec<_> = kept.iter().map(|r| r.period.as_str()).collect();
        assert_eq!(periods, vec!["0m", "-1m", "-2m", "-3m", "-4m"]);
        assert_eq!(kept[0].buy, 20);
        assert_eq!(kept[1].hold, 0);
    }

    #[test]
    fn no_recommendation_rows_is_absent() {
        assert!(most_recent_recommendations(vec![]).is_none());
    }

    #[test]
    fn news_is_bounded_and_reduced_to_title_and_publisher() {
        let res: SearchResponse = serde_json::from_value(json!({
            "news": [
                {"uuid": "1", "title": "A", "publisher": "Reuters", "link": "https://x", "providerPublishTime": 1700000000},
                {"uuid": "2", "title": "", "publisher": "Skipped"},
                {"uuid": "3", "title": "B", "publisher": "Bloomberg"},
                {"uuid": "4", "title": "C"},
                {"uuid": "5", "title": "D", "publisher": "AP"}
            ]
        }))
        .unwrap();
        let items = news_items(res.news);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], NewsItem { title: "A".into(), publisher: "Reuters".into() });
        assert_eq!(items[2].publisher, "");

        let v = serde_json::to_value(&items[0]).unwrap();
        assert_eq!(v.as_object().unwrap().len(), 2);
    }

    #[test]
    fn endpoint_encodes_symbol_as_path_segment() {
        let mut settings = Settings::from_lookup(|_| None).unwrap();
        settings.yahoo_base_url = "https://example.test/".to_string();
        let client = YahooFinanceClient::from_settings(&settings).unwrap();
        let url = client.endpoint(&["v8", "finance", "chart", "BRK B"]).unwrap();
        assert_eq!(url.as_str(), "https://example.test/v8/finance/chart/BRK%20B");
    }

    mod http {
        use super::*;
        use axum::extract::{Path, Query, State};
        use axum::http::header;
        use axum::response::{IntoResponse, Response};
        use axum::routing::get;
        use axum::{Json, Router};
        use serde_json::json;
        use std::collections::HashMap;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        /// Loopback stand-in for the Yahoo endpoints. Crumbs are issued as
        /// `crumb-1`, `crumb-2`, ...; quoteSummary only accepts `accepted`.
        struct Stub {
            accepted: &'static str,
            cookies_issued: AtomicUsize,
            crumbs_issued: AtomicUsize,
        }

        async fn cookie(State(stub): State<Arc<Stub>>) -> Response {
            stub.cookies_issued.fetch_add(1, Ordering::SeqCst);
            (
                axum::http::StatusCode::NOT_FOUND,
                [(header::SET_COOKIE, "A3=session; Path=/")],
                "",
            )
                .into_response()
        }

        async fn getcrumb(State(stub): State<Arc<Stub>>) -> String {
            let n = stub.crumbs_issued.fetch_add(1, Ordering::SeqCst) + 1;
            format!("crumb-{n}")
        }

        async fn quote_summary(
            State(stub): State<Arc<Stub>>,
            Path(symbol): Path<String>,
            Query(q): Query<HashMap<String, String>>,
        ) -> Response {
            if q.get("crumb").map(String::as_str) != Some(stub.accepted) {
                let body = json!({"finance": {"result": null, "error": {"code": "Unauthorized", "description": "Invalid Crumb"}}});
                return (axum::http::StatusCode::UNAUTHORIZED, Json(body)).into_response();
            }
            match symbol.as_str() {
                "ZZZZ999" => {
                    let body = json!({"quoteSummary": {"result": null, "error": {
                        "code": "Not Found",
                        "description": "Quote not found for symbol: ZZZZ999"
                    }}});
                    (axum::http::StatusCode::NOT_FOUND, Json(body)).into_response()
                }
                "BOOM" => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response(),
                _ => Json(json!({"quoteSummary": {"result": [{
                    "summaryDetail": {"marketCap": {"raw": 2.9e12, "fmt": "2.9T"}},
                    "assetProfile": {"sector": "Technology", "industry": "Consumer Electronics"},
                    "recommendationTrend": {"trend": [
                        {"period": "-1m", "strongBuy": 8, "buy": 21, "hold": 6, "sell": 0, "strongSell": 0},
                        {"period": "0m", "strongBuy": 9, "buy": 20, "hold": 7, "sell": 1, "strongSell": 0}
                    ]}
                }], "error": null}}))
                .into_response(),
            }
        }

        async fn news(Query(q): Query<HashMap<String, String>>) -> Response {
            if q.get("q").map(String::as_str) == Some("ZZZZ999") {
                return (axum::http::StatusCode::NOT_FOUND, "").into_response();
            }
            Json(json!({"news": [
                {"title": "One", "publisher": "Reuters"},
                {"title": "Two", "publisher": "Bloomberg"},
                {"title": "Three", "publisher": "AP"},
                {"title": "Four", "publisher": "CNBC"}
            ]}))
            .into_response()
        }

        async fn spawn_stub(accepted: &'static str) -> (YahooFinanceClient, Arc<Stub>) {
            let stub = Arc::new(Stub {
                accepted,
                cookies_issued: AtomicUsize::new(0),
                crumbs_issued: AtomicUsize::new(0),
            });
            let app = Router::new()
                .route("/cookie", get(cookie))
                .route("/v1/test/getcrumb", get(getcrumb))
                .route("/v10/finance/quoteSummary/:symbol", get(quote_summary))
                .route("/v1/finance/search", get(news))
                .with_state(stub.clone());

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            let mut settings = Settings::from_lookup(|_| None).unwrap();
            settings.yahoo_base_url = format!("http://{addr}");
            settings.yahoo_cookie_url = format!("http://{addr}/cookie");
            (YahooFinanceClient::from_settings(&settings).unwrap(), stub)
        }

        #[tokio::test]
        async fn crumb_is_fetched_once_and_reused() {
            let (client, stub) = spawn_stub("crumb-1").await;

            let f = client.get_fundamentals("AAPL").await.unwrap();
            assert_eq!(f.key_metrics.market_cap, Some(2.9e12));
            assert_eq!(f.key_metrics.industry.as_deref(), Some("Consumer Electronics"));

            let recs = client.get_recommendations("AAPL").await.unwrap().unwrap();
            assert_eq!(recs[0].period, "0m");

            assert_eq!(stub.cookies_issued.load(Ordering::SeqCst), 1);
            assert_eq!(stub.crumbs_issued.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn rejected_crumb_is_refreshed_once() {
            let (client, stub) = spawn_stub("crumb-2").await;

            let f = client.get_fundamentals("AAPL").await.unwrap();
            assert_eq!(f.key_metrics.sector.as_deref(), Some("Technology"));
            assert_eq!(stub.crumbs_issued.load(Ordering::SeqCst), 2);

            // The refreshed crumb is cached for later calls.
            client.get_recommendations("AAPL").await.unwrap();
            assert_eq!(stub.crumbs_issued.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn crumb_rejected_twice_is_an_error() {
            let (client, stub) = spawn_stub("never-issued").await;

            let err = client.get_fundamentals("AAPL").await.unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("401"), "{msg}");
            assert!(msg.contains("Invalid Crumb"), "{msg}");
            assert_eq!(stub.crumbs_issued.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn unknown_symbol_has_absent_fundamentals_and_no_news() {
            let (client, _stub) = spawn_stub("crumb-1").await;

            assert_eq!(client.get_fundamentals("ZZZZ999").await.unwrap(), Fundamentals::default());
            assert!(client.get_recommendations("ZZZZ999").await.unwrap().is_none());
            assert!(client.get_news("ZZZZ999").await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn server_error_propagates() {
            let (client, _stub) = spawn_stub("crumb-1").await;

            let err = client.get_fundamentals("BOOM").await.unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("500"), "{msg}");
            assert!(msg.contains("upstream exploded"), "{msg}");
        }

        #[tokio::test]
        async fn news_over_http_is_bounded() {
            let (client, _stub) = spawn_stub("crumb-1").await;

            let news = client.get_news("AAPL").await.unwrap();
            let titles: Vec<_> = news.iter().map(|n| n.title.as_str()).collect();
            assert_eq!(titles, vec!["One", "Two", "Three"]);
        }
    }
}
