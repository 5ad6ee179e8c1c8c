//! Web search over DuckDuckGo's HTML results page.

use crate::config::Settings;
use crate::prompt::PromptSubject;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

const CLIENT_USER_AGENT: &str = "Mozilla/5.0 (compatible; finsight/0.1)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Results of one search, in provider order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SearchResultSet(Vec<SearchResult>);

impl SearchResultSet {
    pub fn new(mut results: Vec<SearchResult>, max_results: usize) -> Self {
        results.truncate(max_results);
        Self(results)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchResult> {
        self.0.iter()
    }
}

impl PromptSubject for SearchResultSet {
    fn framing(&self) -> String {
        "Analyze these search results".to_string()
    }
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    fn default_max_results(&self) -> usize;

    async fn search(&self, query: &str, max_results: usize) -> Result<SearchResultSet>;
}

#[derive(Debug, Clone)]
pub struct DuckDuckGoClient {
    base_url: String,
    max_results: usize,
}

impl DuckDuckGoClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Url::parse(&settings.duckduckgo_base_url).with_context(|| {
            format!(
                "invalid search base url: {}",
                settings.duckduckgo_base_url
            )
        })?;

        Ok(Self {
            base_url: settings.duckduckgo_base_url.clone(),
            max_results: settings.search_max_results,
        })
    }
}

#[async_trait::async_trait]
impl SearchProvider for DuckDuckGoClient {
    fn provider_name(&self) -> &'static str {
        "duckduckgo"
    }

    fn default_max_results(&self) -> usize {
        self.max_results
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<SearchResultSet> {
        if max_results == 0 {
            return Ok(SearchResultSet::default());
        }

        let session = SearchSession::open(&self.base_url)?;
        let results = session.text(query, max_results).await?;
        drop(session);
        Ok(results)
    }
}

/// One provider connection, scoped to a single search. Its connection pool
/// is torn down when the session drops, whichever way `search` returns.
pub struct SearchSession {
    http: reqwest::Client,
    base_url: Url,
    id: uuid::Uuid,
}

impl SearchSession {
    pub fn open(base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid search base url: {base_url}"))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(1)
            .build()
            .context("failed to build search http client")?;

        let id = uuid::Uuid::new_v4();
        #[cfg(test)]
        session_counts::OPENED.with(|c| c.set(c.get() + 1));
        tracing::debug!(session = %id, "search session opened");
        Ok(Self { http, base_url, id })
    }

    pub async fn text(&self, query: &str, max_results: usize) -> Result<SearchResultSet> {
        let res = self
            .http
            .get(self.base_url.clone())
            .query(&[("q", query)])
            .send()
            .await
            .context("search request failed")?;

        let status = res.status();
        let text = res.text().await.context("failed to read search response")?;
        if !status.is_success() {
            anyhow::bail!("search provider HTTP {status}: {text}");
        }

        let results = parse_results(&text, max_results)?;
        tracing::debug!(session = %self.id, results = results.len(), "search results collected");
        Ok(results)
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        #[cfg(test)]
        session_counts::CLOSED.with(|c| c.set(c.get() + 1));
        tracing::debug!(session = %self.id, "search session closed");
    }
}


fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector `{css}`: {e:?}"))
}

/// Organic hits in page order; ads and entries without a link are skipped.
fn parse_results(html: &str, max_results: usize) -> Result<SearchResultSet> {
    let result_sel = selector("div.result:not(.result--ad)")?;
    let link_sel = selector("a.result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let document = Html::parse_document(html);
    let mut out = Vec::new();
    for result in document.select(&result_sel) {
        if out.len() >= max_results {
            break;
        }
        let Some(link) = result.select(&link_sel).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href").and_then(target_url) else {
            continue;
        };
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(collapsed_text)
            .unwrap_or_default();

        out.push(SearchResult {
            title: collapsed_text(link),
            url,
            snippet,
        });
    }

    Ok(SearchResultSet::new(out, max_results))
}

/// Result links go through a `/l/?uddg=<target>` redirect; unwrap it.
fn target_url(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let url = Url::parse(&absolute).ok()?;

    let redirected = url
        .query_pairs()
        .find(|(k, _)| k == "uddg")
        .map(|(_, v)| v.into_owned());
    let target = match redirected {
        Some(v) => Url::parse(&v).ok()?,
        None => url,
    };
    matches!(target.scheme(), "http" | "https").then(|| target.to_string())
}

fn collapsed_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
