pub mod error;
pub mod llm;
pub mod market;
pub mod prompt;
pub mod search;
pub mod shell;

pub mod config {
    use anyhow::Context;

    use crate::error::ConfigurationError;

    pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com";
    pub const DEFAULT_GROQ_MODEL: &str = "llama3-groq-70b-8192-tool-use-preview";
    pub const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
    pub const DEFAULT_YAHOO_COOKIE_URL: &str = "https://fc.yahoo.com";
    pub const DEFAULT_DUCKDUCKGO_BASE_URL: &str = "https://html.duckduckgo.com/html/";
    pub const DEFAULT_SEARCH_MAX_RESULTS: usize = 5;
    pub const DEFAULT_PORT: u16 = 3000;

    /// Process-wide configuration. Built once in `main` and handed to each
    /// client constructor by reference; nothing below reads the environment.
    #[derive(Debug, Clone)]
    pub struct Settings {
        pub groq_api_key: Option<String>,
        pub groq_base_url: String,
        pub groq_model: String,
        pub yahoo_base_url: String,
        /// Hands out the session cookie that crumb requests need.
        pub yahoo_cookie_url: String,
        pub duckduckgo_base_url: String,
        pub search_max_results: usize,
        pub sentry_dsn: Option<String>,
        pub port: u16,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        /// Same as `from_env`, with the variable source injected.
        pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
        where
            F: Fn(&str) -> Option<String>,
        {
            let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

            let search_max_results = match non_empty("SEARCH_MAX_RESULTS") {
                Some(v) => v
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("SEARCH_MAX_RESULTS must be an integer (got {v})"))?,
                None => DEFAULT_SEARCH_MAX_RESULTS,
            };

            let port = match non_empty("PORT") {
                Some(v) => v
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("PORT must be a valid port number (got {v})"))?,
                None => DEFAULT_PORT,
            };

            Ok(Self {
                groq_api_key: non_empty("GROQ_API_KEY"),
                groq_base_url: non_empty("GROQ_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.to_string()),
                groq_model: non_empty("GROQ_MODEL")
                    .unwrap_or_else(|| DEFAULT_GROQ_MODEL.to_string()),
                yahoo_base_url: non_empty("YAHOO_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_YAHOO_BASE_URL.to_string()),
                yahoo_cookie_url: non_empty("YAHOO_COOKIE_URL")
                    .unwrap_or_else(|| DEFAULT_YAHOO_COOKIE_URL.to_string()),
                duckduckgo_base_url: non_empty("DUCKDUCKGO_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_DUCKDUCKGO_BASE_URL.to_string()),
                search_max_results,
                sentry_dsn: non_empty("SENTRY_DSN"),
                port,
            })
        }

        /// The completion credential is not checked at startup; callers
        /// surface its absence when they first need it.
        pub fn require_groq_api_key(&self) -> anyhow::Result<&str> {
            self.groq_api_key
                .as_deref()
                .ok_or_else(|| ConfigurationError { key: "GROQ_API_KEY" }.into())
        }
    }

}
