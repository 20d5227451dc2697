//! NewsAPI client.
//!
//! Issues a single `GET /v2/everything` per run and converts the response into
//! [`Article`]s. The client owns the per-run [`RequestCounter`], which tracks
//! usage against the NewsAPI free-tier quota of 100 requests per day.
//!
//! # Request
//!
//! | Parameter  | Value                                   |
//! |------------|-----------------------------------------|
//! | `q`        | search query                            |
//! | `pageSize` | requested article count                 |
//! | `language` | `en`                                    |
//! | `sortBy`   | `publishedAt` (newest first)            |
//! | `from`     | today minus the lookback window         |
//! | `to`       | today                                   |
//!
//! The API key travels in the `X-Api-Key` header, never in the URL.

use crate::config::Settings;
use crate::error::AppError;
use crate::models::Article;
use crate::utils::truncate_for_log;
use chrono::{Duration, Local, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Largest `pageSize` NewsAPI accepts.
pub const MAX_PAGE_SIZE: usize = 100;

const USER_AGENT: &str = concat!("financial_news_analyzer/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct WireSource {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireArticle {
    source: Option<WireSource>,
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    published_at: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    status: String,
    #[serde(default)]
    articles: Vec<WireArticle>,
    code: Option<String>,
    message: Option<String>,
}

impl From<WireArticle> for Article {
    fn from(w: WireArticle) -> Self {
        Article {
            headline: w.title.unwrap_or_default(),
            description: w.description.unwrap_or_default(),
            url: w.url,
            published_at: w.published_at,
            source: w.source.and_then(|s| s.name).unwrap_or_default(),
            content: w.content.filter(|c| !c.trim().is_empty()),
        }
    }
}

/// Counts news requests issued during this run against a daily quota.
#[derive(Debug, Clone)]
pub struct RequestCounter {
    used: u32,
    quota: u32,
}

impl RequestCounter {
    pub fn new(quota: u32) -> Self {
        Self { used: 0, quota }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.quota.saturating_sub(self.used)
    }

    /// Record one request, or refuse if the quota is spent.
    pub fn acquire(&mut self) -> Result<(), AppError> {
        if self.used >= self.quota {
            return Err(AppError::fetch(format!(
                "daily news API quota of {} requests reached",
                self.quota
            )));
        }
        self.used += 1;
        Ok(())
    }
}

/// Reject parameters that would make the request pointless or invalid.
pub fn validate_request(query: &str, max_articles: usize) -> Result<(), AppError> {
    if query.trim().is_empty() {
        return Err(AppError::InvalidArgument("query must not be empty".to_string()));
    }
    if max_articles == 0 {
        return Err(AppError::InvalidArgument(
            "max_articles must be greater than 0".to_string(),
        ));
    }
    if max_articles > MAX_PAGE_SIZE {
        return Err(AppError::InvalidArgument(format!(
            "max_articles must be at most {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}

/// Client for the NewsAPI `everything` endpoint.
#[derive(Debug)]
pub struct NewsClient {
    http: Client,
    endpoint: Url,
    api_key: String,
    lookback_days: i64,
    counter: RequestCounter,
}

impl NewsClient {
    pub fn new(settings: &Settings, api_key: &str) -> Result<Self, AppError> {
        let endpoint = Url::parse(&settings.news_api_url)
            .map_err(|e| AppError::Config(format!("news_api_url: {e}")))?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout())
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint,
            api_key: api_key.to_string(),
            lookback_days: settings.lookback_days,
            counter: RequestCounter::new(settings.daily_quota),
        })
    }

    /// Requests consumed so far in this run.
    pub fn requests_used(&self) -> u32 {
        self.counter.used()
    }

    fn date_window(&self, today: NaiveDate) -> Result<(String, String), AppError> {
        let from = Duration::try_days(self.lookback_days)
            .and_then(|window| today.checked_sub_signed(window))
            .ok_or_else(|| {
                AppError::Config(format!(
                    "lookback_days {} is out of range",
                    self.lookback_days
                ))
            })?;
        Ok((
            from.format("%Y-%m-%d").to_string(),
            today.format("%Y-%m-%d").to_string(),
        ))
    }

    /// Fetch up to `max_articles` of the most recent articles matching `query`.
    ///
    /// Exactly one request is issued and counted, whatever its outcome. An
    /// empty result is returned as an empty `Vec`; deciding what that means
    /// is up to the caller.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidArgument`] for an empty query or an out-of-range
    ///   count (no request is made)
    /// - [`AppError::Config`] when the lookback window cannot be represented
    ///   (no request is made)
    /// - [`AppError::FetchFailed`] for quota exhaustion, transport errors,
    ///   non-success statuses and undecodable bodies
    #[instrument(level = "info", skip(self), fields(endpoint = %self.endpoint))]
    pub async fn fetch_news(
        &mut self,
        query: &str,
        max_articles: usize,
    ) -> Result<Vec<Article>, AppError> {
        validate_request(query, max_articles)?;
        let (from, to) = self.date_window(Local::now().date_naive())?;
        self.counter.acquire()?;

        let page_size = max_articles.to_string();
        info!(query, max_articles, %from, %to, "Fetching financial news");

        let response = self
            .http
            .get(self.endpoint.clone())
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", query.trim()),
                ("pageSize", page_size.as_str()),
                ("language", "en"),
                ("sortBy", "publishedAt"),
                ("from", from.as_str()),
                ("to", to.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "News request failed");
                AppError::fetch(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::fetch(format!("reading body: {e}")))?;

        if !status.is_success() {
            // NewsAPI error bodies carry a useful `message`.
            let detail = serde_json::from_str::<WireResponse>(&body)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or_else(|| truncate_for_log(&body, 200));
            error!(status = status.as_u16(), %detail, "News API returned an error status");
            return Err(AppError::fetch(format!("HTTP {}: {detail}", status.as_u16())));
        }

        let parsed: WireResponse = serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, body = %truncate_for_log(&body, 300), "Malformed news response");
            AppError::fetch(format!("malformed response body: {e}"))
        })?;

        if parsed.status != "ok" {
            let code = parsed.code.unwrap_or_default();
            let message = parsed.message.unwrap_or_default();
            return Err(AppError::fetch(format!(
                "news API status `{}` {code}: {message}",
                parsed.status
            )));
        }

        let articles: Vec<Article> = parsed
            .articles
            .into_iter()
            .take(max_articles)
            .map(Article::from)
            .collect();

        info!(
            count = articles.len(),
            requests_used = self.counter.used(),
            remaining_quota = self.counter.remaining(),
            "Fetched articles"
        );
        debug!(urls = ?articles.iter().map(|a| a.url.as_str()).collect::<Vec<_>>(), "Article URLs");
        Ok(articles)
    }
}
