//! Data models for fetched articles, model analyses and the result document.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Article`]: A news item as returned by the news API
//! - [`Analysis`]: The sentiment/impact judgment produced for one article
//! - [`AnalyzedArticle`]: An article merged with its analysis
//! - [`ResultDocument`]: The JSON document written at the end of a run
//!
//! Output field names follow the published JSON schema, hence the explicit
//! `#[serde(rename = "publishedAt")]` on the one camelCase key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder impact text used whenever an article could not be analyzed.
pub const FALLBACK_IMPACT: &str = "Analysis failed";

/// A single news item prior to analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// The article headline.
    pub headline: String,
    /// Short description or lede; empty when upstream has none.
    pub description: String,
    /// Canonical link to the story.
    pub url: String,
    /// Publication time as reported upstream (ISO-8601).
    #[serde(rename = "publishedAt")]
    pub published_at: String,
    /// Display name of the publishing outlet.
    pub source: String,
    /// Truncated body snippet, only used to enrich the prompt.
    #[serde(skip)]
    pub content: Option<String>,
}

/// Market direction the model assigns to an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

/// How sure the model claims to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            other => Err(format!("`{other}` is not one of positive|negative|neutral")),
        }
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            other => Err(format!("`{other}` is not one of low|medium|high")),
        }
    }
}

/// The sentiment and stock-impact judgment for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub sentiment: Sentiment,
    /// Ticker symbols the model expects to move; may be empty.
    pub affected_stocks: Vec<String>,
    pub impact_description: String,
    pub confidence: Confidence,
    pub analysis_timestamp: DateTime<Utc>,
}

impl Analysis {
    /// The substitute used when the model call or reply parsing fails.
    ///
    /// Always neutral with low confidence, so the output never carries a
    /// missing or out-of-range field.
    pub fn fallback(at: DateTime<Utc>) -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            affected_stocks: Vec::new(),
            impact_description: FALLBACK_IMPACT.to_string(),
            confidence: Confidence::Low,
            analysis_timestamp: at,
        }
    }
}

/// An [`Article`] with its [`Analysis`] merged in, serialized as one flat object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedArticle {
    #[serde(flatten)]
    pub article: Article,
    #[serde(flatten)]
    pub analysis: Analysis,
}

/// Per-run bookkeeping written alongside the articles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub total_articles: usize,
    pub analysis_date: DateTime<Utc>,
    pub news_api_requests_used: u32,
    pub model_used: String,
}

/// The complete output of a run, in fetch order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    pub analysis_metadata: RunMetadata,
    pub articles: Vec<AnalyzedArticle>,
}

impl ResultDocument {
    /// Assemble the document, deriving `total_articles` from the slice so the
    /// count can never disagree with the payload.
    pub fn new(
        articles: Vec<AnalyzedArticle>,
        news_api_requests_used: u32,
        model_used: impl Into<String>,
        analysis_date: DateTime<Utc>,
    ) -> Self {
        Self {
            analysis_metadata: RunMetadata {
                total_articles: articles.len(),
                analysis_date,
                news_api_requests_used,
                model_used: model_used.into(),
            },
            articles,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_article(headline: &str) -> Article {
    Article {
        headline: headline.to_string(),
        description: format!("{headline} description"),
        url: format!("https://example.com/{}", headline.len()),
        published_at: "2024-05-02T14:30:00Z".to_string(),
        source: "Reuters".to_string(),
        content: None,
    }
}
