//! Per-article sentiment and stock-impact analysis.
//!
//! Each article is rendered into a fixed prompt, sent to the model through an
//! [`AskAsync`] implementation, and the JSON object embedded in the reply is
//! extracted and validated. Any failure along the way yields
//! [`Analysis::fallback`] instead of an error, so the caller always gets
//! exactly one analysis per article.

use crate::api::AskAsync;
use crate::error::AnalysisError;
use crate::models::{Analysis, Article, Confidence, Sentiment};
use crate::utils::{excerpt, truncate_for_log};
use chrono::Utc;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt::Write;
use tracing::{info, instrument, warn};

/// Characters of article body included in the prompt.
const CONTENT_EXCERPT_CHARS: usize = 500;

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think-block regex"));

/// Render the analysis prompt for one article.
///
/// The output is a pure function of the article, so identical inputs always
/// produce identical requests.
pub fn render_prompt(article: &Article) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are a financial analyst specializing in news sentiment analysis and stock market impact assessment.\n\n\
         Analyze the following financial news article and respond in JSON format.\n\n",
    );
    writeln!(prompt, "HEADLINE: {}", article.headline).unwrap();
    writeln!(prompt, "DESCRIPTION: {}", article.description).unwrap();
    writeln!(prompt, "SOURCE: {}", article.source).unwrap();
    if let Some(content) = article.content.as_deref() {
        writeln!(prompt, "CONTENT: {}", excerpt(content, CONTENT_EXCERPT_CHARS)).unwrap();
    }
    prompt.push_str(
        "\nAnalyze this news for:\n\
         1. SENTIMENT: whether the news is positive, negative, or neutral for the financial markets\n\
         2. AFFECTED STOCKS: ticker symbols of companies that might be affected\n\
         3. IMPACT: the potential impact on stock prices (increase, decrease, volatility, etc.)\n\n\
         Respond with exactly one JSON object in this format:\n\
         {\n\
         \x20   \"sentiment\": \"positive|negative|neutral\",\n\
         \x20   \"affected_stocks\": [\"AAPL\", \"GOOGL\"],\n\
         \x20   \"impact_description\": \"Description of the expected impact\",\n\
         \x20   \"confidence\": \"high|medium|low\"\n\
         }\n\n\
         Guidelines:\n\
         - Use stock ticker symbols; use an empty list if no specific stock is affected\n\
         - sentiment must be one of positive, negative, neutral\n\
         - confidence must be one of high, medium, low\n",
    );
    prompt
}

/// Locate the JSON object inside a free-text model reply.
///
/// Reasoning blocks (`<think>...</think>`) are removed first, then the span
/// from the first `{` to the last `}` is taken. Markdown fences and prose
/// around the object are thereby ignored.
pub fn extract_json_object(reply: &str) -> Option<String> {
    let cleaned = THINK_BLOCK.replace_all(reply, "");
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    (end > start).then(|| cleaned[start..=end].to_string())
}

fn required_str<'a>(obj: &'a Value, field: &'static str) -> Result<&'a str, AnalysisError> {
    match obj.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(AnalysisError::InvalidField {
            field,
            reason: format!("expected a string, got {other}"),
        }),
        None => Err(AnalysisError::InvalidField {
            field,
            reason: "missing".to_string(),
        }),
    }
}

fn affected_stocks(obj: &Value) -> Result<Vec<String>, AnalysisError> {
    const FIELD: &str = "affected_stocks";
    let items = match obj.get(FIELD) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) => return Ok(Vec::new()),
        Some(other) => {
            return Err(AnalysisError::InvalidField {
                field: FIELD,
                reason: format!("expected a list, got {other}"),
            });
        }
        None => {
            return Err(AnalysisError::InvalidField {
                field: FIELD,
                reason: "missing".to_string(),
            });
        }
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.trim().to_uppercase()),
            other => Err(AnalysisError::InvalidField {
                field: FIELD,
                reason: format!("expected ticker strings, got {other}"),
            }),
        })
        .filter_ok(|s| !s.is_empty())
        .process_results(|iter| iter.unique().collect())
}

/// Decode and validate a model reply into an [`Analysis`] stamped with the current time.
pub fn parse_reply(reply: &str) -> Result<Analysis, AnalysisError> {
    let json = extract_json_object(reply).ok_or(AnalysisError::NoJson)?;
    let obj: Value = serde_json::from_str(&json)?;
    if !obj.is_object() {
        return Err(AnalysisError::NoJson);
    }

    let sentiment = required_str(&obj, "sentiment")?
        .parse::<Sentiment>()
        .map_err(|reason| AnalysisError::InvalidField {
            field: "sentiment",
            reason,
        })?;
    let confidence = required_str(&obj, "confidence")?
        .parse::<Confidence>()
        .map_err(|reason| AnalysisError::InvalidField {
            field: "confidence",
            reason,
        })?;
    let impact_description = required_str(&obj, "impact_description")?.trim().to_string();
    let affected_stocks = affected_stocks(&obj)?;

    Ok(Analysis {
        sentiment,
        affected_stocks,
        impact_description,
        confidence,
        analysis_timestamp: Utc::now(),
    })
}

/// The analysis for one article, plus why the model's answer was not used, if it wasn't.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub analysis: Analysis,
    pub failure: Option<AnalysisError>,
}

/// Drives the model for one article at a time.
#[derive(Debug)]
pub struct Analyzer<C> {
    client: C,
}

impl<C: AskAsync> Analyzer<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Ask the model about `article` and parse its answer.
    pub async fn try_analyze(&self, article: &Article) -> Result<Analysis, AnalysisError> {
        let prompt = render_prompt(article);
        let reply = self.client.ask(&prompt).await?;
        parse_reply(&reply).inspect_err(|e| {
            warn!(
                error = %e,
                response_preview = %truncate_for_log(&reply, 300),
                "Model returned non-conforming JSON"
            );
        })
    }

    /// Analyze `article`, substituting the fallback analysis on any failure.
    #[instrument(level = "info", skip_all, fields(headline = %truncate_for_log(&article.headline, 60)))]
    pub async fn analyze(&self, article: &Article) -> AnalysisOutcome {
        match self.try_analyze(article).await {
            Ok(analysis) => {
                info!(
                    sentiment = %analysis.sentiment,
                    confidence = %analysis.confidence,
                    stocks = analysis.affected_stocks.len(),
                    "Article analyzed"
                );
                AnalysisOutcome {
                    analysis,
                    failure: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Analysis failed; using fallback");
                AnalysisOutcome {
                    analysis: Analysis::fallback(Utc::now()),
                    failure: Some(e),
                }
            }
        }
    }
}
