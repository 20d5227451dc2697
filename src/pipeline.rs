//! The end-to-end run: credentials, fetch, analyze, write.
//!
//! ## Stages
//!
//! 1. **Validation**: credentials, arguments and the output directory are
//!    checked before any network traffic
//! 2. **Fetching**: one news request, counted against the daily quota
//! 3. **Processing**: each article is analyzed in turn; failures fall back
//!    to a neutral, low-confidence analysis instead of aborting
//! 4. **Output**: the result document is written, replacing any previous run
//!
//! An empty news result ends the run early with [`RunOutcome::NoArticlesFound`]
//! and no output file.

use crate::analyzer::Analyzer;
use crate::api::{AskAsync, OpenRouterClient, RetryAsk};
use crate::config::{Credentials, Settings};
use crate::error::AppError;
use crate::models::{AnalyzedArticle, ResultDocument};
use crate::news::{NewsClient, validate_request};
use crate::outputs::json;
use crate::utils::{ensure_writable_dir, truncate_for_log};
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// What to fetch and where to put the results.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub query: String,
    pub max_articles: usize,
    pub output: PathBuf,
}

/// An article whose analysis fell back, and why.
#[derive(Debug, Clone)]
pub struct ArticleFailure {
    /// Zero-based position in fetch order.
    pub index: usize,
    pub headline: String,
    pub reason: String,
}

/// Everything a completed run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub document: ResultDocument,
    pub output: PathBuf,
    pub failures: Vec<ArticleFailure>,
}

/// How a run that did not hit a fatal error ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The news query matched nothing; nothing was analyzed or written.
    NoArticlesFound { requests_used: u32 },
    Completed(RunSummary),
}

/// Run the whole pipeline with real HTTP clients.
///
/// `env` supplies environment variables; production passes
/// `|key| std::env::var(key).ok()`.
///
/// # Errors
///
/// Any fatal [`AppError`]. Credential and argument errors are raised before
/// a single request is sent.
#[instrument(level = "info", skip_all, fields(query = %request.query, max_articles = request.max_articles))]
pub async fn run<F>(
    request: &RunRequest,
    settings: &Settings,
    env: F,
) -> Result<RunOutcome, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let credentials = Credentials::from_lookup(env)?;
    validate_request(&request.query, request.max_articles)?;
    ensure_writable_dir(&request.output).await?;

    let model = settings.resolve_model(&credentials);
    info!(%model, "Using AI model");

    let mut news = NewsClient::new(settings, &credentials.news_api_key)?;
    let client = OpenRouterClient::new(settings, &credentials.openrouter_api_key, &model)
        .map_err(|e| AppError::Config(format!("HTTP client: {e}")))?;
    let analyzer = Analyzer::new(RetryAsk::new(
        client,
        settings.max_retries,
        Duration::from_millis(settings.retry_base_delay_ms),
    ));

    execute(
        request,
        &mut news,
        &analyzer,
        Duration::from_millis(settings.request_interval_ms),
    )
    .await
}

/// Fetch, analyze and write using the given clients.
///
/// Articles are analyzed strictly one after another, with `interval` between
/// consecutive model calls.
pub async fn execute<C: AskAsync>(
    request: &RunRequest,
    news: &mut NewsClient,
    analyzer: &Analyzer<C>,
    interval: Duration,
) -> Result<RunOutcome, AppError> {
    let articles = news.fetch_news(&request.query, request.max_articles).await?;
    if articles.is_empty() {
        info!(query = %request.query, "No news articles found");
        return Ok(RunOutcome::NoArticlesFound {
            requests_used: news.requests_used(),
        });
    }

    let total = articles.len();
    info!(total, "Starting article processing");

    let mut analyzed = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for (i, article) in articles.into_iter().enumerate() {
        if i > 0 && !interval.is_zero() {
            sleep(interval).await;
        }
        info!(
            index = i + 1,
            total,
            headline = %truncate_for_log(&article.headline, 50),
            "Analyzing article"
        );

        let outcome = analyzer.analyze(&article).await;
        if let Some(e) = outcome.failure {
            failures.push(ArticleFailure {
                index: i,
                headline: article.headline.clone(),
                reason: e.to_string(),
            });
        }
        analyzed.push(AnalyzedArticle {
            article,
            analysis: outcome.analysis,
        });
    }

    let document = ResultDocument::new(
        analyzed,
        news.requests_used(),
        analyzer.model(),
        Utc::now(),
    );
    json::write_document(&document, &request.output).await?;

    info!(
        total,
        successful = total - failures.len(),
        failed = failures.len(),
        path = %request.output.display(),
        "Completed article processing"
    );
    for failure in &failures {
        warn!(
            index = failure.index,
            headline = %truncate_for_log(&failure.headline, 60),
            reason = %failure.reason,
            "Article used fallback analysis"
        );
    }

    Ok(RunOutcome::Completed(RunSummary {
        document,
        output: request.output.clone(),
        failures,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NEWS_API_KEY_VAR, OPENROUTER_API_KEY_VAR, OPENROUTER_MODEL_VAR};
    use crate::error::AnalysisError;
    use crate::models::{Confidence, FALLBACK_IMPACT, Sentiment};
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };
    use serde_json::{Value, json};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    const CLEAN_REPLY: &str = r#"Here is the analysis:
{"sentiment": "positive", "affected_stocks": ["AAPL"], "impact_description": "Shares likely to rise on strong iPhone sales", "confidence": "high"}"#;

    struct Scripted(RefCell<VecDeque<&'static str>>);

    impl AskAsync for Scripted {
        async fn ask(&self, _prompt: &str) -> Result<String, AnalysisError> {
            self.0
                .borrow_mut()
                .pop_front()
                .map(str::to_string)
                .ok_or(AnalysisError::EmptyReply)
        }

        fn model(&self) -> &str {
            "scripted/model"
        }
    }

    fn full_env(key: &str) -> Option<String> {
        match key {
            NEWS_API_KEY_VAR => Some("news-key".to_string()),
            OPENROUTER_API_KEY_VAR => Some("router-key".to_string()),
            OPENROUTER_MODEL_VAR => Some("test/model".to_string()),
            _ => None,
        }
    }

    fn settings_for(server: &MockServer) -> Settings {
        Settings {
            news_api_url: server.url("/v2/everything"),
            openrouter_url: server.url("/api/v1/chat/completions"),
            max_retries: 0,
            retry_base_delay_ms: 0,
            request_interval_ms: 0,
            ..Settings::default()
        }
    }

    fn request(query: &str, max_articles: usize) -> RunRequest {
        RunRequest {
            query: query.to_string(),
            max_articles,
            output: std::env::temp_dir()
                .join(format!("fna-pipeline-{}", rand::random::<u64>()))
                .join("financial_news_analysis.json"),
        }
    }

    fn cleanup(request: &RunRequest) {
        if let Some(dir) = request.output.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    fn news_body(headlines: &[&str]) -> Value {
        let articles: Vec<Value> = headlines
            .iter()
            .enumerate()
            .map(|(i, h)| {
                json!({
                    "source": { "id": null, "name": "Bloomberg" },
                    "title": h,
                    "description": format!("{h} in detail"),
                    "url": format!("https://example.com/news/{i}"),
                    "publishedAt": format!("2024-05-02T2{}:00:00Z", 3 - i),
                    "content": null
                })
            })
            .collect();
        json!({ "status": "ok", "totalResults": articles.len(), "articles": articles })
    }

    fn chat_body(reply: &str) -> Value {
        json!({ "choices": [ { "message": { "role": "assistant", "content": reply } } ] })
    }

    #[tokio::test]
    async fn test_two_articles_both_analyzed() {
        let server = MockServer::start();
        let news_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v2/everything")
                .query_param("q", "Apple earnings")
                .query_param("pageSize", "2");
            then.status(200)
                .json_body(news_body(&["Apple beats estimates", "Apple raises dividend"]));
        });
        let llm_mock = server.mock(|when, then| {
            when.method(POST).path("/api/v1/chat/completions");
            then.status(200).json_body(chat_body(CLEAN_REPLY));
        });

        let req = request("Apple earnings", 2);
        let outcome = run(&req, &settings_for(&server), full_env).await.unwrap();

        news_mock.assert_hits(1);
        llm_mock.assert_hits(2);
        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };
        assert!(summary.failures.is_empty());

        let written: ResultDocument =
            serde_json::from_str(&std::fs::read_to_string(&req.output).unwrap()).unwrap();
        assert_eq!(written.articles.len(), 2);
        assert_eq!(written.analysis_metadata.total_articles, 2);
        assert_eq!(written.analysis_metadata.news_api_requests_used, 1);
        assert_eq!(written.analysis_metadata.model_used, "test/model");
        assert_eq!(written.articles[0].article.headline, "Apple beats estimates");
        assert_eq!(written.articles[1].article.headline, "Apple raises dividend");
        for a in &written.articles {
            assert_eq!(a.analysis.sentiment, Sentiment::Positive);
            assert_eq!(a.analysis.affected_stocks, vec!["AAPL"]);
        }
        cleanup(&req);
    }

    #[tokio::test]
    async fn test_unparseable_second_reply_uses_fallback() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v2/everything");
            then.status(200)
                .json_body(news_body(&["Apple beats estimates", "Apple faces inquiry"]));
        });

        let settings = settings_for(&server);
        let mut news = NewsClient::new(&settings, "news-key").unwrap();
        let analyzer = Analyzer::new(Scripted(RefCell::new(VecDeque::from([
            CLEAN_REPLY,
            "I'm sorry, I can't determine the impact of this article.",
        ]))));

        let req = request("Apple earnings", 2);
        let outcome = execute(&req, &mut news, &analyzer, Duration::ZERO)
            .await
            .unwrap();

        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].index, 1);
        assert_eq!(summary.failures[0].headline, "Apple faces inquiry");

        let written: ResultDocument =
            serde_json::from_str(&std::fs::read_to_string(&req.output).unwrap()).unwrap();
        assert_eq!(written.articles.len(), 2);
        assert_eq!(written.analysis_metadata.model_used, "scripted/model");
        assert_eq!(written.articles[0].analysis.sentiment, Sentiment::Positive);
        let second = &written.articles[1].analysis;
        assert_eq!(second.sentiment, Sentiment::Neutral);
        assert_eq!(second.confidence, Confidence::Low);
        assert!(second.affected_stocks.is_empty());
        assert_eq!(second.impact_description, FALLBACK_IMPACT);
        cleanup(&req);
    }

    #[tokio::test]
    async fn test_rate_limited_news_aborts_without_output() {
        let server = MockServer::start();
        let news_mock = server.mock(|when, then| {
            when.method(GET).path("/v2/everything");
            then.status(429).json_body(json!({
                "status": "error",
                "code": "rateLimited",
                "message": "You have been rate limited."
            }));
        });
        let llm_mock = server.mock(|when, then| {
            when.method(POST).path("/api/v1/chat/completions");
            then.status(200).json_body(chat_body(CLEAN_REPLY));
        });

        let req = request("Apple earnings", 2);
        let err = run(&req, &settings_for(&server), full_env)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::FetchFailed { .. }));
        news_mock.assert_hits(1);
        assert_eq!(llm_mock.hits(), 0);
        assert!(!req.output.exists());
        cleanup(&req);
    }

    #[tokio::test]
    async fn test_missing_openrouter_key_makes_no_requests() {
        let server = MockServer::start();
        let news_mock = server.mock(|when, then| {
            when.method(GET).path("/v2/everything");
            then.status(200).json_body(news_body(&["Unused"]));
        });
        let llm_mock = server.mock(|when, then| {
            when.method(POST).path("/api/v1/chat/completions");
            then.status(200).json_body(chat_body(CLEAN_REPLY));
        });

        let env = |key: &str| match key {
            NEWS_API_KEY_VAR => Some("news-key".to_string()),
            _ => None,
        };
        let req = request("Apple earnings", 2);
        let err = run(&req, &settings_for(&server), env).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::MissingCredential {
                var: OPENROUTER_API_KEY_VAR
            }
        ));
        assert_eq!(news_mock.hits(), 0);
        assert_eq!(llm_mock.hits(), 0);
        assert!(!req.output.exists());
    }

    #[tokio::test]
    async fn test_unusable_output_location_fails_before_network() {
        let server = MockServer::start();
        let news_mock = server.mock(|when, then| {
            when.method(GET).path("/v2/everything");
            then.status(200).json_body(news_body(&["Unused"]));
        });
        let llm_mock = server.mock(|when, then| {
            when.method(POST).path("/api/v1/chat/completions");
            then.status(200).json_body(chat_body(CLEAN_REPLY));
        });

        let blocker =
            std::env::temp_dir().join(format!("fna-pipeline-file-{}", rand::random::<u64>()));
        std::fs::write(&blocker, b"not a directory").unwrap();
        let req = RunRequest {
            query: "Apple earnings".to_string(),
            max_articles: 2,
            output: blocker.join("financial_news_analysis.json"),
        };

        let err = run(&req, &settings_for(&server), full_env)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::PersistFailed { .. }));
        assert_eq!(news_mock.hits(), 0);
        assert_eq!(llm_mock.hits(), 0);
        let _ = std::fs::remove_file(&blocker);
    }

    #[tokio::test]
    async fn test_zero_max_articles_rejected_before_network() {
        let server = MockServer::start();
        let news_mock = server.mock(|when, then| {
            when.method(GET).path("/v2/everything");
            then.status(200).json_body(news_body(&["Unused"]));
        });

        let req = request("Apple earnings", 0);
        let err = run(&req, &settings_for(&server), full_env)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidArgument(_)));
        assert_eq!(news_mock.hits(), 0);
    }

    #[tokio::test]
    async fn test_no_articles_found_writes_nothing() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v2/everything");
            then.status(200).json_body(news_body(&[]));
        });
        let llm_mock = server.mock(|when, then| {
            when.method(POST).path("/api/v1/chat/completions");
            then.status(200).json_body(chat_body(CLEAN_REPLY));
        });

        let req = request("nothing matches this", 5);
        let outcome = run(&req, &settings_for(&server), full_env).await.unwrap();

        assert!(matches!(
            outcome,
            RunOutcome::NoArticlesFound { requests_used: 1 }
        ));
        assert_eq!(llm_mock.hits(), 0);
        assert!(!req.output.exists());
        cleanup(&req);
    }

    #[tokio::test]
    async fn test_llm_outage_never_aborts_run() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v2/everything");
            then.status(200).json_body(news_body(&["One", "Two", "Three"]));
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/chat/completions");
            then.status(500).body("upstream exploded");
        });

        let req = request("markets", 3);
        let outcome = run(&req, &settings_for(&server), full_env).await.unwrap();
        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };

        assert_eq!(summary.failures.len(), 3);
        assert_eq!(summary.document.articles.len(), 3);
        assert!(
            summary
                .document
                .articles
                .iter()
                .all(|a| a.analysis.impact_description == FALLBACK_IMPACT)
        );
        assert!(req.output.exists());
        cleanup(&req);
    }

    #[tokio::test]
    async fn test_repeat_runs_differ_only_in_timestamps() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v2/everything");
            then.status(200)
                .json_body(news_body(&["Apple beats estimates", "Apple raises dividend"]));
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/chat/completions");
            then.status(200).json_body(chat_body(CLEAN_REPLY));
        });

        let settings = settings_for(&server);
        let req = request("Apple earnings", 2);

        let strip = |mut v: Value| {
            v["analysis_metadata"]["analysis_date"] = Value::Null;
            for a in v["articles"].as_array_mut().unwrap() {
                a["analysis_timestamp"] = Value::Null;
            }
            v
        };

        run(&req, &settings, full_env).await.unwrap();
        let first: Value =
            serde_json::from_str(&std::fs::read_to_string(&req.output).unwrap()).unwrap();
        run(&req, &settings, full_env).await.unwrap();
        let second: Value =
            serde_json::from_str(&std::fs::read_to_string(&req.output).unwrap()).unwrap();

        assert_eq!(strip(first), strip(second));
        cleanup(&req);
    }
}
