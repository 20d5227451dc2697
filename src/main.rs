//! # Financial News Analyzer
//!
//! Fetches recent financial news from NewsAPI, asks an OpenRouter-hosted
//! language model to judge each article's market sentiment and affected
//! stocks, and writes the combined records to a JSON file.
//!
//! ## Usage
//!
//! ```sh
//! export NEWS_API_KEY=...
//! export OPENROUTER_API_KEY=...
//! financial_news_analyzer -q "Apple earnings" -n 5
//! ```
//!
//! ## Architecture
//!
//! The application is a strictly sequential pipeline:
//! 1. **Credentials**: API keys are read from the environment
//! 2. **Fetching**: one NewsAPI request for the most recent matching articles
//! 3. **Processing**: each article is sent to the model, one at a time
//! 4. **Output**: the result document is written and a short report printed

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod analyzer;
mod api;
mod cli;
mod config;
mod error;
mod models;
mod news;
mod outputs;
mod pipeline;
mod utils;

use cli::Cli;
use config::Settings;
use outputs::report;
use pipeline::RunOutcome;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    info!("financial_news_analyzer starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let settings = match Settings::load(args.config.as_deref()).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to load settings");
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let request = args.run_request();
    info!(query = %request.query, max_articles = request.max_articles, "Starting financial news analysis");

    let result = pipeline::run(&request, &settings, |key| std::env::var(key).ok()).await;

    let elapsed = start_time.elapsed();
    match result {
        Ok(RunOutcome::NoArticlesFound { requests_used }) => {
            info!(requests_used, ?elapsed, "Nothing to analyze");
            println!("No news articles found for query '{}'. Nothing to analyze.", request.query);
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Completed(summary)) => {
            info!(
                ?elapsed,
                secs = elapsed.as_secs(),
                millis = elapsed.subsec_millis(),
                articles = summary.document.articles.len(),
                failed = summary.failures.len(),
                "Execution complete"
            );
            report::print_report(&summary.document, args.report_limit);
            println!(
                "\nAnalyzed {} articles ({} analysis failures). Results saved to {}",
                summary.document.articles.len(),
                summary.failures.len(),
                summary.output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, ?elapsed, "Run aborted");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
