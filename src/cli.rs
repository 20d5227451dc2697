//! Command-line interface definitions for the Financial News Analyzer.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every option has a default, so running the binary without arguments
//! performs a complete run. Options can also be provided via environment
//! variables. API keys are deliberately not flags; they are read from the
//! environment only.

use crate::pipeline::RunRequest;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Financial News Analyzer.
///
/// # Examples
///
/// ```sh
/// # Default query, 3 articles, ./financial_news_analysis.json
/// financial_news_analyzer
///
/// # Custom query and count
/// financial_news_analyzer -q "Apple earnings" -n 5 -o out/apple.json
///
/// # Endpoints and retry policy from a settings file
/// financial_news_analyzer --config settings.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// News search query
    #[arg(
        short,
        long,
        env = "NEWS_QUERY",
        default_value = "stock market technology companies"
    )]
    pub query: String,

    /// Maximum number of articles to fetch and analyze (1-100)
    #[arg(short = 'n', long, env = "MAX_ARTICLES", default_value_t = 3)]
    pub max_articles: usize,

    /// Path of the JSON results file (overwritten on every run)
    #[arg(
        short,
        long,
        env = "ANALYSIS_OUTPUT",
        default_value = "financial_news_analysis.json"
    )]
    pub output: PathBuf,

    /// Number of analyzed articles to print to the console
    #[arg(long, env = "REPORT_LIMIT", default_value_t = 2)]
    pub report_limit: usize,

    /// Optional path to a YAML settings file
    #[arg(short, long, env = "ANALYZER_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn run_request(&self) -> RunRequest {
        RunRequest {
            query: self.query.clone(),
            max_articles: self.max_articles,
            output: self.output.clone(),
        }
    }
}
