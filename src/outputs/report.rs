//! Console summary of a finished run.

use crate::models::ResultDocument;
use std::fmt::Write;

const RULE_WIDTH: usize = 50;

/// Render the first `limit` analyzed articles as plain text.
pub fn render_report(document: &ResultDocument, limit: usize) -> String {
    let mut out = String::new();
    let meta = &document.analysis_metadata;

    writeln!(out, "Sample Analysis Results").unwrap();
    writeln!(out, "{}", "=".repeat(RULE_WIDTH)).unwrap();
    writeln!(
        out,
        "Model: {} | Articles: {} | News API requests: {}",
        meta.model_used, meta.total_articles, meta.news_api_requests_used
    )
    .unwrap();

    for (i, analyzed) in document.articles.iter().take(limit).enumerate() {
        let analysis = &analyzed.analysis;
        let stocks = if analysis.affected_stocks.is_empty() {
            "None identified".to_string()
        } else {
            analysis.affected_stocks.join(", ")
        };

        writeln!(out, "\nArticle {}:", i + 1).unwrap();
        writeln!(out, "Headline: {}", analyzed.article.headline).unwrap();
        writeln!(out, "Sentiment: {}", analysis.sentiment.as_str().to_uppercase()).unwrap();
        writeln!(out, "Affected Stocks: {stocks}").unwrap();
        writeln!(out, "Impact: {}", analysis.impact_description).unwrap();
        writeln!(out, "Confidence: {}", analysis.confidence.as_str().to_uppercase()).unwrap();
        writeln!(out, "{}", "-".repeat(30)).unwrap();
    }

    let hidden = document.articles.len().saturating_sub(limit);
    if hidden > 0 {
        writeln!(out, "\n(+{hidden} more in the output file)").unwrap();
    }
    out
}

/// Print the report to stdout.
pub fn print_report(document: &ResultDocument, limit: usize) {
    print!("{}", render_report(document, limit));
}
