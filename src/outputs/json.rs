//! JSON output of the result document.
//!
//! The document is written pretty-printed to a single path. Each run
//! replaces whatever was there before; nothing is appended or merged.

use crate::error::AppError;
use crate::models::ResultDocument;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`ResultDocument`] to `path`, creating parent directories as needed.
///
/// # Errors
///
/// [`AppError::PersistFailed`] if serialization, directory creation or the
/// write itself fails.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_document(document: &ResultDocument, path: &Path) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(document)
        .map_err(|e| AppError::persist(format!("serializing results: {e}")))?;

    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create output dir");
            return Err(AppError::persist(format!("{}: {e}", dir.display())));
        }
    }

    fs::write(path, json).await.map_err(|e| {
        error!(error = %e, "Failed writing JSON");
        AppError::persist(format!("{}: {e}", path.display()))
    })?;

    info!(
        articles = document.articles.len(),
        "Wrote analysis results"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Analysis, AnalyzedArticle, sample_article};
    use chrono::Utc;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("fna-json-{}", rand::random::<u64>()))
            .join(name)
    }

    fn document(headlines: &[&str]) -> ResultDocument {
        let now = Utc::now();
        let articles = headlines
            .iter()
            .map(|h| AnalyzedArticle {
                article: sample_article(h),
                analysis: Analysis::fallback(now),
            })
            .collect();
        ResultDocument::new(articles, 1, "test/model", now)
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let path = temp_path("out.json");
        let doc = document(&["Ünïcode headline", "Second"]);
        write_document(&doc, &path).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Ünïcode headline"));
        assert!(raw.contains("\n  \"analysis_metadata\""));
        let back: ResultDocument = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, doc);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_write_overwrites_previous_run() {
        let path = temp_path("out.json");
        write_document(&document(&["Old one", "Old two"]), &path)
            .await
            .unwrap();
        write_document(&document(&["New"]), &path).await.unwrap();

        let back: ResultDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.analysis_metadata.total_articles, 1);
        assert_eq!(back.articles[0].article.headline, "New");

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_write_to_directory_path_fails() {
        let dir = temp_path("occupied");
        std::fs::create_dir_all(&dir).unwrap();
        let err = write_document(&document(&["x"]), &dir).await.unwrap_err();
        assert!(matches!(err, AppError::PersistFailed { .. }));

        let _ = std::fs::remove_dir_all(dir.parent().unwrap());
    }
}
