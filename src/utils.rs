//! Utility functions for string shortening and file system checks.
//!
//! - String truncation for log lines and prompt excerpts
//! - Output directory validation before any network traffic

use crate::error::AppError;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Byte index of the end of the first `max` characters of `s`, if `s` is longer.
fn char_boundary(s: &str, max: usize) -> Option<usize> {
    s.char_indices().nth(max).map(|(i, _)| i)
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match char_boundary(s, max) {
        None => s.to_string(),
        Some(cut) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// First `max` characters of `s`, with `...` appended when something was cut.
pub fn excerpt(s: &str, max: usize) -> String {
    match char_boundary(s, max) {
        None => s.to_string(),
        Some(cut) => format!("{}...", &s[..cut]),
    }
}

/// Ensure the directory that will hold `output` exists and is writable.
///
/// Creates the directory if needed, then performs a write test by creating
/// and immediately deleting a probe file.
///
/// # Errors
///
/// [`AppError::PersistFailed`] if the directory cannot be created or written.
#[instrument(level = "info", skip_all, fields(output = %output.display()))]
pub async fn ensure_writable_dir(output: &Path) -> Result<(), AppError> {
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::persist(format!("cannot create {}: {e}", dir.display())))?;

    let probe_path = dir.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!(dir = %dir.display(), "Output directory is writable");
            Ok(())
        }
        Err(e) => Err(AppError::persist(format!(
            "{} is not writable: {e}",
            dir.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        // "é" is two bytes; cutting by bytes would panic mid-character.
        let s = "é".repeat(10);
        assert_eq!(truncate_for_log(&s, 3), "ééé…(+14 bytes)");
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("short", 10), "short");
        assert_eq!(excerpt("abcdefghij", 10), "abcdefghij");
        assert_eq!(excerpt("abcdefghijk", 10), "abcdefghij...");
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing_dir() {
        let dir = std::env::temp_dir().join(format!("fna-utils-{}", rand::random::<u64>()));
        let output = dir.join("nested").join("out.json");
        ensure_writable_dir(&output).await.unwrap();
        assert!(dir.join("nested").is_dir());
        assert!(!dir.join("nested").join("..__probe_write__").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_parent_is_file() {
        let blocker =
            std::env::temp_dir().join(format!("fna-utils-file-{}", rand::random::<u64>()));
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = ensure_writable_dir(&blocker.join("out.json")).await.unwrap_err();
        assert!(matches!(err, AppError::PersistFailed { .. }));
        let _ = std::fs::remove_file(&blocker);
    }
}
