//! Output documents and the run summary.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::config::SUMMARY_FILE;
use crate::error::Result;

pub const DEFAULT_FILENAME: &str = "index.md";

/// Result of one input URL. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub url: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
}

impl Outcome {
    pub fn succeeded(url: &str, filename: String, size_bytes: u64) -> Self {
        Self {
            url: url.to_string(),
            success: true,
            filename: Some(filename),
            size_bytes: Some(size_bytes),
            error_message: None,
        }
    }

    pub fn failed(url: &str, error_message: String) -> Self {
        Self {
            url: url.to_string(),
            success: false,
            filename: None,
            size_bytes: None,
            error_message: Some(error_message),
        }
    }
}

/// `https://docs.example.com/en/114/topic` -> `114-topic.md`.
///
/// Uses the last two non-empty path segments; URLs without any fall back
/// to [`DEFAULT_FILENAME`].
pub fn derive_filename(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url) else {
        return DEFAULT_FILENAME.to_string();
    };

    let segments: Vec<&str> = parsed
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        return DEFAULT_FILENAME.to_string();
    }

    let tail = &segments[segments.len().saturating_sub(2)..];
    format!("{}.md", tail.join("-"))
}

/// Metadata header followed by the converted body.
pub fn render_document(title: &str, url: &str, captured_at: DateTime<Utc>, body: &str) -> String {
    let title = if title.trim().is_empty() { url } else { title.trim() };
    format!(
        "# {}\n\n> Source: {}\n> Scraped: {}\n\n---\n\n{}\n",
        title,
        url,
        captured_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        body.trim_end()
    )
}

/// Writes `content` to `dir/filename` through a uniquely named temporary
/// sibling, so a failed write never leaves a partial document and
/// concurrent writers of the same filename never share a temp file.
/// Returns the number of bytes written.
pub async fn write_document(dir: &Path, filename: &str, content: &str) -> Result<u64> {
    fs::create_dir_all(dir).await?;
    let dir = dir.to_path_buf();
    let target = dir.join(filename);
    let bytes = content.as_bytes().to_vec();
    let size = bytes.len() as u64;

    let written = target.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut partial = tempfile::Builder::new()
            .prefix(".")
            .suffix(".part")
            .tempfile_in(&dir)?;
        partial.write_all(&bytes)?;
        // Dropping an unpersisted temp file removes it.
        partial.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

    debug!("wrote {} ({} bytes)", written.display(), size);
    Ok(size)
}

/// Writes the ordered outcome list as `_scrape-summary.json`.
pub async fn write_summary(dir: &Path, outcomes: &[Outcome]) -> Result<PathBuf> {
    fs::create_dir_all(dir).await?;
    let path = dir.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(outcomes)?;
    fs::write(&path, json).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn filename_from_last_two_segments() {
        assert_eq!(derive_filename("https://docs.example.com/en/114/topic"), "114-topic.md");
        assert_eq!(derive_filename("https://docs.example.com/guide/"), "guide.md");
        assert_eq!(derive_filename("https://a.test//x//y//z/"), "y-z.md");
        assert_eq!(derive_filename("https://a.test/x/y?page=2#frag"), "x-y.md");
    }

    #[test]
    fn filename_falls_back_without_segments() {
        assert_eq!(derive_filename("https://example.com"), "index.md");
        assert_eq!(derive_filename("https://example.com/"), "index.md");
        assert_eq!(derive_filename("not a url"), "index.md");
    }

    #[test]
    fn document_has_metadata_header() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let doc = render_document("Widgets", "https://docs.test/w", at, "Body text\n\n");
        assert_eq!(
            doc,
            "# Widgets\n\n> Source: https://docs.test/w\n> Scraped: 2024-05-01T12:30:00Z\n\n---\n\nBody text\n"
        );
    }

    #[test]
    fn untitled_pages_use_the_url() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let doc = render_document("  ", "https://docs.test/w", at, "x");
        assert!(doc.starts_with("# https://docs.test/w\n"));
    }

    #[test]
    fn outcome_serializes_camel_case_without_empty_fields() {
        let ok = serde_json::to_value(Outcome::succeeded("https://a.test/x", "x.md".into(), 42)).unwrap();
        assert_eq!(
            ok,
            serde_json::json!({"url": "https://a.test/x", "success": true, "filename": "x.md", "sizeBytes": 42})
        );

        let failed = serde_json::to_value(Outcome::failed("https://a.test/y", "boom".into())).unwrap();
        assert_eq!(
            failed,
            serde_json::json!({"url": "https://a.test/y", "success": false, "errorMessage": "boom"})
        );
    }

    #[tokio::test]
    async fn writes_document_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");

        let size = write_document(&out, "a-b.md", "hello").await.unwrap();
        assert_eq!(size, 5);
        assert_eq!(std::fs::read_to_string(out.join("a-b.md")).unwrap(), "hello");
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1);

        let outcomes = vec![
            Outcome::succeeded("https://a.test/a/b", "a-b.md".into(), size),
            Outcome::failed("https://a.test/c", "timeout".into()),
        ];
        let path = write_summary(&out, &outcomes).await.unwrap();
        assert_eq!(path, out.join("_scrape-summary.json"));

        let read: Vec<Outcome> =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(read, outcomes);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_to_one_filename_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().to_path_buf();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let out = out.clone();
            tasks.spawn(async move {
                let content = format!("document {:02}\n", i);
                let size = write_document(&out, "guide-intro.md", &content).await?;
                Ok::<_, crate::error::ScrapeError>((size, content.len() as u64))
            });
        }
        while let Some(joined) = tasks.join_next().await {
            let (size, expected) = joined.unwrap().unwrap();
            assert_eq!(size, expected);
        }

        let names: Vec<String> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["guide-intro.md"]);
        let text = std::fs::read_to_string(out.join("guide-intro.md")).unwrap();
        assert!(text.starts_with("document "));
        assert_eq!(text.len(), "document 00\n".len());
    }
}
