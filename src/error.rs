use std::time::Duration;

/// Failures of a single scrape unit. Everything except `Launch` is caught
/// at the run-loop boundary and turned into a failed outcome record.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("navigation to {url} timed out after {}s", .timeout.as_secs())]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("content missing on {url}: only {chars} characters of visible text (need {min})")]
    ContentMissing { url: String, chars: usize, min: usize },

    #[error("browser failed to launch: {0}")]
    Launch(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("invalid selector table: {0}")]
    Selectors(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScrapeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScrapeError::NavigationTimeout { .. })
    }
}

impl From<anyhow::Error> for ScrapeError {
    fn from(err: anyhow::Error) -> Self {
        ScrapeError::Browser(err.to_string())
    }
}

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;
