use std::path::PathBuf;
use std::time::Duration;

use crate::browser::WaitPolicy;
use crate::markdown::MarkdownOptions;
use crate::pacing::Pacing;
use crate::selectors::SiteProfiles;
use crate::stealth::IdentityProfile;

pub const DEFAULT_OUTPUT_DIR: &str = "./scraped-docs";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MIN_TEXT: usize = 100;
pub const SUMMARY_FILE: &str = "_scrape-summary.json";

/// Resolved settings for one scrape run.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub output_dir: PathBuf,
    pub wait_policy: WaitPolicy,
    pub timeout: Duration,
    /// Number of simultaneously active browser sessions. 1 means a single
    /// shared session processing URLs in order.
    pub concurrency: usize,
    /// Extra attempts per URL on top of the first one.
    pub retries: u32,
    pub retry_base_delay: Duration,
    pub pacing: Pacing,
    /// Minimum visible characters before a page counts as having content.
    pub min_text: usize,
    pub identity: IdentityProfile,
    pub proxy: Option<String>,
    pub sites: SiteProfiles,
    pub markdown: MarkdownOptions,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            wait_policy: WaitPolicy::Load,
            timeout: DEFAULT_TIMEOUT,
            concurrency: 1,
            retries: 0,
            retry_base_delay: Duration::from_secs(1),
            pacing: Pacing::default(),
            min_text: DEFAULT_MIN_TEXT,
            identity: IdentityProfile::default(),
            proxy: None,
            sites: SiteProfiles::builtin(),
            markdown: MarkdownOptions::default(),
        }
    }
}

impl ScrapeConfig {
    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join(SUMMARY_FILE)
    }
}
