//! Content and noise selector tables.
//!
//! Both tables are ordered: content candidates are tried first-match-wins,
//! noise selectors are removed in sequence. Per-host profiles replace the
//! defaults on an exact hostname match.

use std::path::Path;

use once_cell::sync::Lazy;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ScrapeError};

pub static DEFAULT_CONTENT: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "main",
        "article",
        "[role=\"main\"]",
        ".content",
        ".main-content",
        ".markdown-body",
        ".documentation",
        "#content",
    ]
});

pub static DEFAULT_NOISE: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "nav",
        ".sidebar",
        ".breadcrumb",
        "footer",
        ".toc",
        ".table-of-contents",
        "script",
        "style",
        "noscript",
    ]
});

fn default_content() -> Vec<String> {
    DEFAULT_CONTENT.iter().map(|s| s.to_string()).collect()
}

fn default_noise() -> Vec<String> {
    DEFAULT_NOISE.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorRules {
    #[serde(default = "default_content")]
    pub content: Vec<String>,
    #[serde(default = "default_noise")]
    pub noise: Vec<String>,
}

impl Default for SelectorRules {
    fn default() -> Self {
        Self {
            content: default_content(),
            noise: default_noise(),
        }
    }
}

impl SelectorRules {
    fn validate(&self) -> Result<()> {
        for selector in self.content.iter().chain(self.noise.iter()) {
            Selector::parse(selector)
                .map_err(|e| ScrapeError::Selectors(format!("'{}': {:?}", selector, e)))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteProfile {
    pub host: String,
    #[serde(flatten)]
    pub rules: SelectorRules,
}

/// Ordered host -> rules table with a default fallback.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SiteProfiles {
    profiles: Vec<SiteProfile>,
    fallback: SelectorRules,
}

impl SiteProfiles {
    /// Defaults plus a few documentation hosts with known layouts.
    pub fn builtin() -> Self {
        let mut noise = default_noise();
        noise.extend([".document-toc-container".to_string(), ".bc-table".to_string()]);

        let profiles = vec![
            SiteProfile {
                host: "developer.mozilla.org".to_string(),
                rules: SelectorRules {
                    content: vec!["main#content article".to_string(), "main".to_string()],
                    noise,
                },
            },
            SiteProfile {
                host: "docs.rs".to_string(),
                rules: SelectorRules {
                    content: vec!["#main-content".to_string(), "main".to_string()],
                    noise: {
                        let mut noise = default_noise();
                        noise.push(".sidebar-elems".to_string());
                        noise
                    },
                },
            },
        ];

        Self {
            profiles,
            fallback: SelectorRules::default(),
        }
    }

    /// Rules for `host`: first exact match, else the defaults.
    pub fn rules_for(&self, host: &str) -> &SelectorRules {
        self.profiles
            .iter()
            .find(|p| p.host.eq_ignore_ascii_case(host))
            .map(|p| &p.rules)
            .unwrap_or(&self.fallback)
    }

    /// Rules for the host part of `url`.
    pub fn rules_for_url(&self, url: &str) -> &SelectorRules {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default();
        self.rules_for(&host)
    }

    /// Puts `extra` in front of the existing profiles so they win lookups.
    pub fn prepend(&mut self, extra: Vec<SiteProfile>) -> Result<()> {
        for profile in &extra {
            profile.rules.validate()?;
        }
        let mut merged = extra;
        merged.append(&mut self.profiles);
        self.profiles = merged;
        Ok(())
    }

    /// Reads a JSON array of `{ "host", "content"?, "noise"? }` entries.
    pub fn load_file(path: &Path) -> Result<Vec<SiteProfile>> {
        let content = std::fs::read_to_string(path)?;
        let profiles: Vec<SiteProfile> = serde_json::from_str(&content)?;
        info!("Loaded {} site profiles from {}", profiles.len(), path.display());
        Ok(profiles)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
