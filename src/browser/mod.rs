//! Seam between the scrape pipeline and the browser automation backend.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::stealth::IdentityProfile;

pub mod chrome;

#[cfg(test)]
pub mod fake;

pub use chrome::ChromeLauncher;

/// The signal a navigation waits for before the page counts as loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitPolicy {
    /// Full `load` event: frame stopped loading.
    Load,
    /// DOM parsed, subresources may still be in flight.
    DomContentLoaded,
    /// `load` plus a quiet period without new network requests.
    NetworkIdle,
}

impl fmt::Display for WaitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WaitPolicy::Load => "load",
            WaitPolicy::DomContentLoaded => "domcontentloaded",
            WaitPolicy::NetworkIdle => "networkidle",
        };
        f.write_str(name)
    }
}

impl FromStr for WaitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "load" => Ok(WaitPolicy::Load),
            "domcontentloaded" | "dom" => Ok(WaitPolicy::DomContentLoaded),
            "networkidle" | "idle" => Ok(WaitPolicy::NetworkIdle),
            other => Err(format!(
                "unknown wait policy '{}' (expected load, domcontentloaded or networkidle)",
                other
            )),
        }
    }
}

/// What a completed navigation observed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Navigation {
    /// Main document HTTP status, when the backend can observe it.
    pub status: Option<u16>,
}

/// Starts browser processes with a given identity.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(
        &self,
        profile: &IdentityProfile,
        proxy: Option<&str>,
    ) -> Result<Box<dyn BrowserSession>>;
}

/// One browser process plus one isolated browsing context.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageDriver>>;

    /// Releases the browser process. Calling it more than once is a no-op.
    async fn close(&self) -> Result<()>;
}

/// A single live page. Selector arguments are CSS selectors.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str, wait: WaitPolicy, timeout: Duration) -> Result<Navigation>;

    async fn title(&self) -> Result<String>;

    async fn current_url(&self) -> Result<String>;

    /// Removes every element matching `selector` from the live DOM.
    async fn remove_all(&self, selector: &str) -> Result<usize>;

    /// Inner markup of the first element matching `selector`.
    async fn inner_html(&self, selector: &str) -> Result<Option<String>>;

    async fn body_html(&self) -> Result<String>;

    /// Length of the visible text inside `selector`, or the whole body.
    async fn text_length(&self, selector: Option<&str>) -> Result<usize>;
}
