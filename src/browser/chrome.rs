//! `headless_chrome` backend.
//!
//! The DevTools client is blocking, so every call is moved onto the
//! blocking pool and the tab is shared through its `Arc`.

use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::util::Timeout;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use tracing::{debug, warn};

use super::{BrowserLauncher, BrowserSession, Navigation, PageDriver, WaitPolicy};
use crate::error::{Result, ScrapeError};
use crate::stealth::{self, IdentityProfile};

const NETWORK_QUIET: Duration = Duration::from_millis(500);
const NETWORK_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher;

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(
        &self,
        profile: &IdentityProfile,
        proxy: Option<&str>,
    ) -> Result<Box<dyn BrowserSession>> {
        let args = stealth::launch_args(profile, proxy);
        let viewport = profile.viewport;

        let browser = tokio::task::spawn_blocking(move || {
            let os_args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();
            Browser::new(LaunchOptions {
                // headless comes from --headless=new in the args
                headless: false,
                window_size: Some(viewport),
                idle_browser_timeout: Duration::from_secs(600),
                args: os_args,
                ..Default::default()
            })
        })
        .await
        .map_err(|e| ScrapeError::Launch(e.to_string()))?
        .map_err(|e| ScrapeError::Launch(format!("{:#}", e)))?;

        debug!("browser launched");
        Ok(Box::new(ChromeSession {
            browser: Mutex::new(Some(Arc::new(browser))),
            profile: profile.clone(),
        }))
    }
}

pub struct ChromeSession {
    browser: Mutex<Option<Arc<Browser>>>,
    profile: IdentityProfile,
}

impl ChromeSession {
    fn browser(&self) -> Result<Arc<Browser>> {
        self.browser
            .lock()
            .map_err(|_| ScrapeError::Browser("browser handle poisoned".to_string()))?
            .clone()
            .ok_or_else(|| ScrapeError::Browser("browser session already closed".to_string()))
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn new_page(&self) -> Result<Box<dyn PageDriver>> {
        let browser = self.browser()?;
        let profile = self.profile.clone();

        let tab = tokio::task::spawn_blocking(move || -> anyhow::Result<Arc<Tab>> {
            let tab = browser.new_tab()?;
            stealth::apply_identity(&tab, &profile)?;
            Ok(tab)
        })
        .await
        .map_err(|e| ScrapeError::Browser(e.to_string()))??;

        Ok(Box::new(ChromePage { tab }))
    }

    async fn close(&self) -> Result<()> {
        let taken = self
            .browser
            .lock()
            .map_err(|_| ScrapeError::Browser("browser handle poisoned".to_string()))?
            .take();

        if let Some(browser) = taken {
            // Dropping the last handle kills the Chrome process.
            tokio::task::spawn_blocking(move || drop(browser))
                .await
                .map_err(|e| ScrapeError::Browser(e.to_string()))?;
            debug!("browser closed");
        }
        Ok(())
    }
}

pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Tab>) -> anyhow::Result<T> + Send + 'static,
    {
        let tab = self.tab.clone();
        let value = tokio::task::spawn_blocking(move || f(tab))
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))??;
        Ok(value)
    }

    async fn eval(&self, script: String) -> Result<Option<Value>> {
        self.blocking(move |tab| Ok(tab.evaluate(&script, false)?.value))
            .await
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn goto(&self, url: &str, wait: WaitPolicy, timeout: Duration) -> Result<Navigation> {
        let target = url.to_string();
        let tab = self.tab.clone();

        let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            tab.set_default_timeout(timeout);
            // The outgoing document gets a marker so the DOM-ready wait
            // cannot mistake it for the target.
            if let Err(e) = tab.evaluate(MARK_STALE_JS, false) {
                debug!("could not mark current document: {}", e);
            }
            tab.navigate_to(&target)?;
            match wait {
                WaitPolicy::Load => {
                    tab.wait_until_navigated()?;
                }
                WaitPolicy::DomContentLoaded => {
                    wait_for_new_document(&tab, timeout)?;
                }
                WaitPolicy::NetworkIdle => {
                    let started = Instant::now();
                    tab.wait_until_navigated()?;
                    wait_for_network_idle(&tab, timeout.saturating_sub(started.elapsed()))?;
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| ScrapeError::Browser(e.to_string()))?;

        if let Err(err) = outcome {
            return Err(classify_navigation_error(url, timeout, &err));
        }

        let status = self
            .eval(NAVIGATION_STATUS_JS.to_string())
            .await
            .unwrap_or_else(|e| {
                warn!("could not read response status for {}: {}", url, e);
                None
            })
            .and_then(|v| v.as_u64())
            .and_then(|v| u16::try_from(v).ok())
            .filter(|s| *s > 0);

        Ok(Navigation { status })
    }

    async fn title(&self) -> Result<String> {
        let value = self.eval("document.title".to_string()).await?;
        Ok(as_string(value).unwrap_or_default())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }

    async fn remove_all(&self, selector: &str) -> Result<usize> {
        let script = format!(
            "(() => {{ const els = document.querySelectorAll({}); els.forEach(e => e.remove()); return els.length; }})()",
            js_string(selector)?
        );
        let value = self.eval(script).await?;
        Ok(value.and_then(|v| v.as_u64()).unwrap_or(0) as usize)
    }

    async fn inner_html(&self, selector: &str) -> Result<Option<String>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.innerHTML : null; }})()",
            js_string(selector)?
        );
        Ok(as_string(self.eval(script).await?))
    }

    async fn body_html(&self) -> Result<String> {
        let value = self
            .eval("document.body ? document.body.innerHTML : ''".to_string())
            .await?;
        Ok(as_string(value).unwrap_or_default())
    }

    async fn text_length(&self, selector: Option<&str>) -> Result<usize> {
        let target = match selector {
            Some(sel) => format!("document.querySelector({})", js_string(sel)?),
            None => "document.body".to_string(),
        };
        let script = format!(
            "(() => {{ const el = {}; return el ? (el.innerText || '').trim().length : 0; }})()",
            target
        );
        let value = self.eval(script).await?;
        Ok(value.and_then(|v| v.as_u64()).unwrap_or(0) as usize)
    }
}

const NAVIGATION_STATUS_JS: &str = r#"
    (() => {
        const entry = performance.getEntriesByType('navigation')[0];
        return entry && entry.responseStatus ? entry.responseStatus : null;
    })()
"#;

const RESOURCE_COUNT_JS: &str = "performance.getEntriesByType('resource').length";

const MARK_STALE_JS: &str = "window.__mdScraperStale = true";

const DOCUMENT_READY_JS: &str =
    "!window.__mdScraperStale && document.readyState !== 'loading'";

/// Calls `ready` every `NETWORK_POLL` until it reports true or `timeout`
/// runs out, in which case the error is a [`Timeout`].
fn poll_until(timeout: Duration, mut ready: impl FnMut() -> anyhow::Result<bool>) -> anyhow::Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if ready()? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Timeout.into());
        }
        std::thread::sleep(NETWORK_POLL);
    }
}

/// Waits until the navigated-to document has parsed its DOM.
fn wait_for_new_document(tab: &Arc<Tab>, timeout: Duration) -> anyhow::Result<()> {
    poll_until(timeout, || {
        // Evaluation fails while the old context is torn down.
        Ok(tab
            .evaluate(DOCUMENT_READY_JS, false)
            .ok()
            .and_then(|r| r.value)
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    })
}

/// Polls the resource timing list until it stops growing for `NETWORK_QUIET`.
fn wait_for_network_idle(tab: &Arc<Tab>, timeout: Duration) -> anyhow::Result<()> {
    let mut last_count = None;
    let mut quiet_since = Instant::now();

    poll_until(timeout, || {
        let count = tab
            .evaluate(RESOURCE_COUNT_JS, false)?
            .value
            .and_then(|v| v.as_u64());

        if count != last_count {
            last_count = count;
            quiet_since = Instant::now();
            return Ok(false);
        }
        Ok(quiet_since.elapsed() >= NETWORK_QUIET)
    })
}

fn classify_navigation_error(url: &str, timeout: Duration, err: &anyhow::Error) -> ScrapeError {
    let message = format!("{:#}", err);
    // Chrome reports network-level timeouts only as a net error string.
    let timed_out = err.downcast_ref::<Timeout>().is_some() || message.contains("ERR_TIMED_OUT");
    if timed_out {
        ScrapeError::NavigationTimeout {
            url: url.to_string(),
            timeout,
        }
    } else {
        ScrapeError::Navigation {
            url: url.to_string(),
            reason: message,
        }
    }
}

fn js_string(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn as_string(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}
