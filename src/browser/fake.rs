//! In-memory browser double for tests. Pages are plain HTML strings parsed
//! with `scraper` on every query, and navigation outcomes are scripted per
//! URL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{BrowserLauncher, BrowserSession, Navigation, PageDriver, WaitPolicy};
use crate::error::{Result, ScrapeError};
use crate::stealth::IdentityProfile;

const BLANK: &str = "<html><head></head><body></body></html>";

#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    pub html: String,
    pub status: Option<u16>,
    pub timeout_on: Vec<WaitPolicy>,
    pub error: Option<String>,
    pub latency: Duration,
}

impl FakeSite {
    pub fn page(html: &str) -> Self {
        Self {
            html: html.to_string(),
            status: Some(200),
            ..Default::default()
        }
    }

    pub fn timing_out_on(mut self, policy: WaitPolicy) -> Self {
        self.timeout_on.push(policy);
        self
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            error: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[derive(Default)]
pub struct FakeState {
    sites: Mutex<HashMap<String, FakeSite>>,
    navigations: Mutex<Vec<(String, WaitPolicy)>>,
    fail_launch: AtomicBool,
    fail_new_page: AtomicBool,
    launches: AtomicUsize,
    closes: AtomicUsize,
    open: AtomicUsize,
    max_open: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FakeBrowser {
    state: Arc<FakeState>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn site(self, url: &str, site: FakeSite) -> Self {
        self.state
            .sites
            .lock()
            .unwrap()
            .insert(url.to_string(), site);
        self
    }

    pub fn failing_launch(self) -> Self {
        self.state.fail_launch.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_new_page(self) -> Self {
        self.state.fail_new_page.store(true, Ordering::SeqCst);
        self
    }

    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.state.max_open.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<(String, WaitPolicy)> {
        self.state.navigations.lock().unwrap().clone()
    }

    /// A page that is not attached to any session, for stage-level tests.
    pub fn page(&self) -> FakePage {
        FakePage::new(self.state.clone())
    }
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn launch(
        &self,
        _profile: &IdentityProfile,
        _proxy: Option<&str>,
    ) -> Result<Box<dyn BrowserSession>> {
        if self.state.fail_launch.load(Ordering::SeqCst) {
            return Err(ScrapeError::Launch("chrome binary not found".to_string()));
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        let open = self.state.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_open.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(FakeSession {
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct FakeSession {
    state: Arc<FakeState>,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn new_page(&self) -> Result<Box<dyn PageDriver>> {
        if self.state.fail_new_page.load(Ordering::SeqCst) {
            return Err(ScrapeError::Browser("target crashed".to_string()));
        }
        Ok(Box::new(FakePage::new(self.state.clone())))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closes.fetch_add(1, Ordering::SeqCst);
            self.state.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub struct FakePage {
    state: Arc<FakeState>,
    document: Mutex<String>,
    url: Mutex<String>,
}

impl FakePage {
    fn new(state: Arc<FakeState>) -> Self {
        Self {
            state,
            document: Mutex::new(BLANK.to_string()),
            url: Mutex::new("about:blank".to_string()),
        }
    }

    fn with_document<T>(&self, f: impl FnOnce(&Html) -> T) -> T {
        let document = Html::parse_document(&self.document.lock().unwrap());
        f(&document)
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| ScrapeError::Browser(format!("bad selector {}: {:?}", selector, e)))
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str, wait: WaitPolicy, timeout: Duration) -> Result<Navigation> {
        self.state
            .navigations
            .lock()
            .unwrap()
            .push((url.to_string(), wait));

        if url == "about:blank" {
            *self.document.lock().unwrap() = BLANK.to_string();
            *self.url.lock().unwrap() = url.to_string();
            return Ok(Navigation::default());
        }

        let site = self.state.sites.lock().unwrap().get(url).cloned();
        let site = site.ok_or_else(|| ScrapeError::Navigation {
            url: url.to_string(),
            reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
        })?;

        if !site.latency.is_zero() {
            tokio::time::sleep(site.latency).await;
        }
        if let Some(reason) = site.error {
            return Err(ScrapeError::Navigation {
                url: url.to_string(),
                reason,
            });
        }
        if site.timeout_on.contains(&wait) {
            return Err(ScrapeError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            });
        }

        *self.document.lock().unwrap() = site.html;
        *self.url.lock().unwrap() = url.to_string();
        Ok(Navigation {
            status: site.status,
        })
    }

    async fn title(&self) -> Result<String> {
        let selector = parse_selector("title")?;
        Ok(self.with_document(|doc| {
            doc.select(&selector)
                .next()
                .map(|t| t.text().collect::<String>().trim().to_string())
                .unwrap_or_default()
        }))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn remove_all(&self, selector: &str) -> Result<usize> {
        let selector = parse_selector(selector)?;
        let mut guard = self.document.lock().unwrap();
        let mut document = Html::parse_document(&guard);

        let ids: Vec<_> = document.select(&selector).map(|el| el.id()).collect();
        for id in &ids {
            if let Some(mut node) = document.tree.get_mut(*id) {
                node.detach();
            }
        }
        *guard = document.html();
        Ok(ids.len())
    }

    async fn inner_html(&self, selector: &str) -> Result<Option<String>> {
        let selector = parse_selector(selector)?;
        Ok(self.with_document(|doc| doc.select(&selector).next().map(|el| el.inner_html())))
    }

    async fn body_html(&self) -> Result<String> {
        let selector = parse_selector("body")?;
        Ok(self.with_document(|doc| {
            doc.select(&selector)
                .next()
                .map(|el| el.inner_html())
                .unwrap_or_default()
        }))
    }

    async fn text_length(&self, selector: Option<&str>) -> Result<usize> {
        let selector = parse_selector(selector.unwrap_or("body"))?;
        Ok(self.with_document(|doc| {
            doc.select(&selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().chars().count())
                .unwrap_or(0)
        }))
    }
}
