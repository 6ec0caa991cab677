//! The run loop: every input URL goes through navigate, extract, convert
//! and persist, and ends up as exactly one [`Outcome`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::browser::{BrowserLauncher, BrowserSession, PageDriver};
use crate::config::ScrapeConfig;
use crate::error::{Result, ScrapeError};
use crate::extract::extract;
use crate::markdown::MarkdownConverter;
use crate::navigation::{navigate, warm_up};
use crate::output::{derive_filename, render_document, write_document, write_summary, Outcome};
use crate::retry::retry_with_backoff;

/// Ordered outcomes of one run and where the summary was written.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcomes: Vec<Outcome>,
    pub summary_path: PathBuf,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }
}

#[derive(Clone)]
pub struct Scraper {
    config: Arc<ScrapeConfig>,
    launcher: Arc<dyn BrowserLauncher>,
    converter: MarkdownConverter,
}

impl Scraper {
    pub fn new(config: ScrapeConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            converter: MarkdownConverter::new(config.markdown.clone()),
            config: Arc::new(config),
            launcher,
        }
    }

    /// Scrapes `urls` and writes the run summary.
    ///
    /// Per-URL failures are recorded in the report. A browser that cannot
    /// be launched at all aborts the run: the shared session in sequential
    /// mode, or every session before the first successful one in
    /// concurrent mode.
    pub async fn run(&self, urls: &[String]) -> Result<RunReport> {
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        info!(
            "scraping {} url(s) into {} (wait: {}, concurrency: {})",
            urls.len(),
            self.config.output_dir.display(),
            self.config.wait_policy,
            self.config.concurrency
        );

        let outcomes = if self.config.concurrency <= 1 {
            self.run_sequential(urls).await?
        } else {
            self.run_concurrent(urls).await?
        };

        let summary_path = write_summary(&self.config.output_dir, &outcomes).await?;
        Ok(RunReport {
            outcomes,
            summary_path,
        })
    }

    async fn run_sequential(&self, urls: &[String]) -> Result<Vec<Outcome>> {
        let session = self
            .launcher
            .launch(&self.config.identity, self.config.proxy.as_deref())
            .await?;

        let outcomes = self.scrape_in_session(session.as_ref(), urls).await;

        if let Err(e) = session.close().await {
            warn!("failed to close browser session: {}", e);
        }
        Ok(outcomes)
    }

    async fn scrape_in_session(&self, session: &dyn BrowserSession, urls: &[String]) -> Vec<Outcome> {
        let page = match session.new_page().await {
            Ok(page) => page,
            Err(e) => {
                println!("❌ Could not open a page: {}", e);
                let message = e.to_string();
                return urls.iter().map(|url| Outcome::failed(url, message.clone())).collect();
            }
        };
        warm_up(page.as_ref(), self.config.timeout).await;

        let total = urls.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, url) in urls.iter().enumerate() {
            println!("[{}/{}] {}", index + 1, total, url);
            let outcome = self.scrape_with_retries(page.as_ref(), url).await;
            print_outcome(&outcome);
            outcomes.push(outcome);

            if index + 1 < total {
                self.config.pacing.wait().await;
            }
        }
        outcomes
    }

    async fn run_concurrent(&self, urls: &[String]) -> Result<Vec<Outcome>> {
        let gate = Arc::new(Semaphore::new(self.config.concurrency));
        let launches = Arc::new(LaunchTracker::default());
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Outcome)>();
        let total = urls.len();
        let mut tasks = JoinSet::new();

        for (index, url) in urls.iter().cloned().enumerate() {
            let gate = gate.clone();
            let launches = launches.clone();
            let tx = tx.clone();
            let scraper = self.clone();
            tasks.spawn(async move {
                let Ok(_permit) = gate.acquire_owned().await else {
                    return;
                };
                if let Some(message) = launches.fatal_message() {
                    let _ = tx.send((index, Outcome::failed(&url, message)));
                    return;
                }
                println!("[{}/{}] {}", index + 1, total, url);
                let outcome = scraper.scrape_isolated(&url, &launches).await;
                print_outcome(&outcome);
                let _ = tx.send((index, outcome));
                scraper.config.pacing.wait().await;
            });
        }
        drop(tx);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("scrape task aborted: {}", e);
            }
        }

        if let Some(err) = launches.into_fatal() {
            return Err(err);
        }

        let mut slots: Vec<Option<Outcome>> = vec![None; total];
        while let Some((index, outcome)) = rx.recv().await {
            slots[index] = Some(outcome);
        }
        Ok(slots
            .into_iter()
            .zip(urls)
            .map(|(slot, url)| slot.unwrap_or_else(|| Outcome::failed(url, "scrape task aborted".to_string())))
            .collect())
    }

    /// One URL in its own browser session.
    async fn scrape_isolated(&self, url: &str, launches: &LaunchTracker) -> Outcome {
        let session = match self
            .launcher
            .launch(&self.config.identity, self.config.proxy.as_deref())
            .await
        {
            Ok(session) => {
                launches.succeeded();
                session
            }
            Err(e) => {
                let outcome = Outcome::failed(url, e.to_string());
                launches.failed(e);
                return outcome;
            }
        };

        let outcome = match session.new_page().await {
            Ok(page) => {
                warm_up(page.as_ref(), self.config.timeout).await;
                self.scrape_with_retries(page.as_ref(), url).await
            }
            Err(e) => Outcome::failed(url, e.to_string()),
        };

        if let Err(e) = session.close().await {
            warn!("failed to close browser session for {}: {}", url, e);
        }
        outcome
    }

    async fn scrape_with_retries(&self, page: &dyn PageDriver, url: &str) -> Outcome {
        let attempts = self.config.retries.saturating_add(1);
        let result = retry_with_backoff(attempts, self.config.retry_base_delay, |_| {
            self.scrape_one(page, url)
        })
        .await;

        match result {
            Ok((filename, size)) => Outcome::succeeded(url, filename, size),
            Err(e) => Outcome::failed(url, e.to_string()),
        }
    }

    async fn scrape_one(&self, page: &dyn PageDriver, url: &str) -> Result<(String, u64)> {
        navigate(page, url, self.config.wait_policy, self.config.timeout).await?;

        let rules = self.config.sites.rules_for_url(url);
        let extraction = extract(page, rules, self.config.min_text).await?;

        let body = self.converter.convert(&extraction.html)?;
        let document = render_document(&extraction.title, &extraction.source_url, Utc::now(), &body);

        let filename = derive_filename(url);
        let size = write_document(&self.config.output_dir, &filename, &document).await?;
        Ok((filename, size))
    }
}

/// Launch results across concurrent units. A launch error is fatal as
/// long as no session has come up yet.
#[derive(Default)]
struct LaunchTracker {
    launched: AtomicUsize,
    fatal: Mutex<Option<ScrapeError>>,
}

impl LaunchTracker {
    fn succeeded(&self) {
        self.launched.fetch_add(1, Ordering::SeqCst);
    }

    fn failed(&self, err: ScrapeError) {
        if !matches!(err, ScrapeError::Launch(_)) || self.launched.load(Ordering::SeqCst) > 0 {
            return;
        }
        if let Ok(mut fatal) = self.fatal.lock() {
            fatal.get_or_insert(err);
        }
    }

    /// Set once a fatal launch error is recorded and nothing has launched.
    fn fatal_message(&self) -> Option<String> {
        if self.launched.load(Ordering::SeqCst) > 0 {
            return None;
        }
        let fatal = self.fatal.lock().ok()?;
        fatal.as_ref().map(ToString::to_string)
    }

    fn into_fatal(self: Arc<Self>) -> Option<ScrapeError> {
        if self.launched.load(Ordering::SeqCst) > 0 {
            return None;
        }
        let fatal = self.fatal.lock().ok()?.take();
        fatal
    }
}

fn print_outcome(outcome: &Outcome) {
    match (&outcome.filename, outcome.size_bytes, &outcome.error_message) {
        (Some(filename), Some(size), _) => println!("✅ Saved {} ({} bytes)", filename, size),
        (_, _, Some(message)) => println!("❌ {}", message),
        _ => {}
    }
}
