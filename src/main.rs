use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::prelude::*;

use md_scraper::config::{DEFAULT_MIN_TEXT, DEFAULT_OUTPUT_DIR, DEFAULT_TIMEOUT};
use md_scraper::pacing::Pacing;
use md_scraper::selectors::SiteProfiles;
use md_scraper::stealth::IdentityProfile;
use md_scraper::{ChromeLauncher, ScrapeConfig, ScrapeError, Scraper, WaitPolicy};

/// Scrape documentation pages with headless Chrome and save them as Markdown.
#[derive(Parser, Debug)]
#[command(name = "md-scraper", version, about)]
struct Cli {
    /// Pages to scrape, processed in the given order
    urls: Vec<String>,

    /// Directory for the .md files and the run summary
    #[arg(short, long, env = "SCRAPER_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Load signal to wait for: load, domcontentloaded or networkidle
    #[arg(long, env = "SCRAPER_WAIT_UNTIL", default_value = "load")]
    wait_until: WaitPolicy,

    /// Navigation timeout per attempt
    #[arg(long, env = "SCRAPER_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// Browser sessions running at the same time
    #[arg(short, long, env = "SCRAPER_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Extra attempts for a URL that failed
    #[arg(long, env = "SCRAPER_RETRIES", default_value_t = 0)]
    retries: u32,

    /// Fixed pause between pages
    #[arg(long, env = "SCRAPER_DELAY_MS", default_value_t = 1000)]
    delay_ms: u64,

    /// Random extra pause between pages, up to this many milliseconds
    #[arg(long, env = "SCRAPER_JITTER_MS", default_value_t = 1000)]
    jitter_ms: u64,

    /// Minimum visible characters for a page to count as having content
    #[arg(long, env = "SCRAPER_MIN_TEXT", default_value_t = DEFAULT_MIN_TEXT)]
    min_text: usize,

    /// JSON file with per-host content and noise selectors
    #[arg(long, env = "SCRAPER_SELECTORS")]
    selectors: Option<PathBuf>,

    /// Proxy server, e.g. http://127.0.0.1:8080
    #[arg(long, env = "SCRAPER_PROXY")]
    proxy: Option<String>,

    #[arg(long, env = "SCRAPER_USER_AGENT")]
    user_agent: Option<String>,

    /// Browser locale, e.g. en-US
    #[arg(long, env = "SCRAPER_LOCALE")]
    locale: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<(ScrapeConfig, Vec<String>)> {
        let mut sites = SiteProfiles::builtin();
        if let Some(path) = &self.selectors {
            let extra = SiteProfiles::load_file(path)
                .with_context(|| format!("reading selector file {}", path.display()))?;
            sites.prepend(extra)?;
        }

        let mut identity = IdentityProfile::default();
        if let Some(locale) = &self.locale {
            identity = identity.with_locale(locale);
        }
        if let Some(user_agent) = self.user_agent {
            identity.user_agent = user_agent;
        }

        let config = ScrapeConfig {
            output_dir: self.output_dir,
            wait_policy: self.wait_until,
            timeout: Duration::from_secs(self.timeout_secs),
            concurrency: self.concurrency.max(1),
            retries: self.retries,
            pacing: Pacing {
                base: Duration::from_millis(self.delay_ms),
                jitter: Duration::from_millis(self.jitter_ms),
            },
            min_text: self.min_text,
            identity,
            proxy: self.proxy,
            sites,
            ..ScrapeConfig::default()
        };
        Ok((config, self.urls))
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "md_scraper=info".into()),
        )
        .init();

    let cli = Cli::parse();
    if cli.urls.is_empty() {
        println!("{}", Cli::command().render_usage());
        println!();
        println!("Provide at least one URL to scrape. Run with --help for all options.");
        process::exit(1);
    }

    if let Err(e) = run(cli).await {
        eprintln!("❌ {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (config, urls) = cli.into_config()?;
    info!("loaded {} site profile(s)", config.sites.len());

    let scraper = Scraper::new(config, Arc::new(ChromeLauncher));
    let report = match scraper.run(&urls).await {
        Ok(report) => report,
        Err(e @ ScrapeError::Launch(_)) => {
            return Err(e).context("is Chrome or Chromium installed? try the check-browser binary")
        }
        Err(e) => return Err(e.into()),
    };

    println!();
    println!("📊 Total: {}", report.total());
    println!("✅ Successful: {}", report.succeeded());
    println!("❌ Failed: {}", report.failed());
    println!("📄 Summary: {}", report.summary_path.display());
    Ok(())
}
