//! Headless-browser scraper that saves documentation pages as Markdown.
//!
//! The pipeline per URL is navigate, extract, convert, persist; see
//! [`pipeline::Scraper`].

pub mod browser;
pub mod config;
pub mod error;
pub mod extract;
pub mod markdown;
pub mod navigation;
pub mod output;
pub mod pacing;
pub mod pipeline;
pub mod retry;
pub mod selectors;
pub mod stealth;

pub use browser::{ChromeLauncher, WaitPolicy};
pub use config::ScrapeConfig;
pub use error::{Result, ScrapeError};
pub use markdown::{html_to_markdown, MarkdownConverter, MarkdownOptions};
pub use output::Outcome;
pub use pipeline::{RunReport, Scraper};
