use tracing::debug;

use crate::browser::PageDriver;
use crate::error::{Result, ScrapeError};
use crate::selectors::SelectorRules;

/// Captured content of one page, handed straight to the converter.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub title: String,
    pub source_url: String,
    pub html: String,
}

/// Strip noise regions from the live page, then capture the first matching
/// content region (or the whole body).
///
/// Removal mutates the page, so it always runs before any capture.
pub async fn extract(
    page: &dyn PageDriver,
    rules: &SelectorRules,
    min_text: usize,
) -> Result<Extraction> {
    for selector in &rules.noise {
        let removed = page.remove_all(selector).await?;
        if removed > 0 {
            debug!("removed {} '{}' element(s)", removed, selector);
        }
    }

    let mut region = None;
    for selector in &rules.content {
        if let Some(html) = page.inner_html(selector).await? {
            debug!("content region: '{}'", selector);
            region = Some((selector.as_str(), html));
            break;
        }
    }

    let (html, chars) = match region {
        Some((selector, html)) => {
            let chars = page.text_length(Some(selector)).await?;
            (html, chars)
        }
        None => {
            debug!("no content selector matched, using <body>");
            (page.body_html().await?, page.text_length(None).await?)
        }
    };

    let source_url = page.current_url().await?;
    if chars < min_text {
        return Err(ScrapeError::ContentMissing {
            url: source_url,
            chars,
            min: min_text,
        });
    }

    let title = page.title().await?;
    Ok(Extraction {
        title,
        source_url,
        html,
    })
}
