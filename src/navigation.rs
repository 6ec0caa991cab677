use std::time::Duration;

use tracing::{debug, warn};

use crate::browser::{Navigation, PageDriver, WaitPolicy};
use crate::error::Result;

/// Policy used for the single retry after a timeout.
pub const FALLBACK_POLICY: WaitPolicy = WaitPolicy::DomContentLoaded;

/// Load `url`, downgrading once to DOM-ready on a timeout.
///
/// Only timeouts are retried; every other navigation failure propagates
/// as is. HTTP error statuses are logged and do not fail the navigation.
pub async fn navigate(
    page: &dyn PageDriver,
    url: &str,
    primary: WaitPolicy,
    timeout: Duration,
) -> Result<Navigation> {
    let navigation = match page.goto(url, primary, timeout).await {
        Ok(navigation) => navigation,
        Err(err) if err.is_timeout() && primary != FALLBACK_POLICY => {
            warn!(
                "{} timed out waiting for '{}', retrying with '{}'",
                url, primary, FALLBACK_POLICY
            );
            page.goto(url, FALLBACK_POLICY, timeout).await?
        }
        Err(err) => return Err(err),
    };

    if let Some(status) = navigation.status {
        if status >= 400 {
            warn!("{} answered with HTTP {}", url, status);
        }
    }
    Ok(navigation)
}

/// Throwaway navigation that absorbs browser cold-start latency.
pub async fn warm_up(page: &dyn PageDriver, timeout: Duration) {
    match page.goto("about:blank", WaitPolicy::Load, timeout).await {
        Ok(_) => debug!("session warmed up"),
        Err(e) => warn!("warm-up navigation failed: {}", e),
    }
}
