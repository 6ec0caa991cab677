//! Verifies that Chrome can be launched with the scraper's stealth profile.

use std::ffi::OsStr;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions};

use md_scraper::stealth::{self, IdentityProfile};

fn check(profile: &IdentityProfile) -> Result<()> {
    let args = stealth::launch_args(profile, None);
    let os_args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();

    println!("🚀 Launching browser...");
    let browser = Browser::new(LaunchOptions {
        headless: false,
        window_size: Some(profile.viewport),
        idle_browser_timeout: Duration::from_secs(60),
        args: os_args,
        ..Default::default()
    })
    .context("could not launch Chrome/Chromium")?;

    let tab = browser.new_tab()?;
    stealth::apply_identity(&tab, profile)?;
    tab.navigate_to("about:blank")?;
    tab.wait_until_navigated()?;

    for (label, expression) in [
        ("navigator.webdriver", "String(navigator.webdriver)"),
        ("User-Agent", "navigator.userAgent"),
        ("Language", "navigator.language"),
        ("Languages", "navigator.languages.join(', ')"),
    ] {
        let value = tab.evaluate(expression, false)?.value;
        let shown = value
            .as_ref()
            .and_then(|v| v.as_str())
            .unwrap_or("<none>")
            .to_string();
        println!("{}: {}", label, shown);
    }
    Ok(())
}

fn main() {
    let profile = IdentityProfile::default();
    match check(&profile) {
        Ok(()) => println!("✅ Browser is ready."),
        Err(e) => {
            eprintln!("❌ Browser check failed: {:#}", e);
            eprintln!("Install Chrome or Chromium, or point CHROME to the binary.");
            process::exit(1);
        }
    }
}
