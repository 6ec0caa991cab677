//! Browser identity and automation masking.
//!
//! Every session runs with a fixed identity profile (user agent, viewport,
//! locale, timezone, extra headers). The launch flags and the init script
//! below hide the usual automation markers before any page script runs.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use headless_chrome::protocol::cdp::Emulation::{SetLocaleOverride, SetTimezoneOverride};
use headless_chrome::protocol::cdp::Page::AddScriptToEvaluateOnNewDocument;
use headless_chrome::Tab;
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub locale: String,
    pub timezone: String,
    pub extra_headers: Vec<(String, String)>,
}

impl Default for IdentityProfile {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport: (1920, 1080),
            locale: "en-US".to_string(),
            timezone: "America/New_York".to_string(),
            extra_headers: vec![(
                "Accept-Language".to_string(),
                "en-US,en;q=0.9".to_string(),
            )],
        }
    }
}

impl IdentityProfile {
    /// Primary language tag, e.g. `en` for `en-US`.
    pub fn language(&self) -> &str {
        self.locale.split('-').next().unwrap_or(&self.locale)
    }

    /// Switches locale and keeps `Accept-Language` in step with it.
    pub fn with_locale(mut self, locale: &str) -> Self {
        self.locale = locale.to_string();
        let accept = format!("{},{};q=0.9", locale, self.language());
        self.extra_headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("Accept-Language"));
        self.extra_headers.push(("Accept-Language".to_string(), accept));
        self
    }
}

/// Fixed Chrome flags for a headless, automation-masked session.
pub fn launch_args(profile: &IdentityProfile, proxy: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = [
        "--disable-blink-features=AutomationControlled",
        "--no-sandbox",
        "--disable-dev-shm-usage",
        "--disable-infobars",
        "--window-position=0,0",
        "--incognito",
        "--headless=new",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.push(format!("--user-agent={}", profile.user_agent));
    args.push(format!("--lang={}", profile.locale));

    if let Some(proxy) = proxy {
        args.push(format!("--proxy-server={}", proxy));
    }
    args
}

/// Init script injected via `Page.addScriptToEvaluateOnNewDocument`.
pub fn stealth_script(profile: &IdentityProfile) -> String {
    let languages = format!("['{}', '{}']", profile.locale, profile.language());

    let base_script = r#"
        // navigator.webdriver
        Object.defineProperty(navigator, 'webdriver', {
            get: () => undefined,
        });

        // Headless Chrome ships without window.chrome
        window.chrome = {
            runtime: {
                connect: function() {
                    return {
                        onMessage: { addListener: function() {}, removeListener: function() {} },
                        postMessage: function() {},
                        disconnect: function() {}
                    };
                },
                sendMessage: function() {},
                onMessage: { addListener: function() {}, removeListener: function() {} }
            },
            app: { isInstalled: false },
            csi: function() {},
            loadTimes: function() { return {}; }
        };

        // Plugins: an empty list is a headless giveaway
        Object.defineProperty(navigator, 'plugins', {
            get: () => {
                const pdf = {
                    0: { type: "application/x-google-chrome-pdf", suffixes: "pdf", description: "Portable Document Format" },
                    description: "Portable Document Format",
                    filename: "internal-pdf-viewer",
                    length: 1,
                    name: "Chrome PDF Plugin"
                };
                const p = [pdf, pdf, pdf];
                Object.setPrototypeOf(p, PluginArray.prototype);
                return p;
            }
        });

        Object.defineProperty(navigator, 'languages', {
            get: () => __LANGUAGES__,
        });

        // Notifications report 'default' instead of the headless 'denied'
        const originalQuery = window.navigator.permissions.query;
        window.navigator.permissions.query = (parameters) => (
            parameters.name === 'notifications' ?
            Promise.resolve({ state: Notification.permission }) :
            originalQuery(parameters)
        );
    "#;

    base_script.replace("__LANGUAGES__", &languages)
}

/// Apply the identity overrides to a fresh tab, before its first navigation.
pub fn apply_identity(tab: &Arc<Tab>, profile: &IdentityProfile) -> Result<()> {
    tab.call_method(AddScriptToEvaluateOnNewDocument {
        source: stealth_script(profile),
        world_name: None,
        include_command_line_api: None,
        run_immediately: None,
    })?;

    tab.set_user_agent(&profile.user_agent, Some(&profile.locale), None)?;

    tab.call_method(SetLocaleOverride {
        locale: Some(profile.locale.clone()),
    })?;
    tab.call_method(SetTimezoneOverride {
        timezone_id: profile.timezone.clone(),
    })?;

    if !profile.extra_headers.is_empty() {
        let headers: HashMap<&str, &str> = profile
            .extra_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        tab.set_extra_http_headers(headers)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_switch_updates_accept_language() {
        let profile = IdentityProfile::default().with_locale("de-DE");
        assert_eq!(profile.language(), "de");
        assert_eq!(
            profile.extra_headers,
            vec![("Accept-Language".to_string(), "de-DE,de;q=0.9".to_string())]
        );
        assert!(stealth_script(&profile).contains("['de-DE', 'de']"));
    }

    #[test]
    fn test_stealth_script_generation() {
        let script = stealth_script(&IdentityProfile::default());
        assert!(script.contains("Object.defineProperty(navigator, 'webdriver'"));
        assert!(script.contains("window.chrome = {"));
        assert!(script.contains("['en-US', 'en']"));
        assert!(!script.contains("__LANGUAGES__"));
    }

    #[test]
    fn launch_args_carry_identity_and_proxy() {
        let profile = IdentityProfile {
            user_agent: "TestAgent/1.0".to_string(),
            locale: "de-DE".to_string(),
            ..Default::default()
        };
        let args = launch_args(&profile, Some("http://127.0.0.1:8080"));
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
        assert!(args.contains(&"--user-agent=TestAgent/1.0".to_string()));
        assert!(args.contains(&"--lang=de-DE".to_string()));
        assert!(args.contains(&"--proxy-server=http://127.0.0.1:8080".to_string()));

        let args = launch_args(&profile, None);
        assert!(!args.iter().any(|a| a.starts_with("--proxy-server")));
    }

    #[test]
    fn language_is_primary_subtag() {
        let profile = IdentityProfile::default();
        assert_eq!(profile.language(), "en");
    }
}
