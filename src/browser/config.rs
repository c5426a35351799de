//! Session configuration
//!
//! Validated, immutable-after-build settings for one browser session.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use super::BrowserError;
use crate::tunnel::TorTunnel;

/// Login page the session lands on when no URL is configured.
pub const DVSA_LOGIN_URL: &str = "https://driverpracticaltest.dvsa.gov.uk/login";

/// Default remote-debugging port.
pub const DEFAULT_PORT: u16 = 8745;

/// Default browser executable, resolved through PATH.
pub const DEFAULT_CHROME: &str = "google-chrome-stable";

/// Global counter for sequential session naming (Browser-1, Browser-2, ...)
static BROWSER_COUNTER: AtomicU32 = AtomicU32::new(1);

/// URL patterns blocked before the caller takes over. Analytics and tracking
/// endpoints only; the target site itself is never filtered.
fn default_blocked_urls() -> Vec<String> {
    vec![
        "*.google-analytics.com/*".to_string(),
        "*.googletagmanager.com/*".to_string(),
        "*.doubleclick.net/*".to_string(),
        "*.hotjar.com/*".to_string(),
        "connect.facebook.net/*".to_string(),
    ]
}

/// Configuration for a browser session.
///
/// Built via [`SessionConfig::builder`]; construction fails before any
/// process is spawned if the extension path is not an existing directory.
#[derive(Debug)]
pub struct SessionConfig {
    /// Sequential display name (Browser-1, Browser-2, ...)
    pub(crate) name: String,
    /// Remote-debugging port
    pub(crate) port: u16,
    /// Unpacked extension directory loaded into the browser, if any
    pub(crate) extension_dir: Option<PathBuf>,
    /// Browser executable name or path
    pub(crate) chrome: String,
    /// Host the devtools endpoint is reached on
    pub(crate) debugger_host: String,
    /// URL opened at launch
    pub(crate) url: String,
    /// Patterns handed to Network.setBlockedURLs after attach
    pub(crate) blocked_urls: Vec<String>,
    /// Run without a visible window
    pub(crate) headless: bool,
    /// Route traffic through a local TOR proxy
    pub(crate) tunnel: Option<TorTunnel>,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Sequential display name, used for logging correlation.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn port_arg(&self) -> String {
        format!("--remote-debugging-port={}", self.port)
    }

    pub(crate) fn extension_arg(&self) -> Option<String> {
        self.extension_dir
            .as_ref()
            .map(|dir| format!("--load-extension={}", dir.display()))
    }
}

/// Builder for [`SessionConfig`].
#[derive(Default)]
pub struct SessionConfigBuilder {
    port: Option<u16>,
    extension_dir: Option<PathBuf>,
    chrome: Option<String>,
    debugger_host: Option<String>,
    url: Option<String>,
    blocked_urls: Option<Vec<String>>,
    headless: bool,
    tunnel: Option<TorTunnel>,
}

impl SessionConfigBuilder {
    /// Set the remote-debugging port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Load an unpacked extension from `dir`. The path must be an existing
    /// directory or [`build`](Self::build) fails.
    pub fn extension_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extension_dir = Some(dir.into());
        self
    }

    /// Set the browser executable name or path.
    pub fn chrome(mut self, chrome: impl Into<String>) -> Self {
        self.chrome = Some(chrome.into());
        self
    }

    /// Set the host the devtools endpoint is reached on.
    pub fn debugger_host(mut self, host: impl Into<String>) -> Self {
        self.debugger_host = Some(host.into());
        self
    }

    /// Set the URL opened at launch.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Replace the default blocked-URL patterns.
    pub fn blocked_urls(mut self, urls: Vec<String>) -> Self {
        self.blocked_urls = Some(urls);
        self
    }

    /// Run without a visible window.
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Route browser traffic through a local TOR proxy.
    pub fn tunnel(mut self, tunnel: TorTunnel) -> Self {
        self.tunnel = Some(tunnel);
        self
    }

    /// Validate and build the configuration, assigning the next sequential
    /// session name.
    pub fn build(self) -> Result<SessionConfig, BrowserError> {
        if let Some(ref dir) = self.extension_dir {
            if !dir.is_dir() {
                return Err(BrowserError::Config(format!(
                    "extension path {} is not an existing directory; unzip the extension and pass the dir",
                    dir.display()
                )));
            }
        }

        let n = BROWSER_COUNTER.fetch_add(1, Ordering::Relaxed);

        Ok(SessionConfig {
            name: format!("Browser-{n}"),
            port: self.port.unwrap_or(DEFAULT_PORT),
            extension_dir: self.extension_dir,
            chrome: self.chrome.unwrap_or_else(|| DEFAULT_CHROME.to_string()),
            debugger_host: self
                .debugger_host
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            url: self.url.unwrap_or_else(|| DVSA_LOGIN_URL.to_string()),
            blocked_urls: self.blocked_urls.unwrap_or_else(default_blocked_urls),
            headless: self.headless,
            tunnel: self.tunnel,
        })
    }
}

/// Find a Chrome/Chromium executable in the platform-standard locations.
///
/// Chromium candidates come first on Linux: Google Chrome refuses
/// `--load-extension` for unpacked extensions, Chromium does not.
pub fn find_chrome() -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(PathBuf::from(format!(
                r"{}\Google\Chrome\Application\chrome.exe",
                local
            )));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    } else {
        vec![
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// Extract the numeric suffix of a `Browser-{n}` name.
#[cfg(test)]
pub(crate) fn name_suffix(name: &str) -> u32 {
    name.rsplit('-')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}
