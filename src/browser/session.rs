//! Browser session management
//!
//! Launches one Chrome/Chromium process per session, attaches to it over the
//! DevTools protocol, and tears both down when the session closes. The
//! session is a scoped guard: [`Session::open`] performs setup,
//! [`Session::close`] performs teardown, and dropping an unclosed session
//! force-kills whatever is still running.

use std::path::PathBuf;

use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, SetBlockedUrLsParams,
};
use chromiumoxide::cdp::browser_protocol::page::ReloadParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde::Deserialize;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{process, BrowserError, SessionConfig};
use crate::pacing;
use crate::tunnel::TorTunnel;

/// Pacing target for the post-launch wait, in seconds. Gives the page time
/// to load and its scripts time to run before the debugger attaches.
const PAGE_LOAD_DELAY_SECS: f64 = 10.0;

/// Response shape of Chrome's `/json/version` endpoint.
#[derive(Deserialize)]
struct JsonVersion {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// A scoped browser session.
///
/// Owns the browser process, its transient profile directory, the devtools
/// connection, and the optional TOR tunnel. The process and the profile
/// directory are created together during [`open`](Session::open) and
/// destroyed together during [`close`](Session::close).
pub struct Session {
    config: SessionConfig,
    tunnel: Option<TorTunnel>,
    chrome: Option<Child>,
    profile: Option<tempfile::TempDir>,
    browser: Option<Browser>,
    page: Option<Page>,
    event_task: Option<JoinHandle<()>>,
}

impl Session {
    /// Launch the browser and attach to it.
    ///
    /// Starts the tunnel (if configured) and the browser process, waits a
    /// randomized ~10s for the page to load, attaches over the devtools
    /// port, installs the network-blocking rules, enables network events,
    /// and reloads the page. Any failure aborts the session; whatever was
    /// already started is torn down before the error is returned.
    pub async fn open(config: SessionConfig) -> Result<Self, BrowserError> {
        let mut session = Session::prepare(config);
        match session.try_open().await {
            Ok(()) => Ok(session),
            Err(e) => {
                warn!("{} failed to open: {e}", session.name());
                if let Err(cleanup) = session.close().await {
                    warn!("Cleanup after failed open also failed: {cleanup}");
                }
                Err(e)
            }
        }
    }

    fn prepare(mut config: SessionConfig) -> Self {
        let tunnel = config.tunnel.take();
        Session {
            config,
            tunnel,
            chrome: None,
            profile: None,
            browser: None,
            page: None,
            event_task: None,
        }
    }

    /// Sequential display name (Browser-1, Browser-2, ...)
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// The live page handle.
    pub fn page(&self) -> Result<&Page, BrowserError> {
        self.page
            .as_ref()
            .ok_or_else(|| BrowserError::Connection("no active page".to_string()))
    }

    /// The devtools browser handle.
    pub fn browser(&self) -> Result<&Browser, BrowserError> {
        self.browser
            .as_ref()
            .ok_or_else(|| BrowserError::Connection("no active browser".to_string()))
    }

    async fn try_open(&mut self) -> Result<(), BrowserError> {
        if let Some(tunnel) = self.tunnel.as_mut() {
            tunnel.spawn()?;
        }

        let args = self.launch_args()?;
        info!("{} starting chrome", self.name());
        let chrome = Command::new(&self.config.chrome)
            .args(&args)
            .spawn()
            .map_err(|e| {
                BrowserError::LaunchFailed(format!("{}: {e}", self.config.chrome))
            })?;
        self.chrome = Some(chrome);

        info!(
            "{} waiting ~{PAGE_LOAD_DELAY_SECS}s for the page to load and js to run",
            self.name()
        );
        pacing::randsleep(PAGE_LOAD_DELAY_SECS, None).await;

        let ws_url =
            fetch_debugger_ws_url(&self.config.debugger_host, self.config.port).await?;
        debug!("{} attaching to {ws_url}", self.name());

        let (browser, mut handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| BrowserError::Connection(e.to_string()))?;

        let name = self.name().to_string();
        self.event_task = Some(tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            debug!("{name} devtools event stream ended");
        }));

        // Chrome opens with the target URL in its first tab; drive that one
        let page = {
            let mut pages = browser
                .pages()
                .await
                .map_err(|e| BrowserError::Connection(e.to_string()))?;
            if pages.is_empty() {
                browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| BrowserError::Connection(e.to_string()))?
            } else {
                pages.remove(0)
            }
        };

        page.execute(SetBlockedUrLsParams::new(self.config.blocked_urls.clone()))
            .await
            .map_err(|e| BrowserError::Cdp(format!("Network.setBlockedURLs: {e}")))?;
        page.execute(EnableParams::default())
            .await
            .map_err(|e| BrowserError::Cdp(format!("Network.enable: {e}")))?;
        page.execute(ReloadParams::default())
            .await
            .map_err(|e| BrowserError::Cdp(format!("Page.reload: {e}")))?;

        info!("{} attached and instrumented", self.name());

        self.browser = Some(browser);
        self.page = Some(page);
        Ok(())
    }

    /// Compose the browser argument list. The profile directory is created
    /// lazily on first use and reused afterwards.
    fn launch_args(&mut self) -> Result<Vec<String>, BrowserError> {
        let mut args = vec![self.config.port_arg(), self.profile_arg()?];
        if let Some(extension) = self.config.extension_arg() {
            args.push(extension);
        }
        args.push("--no-first-run".to_string());
        args.push("--blink-settings=imagesEnabled=false".to_string());
        if self.config.headless {
            args.push("--headless=new".to_string());
        }
        if let Some(tunnel) = self.tunnel.as_ref() {
            args.extend(tunnel.chrome_args());
        }
        args.push(self.config.url.clone());
        Ok(args)
    }

    fn profile_arg(&mut self) -> Result<String, BrowserError> {
        if self.profile.is_none() {
            let dir = tempfile::Builder::new().prefix("dvsa-booker-").tempdir()?;
            debug!("{} created profile dir {}", self.name(), dir.path().display());
            self.profile = Some(dir);
        }
        let dir = self
            .profile
            .as_ref()
            .ok_or_else(|| BrowserError::Config("profile dir unavailable".to_string()))?;
        Ok(format!("--user-data-dir={}", dir.path().display()))
    }

    /// Path of the transient profile directory, if one has been created.
    pub fn profile_path(&self) -> Option<PathBuf> {
        self.profile.as_ref().map(|dir| dir.path().to_path_buf())
    }

    /// Tear the session down.
    ///
    /// Terminates the browser process, then the tunnel process, then deletes
    /// the profile directory. Every step runs regardless of earlier
    /// failures; the first error is returned once all have been attempted.
    /// Closing a session whose browser never started is a no-op.
    pub async fn close(mut self) -> Result<(), BrowserError> {
        let name = self.name().to_string();

        // Drop the devtools machinery first so nothing is talking to the
        // process while it dies.
        self.page.take();
        self.browser.take();
        if let Some(task) = self.event_task.take() {
            task.abort();
        }

        let browser_result = process::terminate(&name, &mut self.chrome).await;
        let tunnel_result = match self.tunnel.as_mut() {
            Some(tunnel) => tunnel.terminate().await,
            None => Ok(()),
        };
        let profile_result = match self.profile.take() {
            Some(dir) => dir.close().map_err(BrowserError::from),
            None => Ok(()),
        };

        info!("{name} closed");
        browser_result.and(tunnel_result).and(profile_result)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.chrome.is_some() {
            warn!("{} dropped without close(); force-killing chrome", self.name());
        }
        if let Some(chrome) = self.chrome.as_mut() {
            let _ = chrome.start_kill();
        }
        if let Some(tunnel) = self.tunnel.as_mut() {
            tunnel.kill_on_drop();
        }
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        // the profile TempDir deletes itself on drop
    }
}

/// Ask the browser's debug endpoint for its websocket URL.
async fn fetch_debugger_ws_url(host: &str, port: u16) -> Result<String, BrowserError> {
    let url = format!("http://{host}:{port}/json/version");
    let resp = reqwest::get(&url)
        .await
        .map_err(|e| BrowserError::Connection(format!("{url}: {e}")))?;

    if !resp.status().is_success() {
        return Err(BrowserError::Connection(format!(
            "{url} returned {}",
            resp.status()
        )));
    }

    let body: JsonVersion = resp
        .json()
        .await
        .map_err(|e| BrowserError::Connection(format!("{url}: {e}")))?;

    Ok(body.web_socket_debugger_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::config::name_suffix;

    fn prepare(config: SessionConfig) -> Session {
        Session::prepare(config)
    }

    #[test]
    fn test_launch_args_composition() {
        let config = SessionConfig::builder()
            .port(9222)
            .url("https://example.com/")
            .build()
            .unwrap();
        let mut session = prepare(config);
        let args = session.launch_args().unwrap();

        assert_eq!(args[0], "--remote-debugging-port=9222");
        assert!(args[1].starts_with("--user-data-dir="));
        assert!(args.contains(&"--no-first-run".to_string()));
        assert!(args.contains(&"--blink-settings=imagesEnabled=false".to_string()));
        assert_eq!(args.last().unwrap(), "https://example.com/");
        // no extension configured, no flag emitted
        assert!(!args.iter().any(|a| a.starts_with("--load-extension=")));
    }

    #[test]
    fn test_profile_dir_is_lazy_and_reused() {
        let config = SessionConfig::builder().build().unwrap();
        let mut session = prepare(config);
        assert!(session.profile_path().is_none());

        let first = session.launch_args().unwrap()[1].clone();
        let path = session.profile_path().unwrap();
        assert!(path.is_dir());

        let second = session.launch_args().unwrap()[1].clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_profile_dir_removed_on_drop() {
        let config = SessionConfig::builder().build().unwrap();
        let mut session = prepare(config);
        session.launch_args().unwrap();
        let path = session.profile_path().unwrap();
        assert!(path.is_dir());
        drop(session);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_close_without_open_is_noop() {
        let config = SessionConfig::builder().build().unwrap();
        let session = prepare(config);
        session.close().await.unwrap();
    }

    #[test]
    fn test_extension_arg_is_included() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::builder()
            .extension_dir(dir.path())
            .build()
            .unwrap();
        let mut session = prepare(config);
        let args = session.launch_args().unwrap();
        assert!(args.iter().any(|a| a.starts_with("--load-extension=")));
    }

    #[test]
    fn test_headless_flag() {
        let config = SessionConfig::builder().headless(true).build().unwrap();
        let mut session = prepare(config);
        let args = session.launch_args().unwrap();
        assert!(args.contains(&"--headless=new".to_string()));
    }

    #[test]
    fn test_tunnel_args_come_before_the_url() {
        let config = SessionConfig::builder()
            .tunnel(TorTunnel::new())
            .url("https://example.com/")
            .build()
            .unwrap();
        let mut session = prepare(config);
        let args = session.launch_args().unwrap();

        let proxy_pos = args
            .iter()
            .position(|a| a.starts_with("--proxy-server="))
            .unwrap();
        let url_pos = args.iter().position(|a| a == "https://example.com/").unwrap();
        assert!(proxy_pos < url_pos);
        assert!(args.iter().any(|a| a.starts_with("--host-resolver-rules=")));
    }

    #[test]
    fn test_session_names_increase_across_sessions() {
        let a = prepare(SessionConfig::builder().build().unwrap());
        let b = prepare(SessionConfig::builder().build().unwrap());
        let c = prepare(SessionConfig::builder().build().unwrap());
        let (na, nb, nc) = (
            name_suffix(a.name()),
            name_suffix(b.name()),
            name_suffix(c.name()),
        );
        assert!(na < nb && nb < nc);
    }

    #[tokio::test]
    async fn test_fetch_ws_url_unreachable_port_is_connection_error() {
        let err = fetch_debugger_ws_url("127.0.0.1", 1).await.unwrap_err();
        assert!(matches!(err, BrowserError::Connection(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_close_terminates_processes_and_removes_profile() {
        // stand-in children: close() only needs processes it can kill
        let config = SessionConfig::builder()
            .tunnel(TorTunnel::new().with_executable("sleep"))
            .build()
            .unwrap();
        let mut session = prepare(config);
        if let Some(tunnel) = session.tunnel.as_mut() {
            tunnel.spawn().unwrap();
        }
        session.chrome = Some(Command::new("sleep").arg("30").spawn().unwrap());
        session.launch_args().unwrap();
        let profile = session.profile_path().unwrap();
        assert!(profile.is_dir());

        session.close().await.unwrap();
        assert!(!profile.exists());
    }
}
