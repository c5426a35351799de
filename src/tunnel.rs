//! TOR tunneling
//!
//! Runs a local `tor` subprocess and supplies the extra launch arguments
//! that point the browser's traffic at its SOCKS listener. The tunnel is a
//! strategy object owned by the session: started before the browser launches,
//! torn down after the browser has been terminated.

use tokio::process::{Child, Command};
use tracing::info;

use crate::browser::{process, BrowserError};

/// SOCKS port the local tor listener binds to.
pub const DEFAULT_SOCKS_PORT: u16 = 8897;

/// A local TOR proxy the browser is routed through.
///
/// Readiness is not checked before the browser launches; tor is assumed to
/// have its listener up by the time the page-load pacing delay has elapsed.
#[derive(Debug)]
pub struct TorTunnel {
    /// tor executable name or path
    tor: String,
    /// Local SOCKS port
    socks_port: u16,
    /// The running tor process, if started
    proc: Option<Child>,
}

impl TorTunnel {
    pub fn new() -> Self {
        Self {
            tor: "tor".to_string(),
            socks_port: DEFAULT_SOCKS_PORT,
            proc: None,
        }
    }

    /// Use a different SOCKS port than [`DEFAULT_SOCKS_PORT`].
    pub fn with_socks_port(mut self, port: u16) -> Self {
        self.socks_port = port;
        self
    }

    /// Use a different tor executable.
    pub fn with_executable(mut self, tor: impl Into<String>) -> Self {
        self.tor = tor.into();
        self
    }

    pub fn socks_port(&self) -> u16 {
        self.socks_port
    }

    /// Extra browser launch arguments routing traffic through the tunnel.
    ///
    /// DNS resolution is forced through the proxy as well, so no lookups
    /// leak outside TOR.
    pub(crate) fn chrome_args(&self) -> Vec<String> {
        vec![
            format!("--proxy-server=socks5://localhost:{}", self.socks_port),
            "--host-resolver-rules=MAP * ~NOTFOUND , EXCLUDE localhost".to_string(),
        ]
    }

    /// Start the tor subprocess.
    pub(crate) fn spawn(&mut self) -> Result<(), BrowserError> {
        info!("Starting tor on SOCKS port {}", self.socks_port);
        let proc = Command::new(&self.tor)
            .args(["--SocksPort", &self.socks_port.to_string()])
            .spawn()
            .map_err(|e| BrowserError::LaunchFailed(format!("tor: {e}")))?;
        self.proc = Some(proc);
        Ok(())
    }

    /// Terminate the tor subprocess with the shared termination policy.
    /// A tunnel that never started is a no-op.
    pub(crate) async fn terminate(&mut self) -> Result<(), BrowserError> {
        process::terminate("tor", &mut self.proc).await
    }

    /// Best-effort kill for abandoned sessions.
    pub(crate) fn kill_on_drop(&mut self) {
        if let Some(proc) = self.proc.as_mut() {
            let _ = proc.start_kill();
        }
    }
}

impl Default for TorTunnel {
    fn default() -> Self {
        Self::new()
    }
}
