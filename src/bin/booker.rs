//! DVSA Booker - session runner
//!
//! Opens one browser session against the booking site and keeps it alive
//! until interrupted.
//!
//! Environment variables:
//! - `BOOKER_PORT` - remote-debugging port (default: 8745)
//! - `BOOKER_URL` - target URL (default: the DVSA login page)
//! - `BOOKER_CHROME` - browser executable (default: auto-detected, then
//!   `google-chrome-stable`)
//! - `BOOKER_EXTENSION_DIR` - unpacked extension directory to load
//! - `BOOKER_TOR` - set to `1` to route traffic through a local TOR proxy
//! - `BOOKER_HEADLESS` - set to `1` to run without a window

use anyhow::Context;
use tracing::info;

use dvsa_booker::browser::{find_chrome, DEFAULT_PORT};
use dvsa_booker::{Session, SessionConfig, TorTunnel};

fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1" || v == "true").unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let port: u16 = std::env::var("BOOKER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let mut builder = SessionConfig::builder()
        .port(port)
        .headless(env_flag("BOOKER_HEADLESS"));

    if let Ok(url) = std::env::var("BOOKER_URL") {
        builder = builder.url(url);
    }

    if let Ok(chrome) = std::env::var("BOOKER_CHROME") {
        builder = builder.chrome(chrome);
    } else if let Some(chrome) = find_chrome() {
        info!("Auto-detected chrome at {}", chrome.display());
        builder = builder.chrome(chrome.display().to_string());
    }

    if let Ok(dir) = std::env::var("BOOKER_EXTENSION_DIR") {
        builder = builder.extension_dir(dir);
    }

    if env_flag("BOOKER_TOR") {
        builder = builder.tunnel(TorTunnel::new());
    }

    let config = builder.build().context("invalid configuration")?;
    info!("Opening session {} on port {}", config.name(), config.port());

    let session = Session::open(config).await?;
    info!("{} is live; press ctrl-c to close", session.name());

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for ctrl-c")?;

    session.close().await?;
    Ok(())
}
