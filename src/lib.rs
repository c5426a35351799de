//! DVSA Booker
//!
//! Browser automation for the DVSA practical-test booking site. Launches a
//! Chrome/Chromium instance with a throwaway profile, attaches to it over the
//! DevTools protocol, and hands the caller a live page. Traffic can be routed
//! through a local TOR proxy, and all waiting goes through a randomized
//! pacing helper so the automation has no fixed cadence.

pub mod browser;
pub mod pacing;
pub mod tunnel;

pub use browser::{BrowserError, Session, SessionConfig};
pub use tunnel::TorTunnel;
