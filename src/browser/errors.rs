//! Browser error types

use thiserror::Error;

/// Browser-related errors
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to attach to debugger: {0}")]
    Connection(String),

    #[error("Devtools command failed: {0}")]
    Cdp(String),

    #[error("Process {0} failed to die")]
    ProcessWouldNotDie(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
