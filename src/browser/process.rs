//! Managed-process termination
//!
//! Graceful-then-forceful shutdown shared by the browser and proxy children.

use std::time::Duration;

use tokio::process::Child;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::BrowserError;

/// How long each termination stage may take before escalating.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Terminate a managed child process.
///
/// Sends a graceful terminate signal and waits up to two seconds; if the
/// process is still running, sends a forceful kill and waits two more.
/// A process that survives both is reported as [`BrowserError::ProcessWouldNotDie`].
/// A handle that was never started (`None`) is a no-op.
pub(crate) async fn terminate(label: &str, child: &mut Option<Child>) -> Result<(), BrowserError> {
    let Some(mut proc) = child.take() else {
        return Ok(());
    };

    info!("Killing {label}");

    if let Ok(Some(status)) = proc.try_wait() {
        debug!("{label} already exited with {status}");
        return Ok(());
    }

    if let Err(e) = send_terminate(&proc) {
        warn!("Could not signal {label}: {e}");
    }

    match timeout(KILL_WAIT, proc.wait()).await {
        Ok(result) => {
            result?;
            Ok(())
        }
        Err(_) => {
            warn!("{label} failed to die: killing with SIGKILL");
            proc.start_kill()?;
            match timeout(KILL_WAIT, proc.wait()).await {
                Ok(result) => {
                    result?;
                    Ok(())
                }
                Err(_) => Err(BrowserError::ProcessWouldNotDie(label.to_string())),
            }
        }
    }
}

/// Ask the process to exit on its own terms.
#[cfg(unix)]
fn send_terminate(proc: &Child) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = proc.id() else {
        return Ok(());
    };
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
}

/// Windows has no SIGTERM equivalent for arbitrary children; the forceful
/// stage of [`terminate`] does the real work there.
#[cfg(not(unix))]
fn send_terminate(_proc: &Child) -> std::io::Result<()> {
    Ok(())
}
