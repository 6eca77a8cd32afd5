//! Privilege elevation
//!
//! uinput injection usually needs root. When requested, the process re-runs
//! itself through `sudo` and the original image is replaced.

use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;
use tracing::info;

use crate::AutoAxeError;

/// Set on the re-launched process so it never re-launches again
pub const ELEVATED_MARKER: &str = "AUTOAXE_ELEVATED";

/// Whether the effective user is root
pub fn is_elevated() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Return immediately when running as root, otherwise replace this process
/// with an elevated copy. Only returns on success without re-launching, or
/// on failure.
pub fn ensure_elevated() -> Result<(), AutoAxeError> {
    if is_elevated() {
        return Ok(());
    }
    if std::env::var_os(ELEVATED_MARKER).is_some() {
        return Err(AutoAxeError::Elevation(
            "still not root after re-launch".to_string(),
        ));
    }

    let exe = std::env::current_exe().map_err(|e| AutoAxeError::Elevation(e.to_string()))?;
    info!("Re-launching {} with elevated rights", exe.display());
    let err = relaunch_command(&exe, std::env::args_os().skip(1)).exec();
    Err(AutoAxeError::Elevation(format!("sudo failed: {}", err)))
}

/// `sudo -E <exe> <args...>` with the loop guard set
pub fn relaunch_command(exe: &Path, args: impl IntoIterator<Item = OsString>) -> Command {
    let mut cmd = Command::new("sudo");
    cmd.arg("-E").arg(exe).args(args).env(ELEVATED_MARKER, "1");
    cmd
}
