#![forbid(unsafe_code)]

//! Process-level guards shared by the binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;
use std::process::{Command, Stdio};

/// Fails fast when a binary is started as root. Downloads land in
/// user-owned directories, and running as root would leave root-owned
/// files behind for later runs to trip over.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "{process} must not be run as root; use a regular user or a dedicated service account"
        );
    }
    Ok(())
}

/// Runs `<name> --version` to fail loudly when an external dependency such
/// as yt-dlp is missing from PATH.
pub fn ensure_program_available(name: &str) -> Result<()> {
    let status = Command::new(name)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => bail!("{} is installed but returned a failure status", name),
        Err(err) => bail!("{} is not installed or not in PATH: {}", name, err),
    }
}
