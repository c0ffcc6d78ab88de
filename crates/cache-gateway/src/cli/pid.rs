//! PID-file based process lifecycle tracking.
//!
//! On startup a listener writes its PID to a file under the run directory
//! and acquires an `fs2` exclusive lock on it; a second instance trying to
//! start against the same PID file fails immediately. `stop`/`cache stop`
//! read the file and deliver `SIGTERM` via the `nix` crate.
//!
//! `cache start` runs its substituter listener in the foreground of its
//! own invocation rather than forking (§9: "MAY run cache endpoints as
//! concurrent listeners within a single supervisor process, keeping the
//! same on-disk PID-file layout"), relying on external process supervision
//! (shell `&`, systemd) for backgrounding. `listen` is the one command
//! that does fork: it spawns a detached `hidden-start-server` child, which
//! is the process that actually calls [`write_pid_file`] and serves.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// Directory holding all PID files for a given cache-dir root.
pub fn run_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join(".run")
}

pub fn management_pid_path(cache_dir: &Path) -> PathBuf {
    run_dir(cache_dir).join("management.pid")
}

pub fn cache_pid_path(cache_dir: &Path, cache_id: &str) -> PathBuf {
    run_dir(cache_dir).join(format!("cache-{cache_id}.pid"))
}

/// Write the current process PID to `path` and acquire an exclusive lock.
///
/// Returns the open [`File`] handle — the caller **must** keep it alive for
/// the lifetime of the listener so the advisory lock is held.
pub fn write_pid_file(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .read(true)
        .open(path)
        .map_err(|e| anyhow::anyhow!("opening PID file {}: {e}", path.display()))?;

    file.try_lock_exclusive().map_err(|_| {
        anyhow::anyhow!(
            "another instance is already running (PID file {} is locked)",
            path.display()
        )
    })?;

    let pid = std::process::id();
    {
        let mut f = &file;
        writeln!(f, "{pid}")?;
        f.flush()?;
    }

    tracing::info!(path = %path.display(), pid, "PID file written");
    Ok(file)
}

pub fn remove_pid_file(path: &Path, _handle: File) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Read a PID from `path` and deliver `SIGTERM`. The stale PID file is
/// always removed, whether or not the process was still alive.
pub fn stop_via_pid_file(path: &Path) -> anyhow::Result<()> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("no running instance found ({}: {e})", path.display()))?;
    let pid: i32 = content
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("PID file {} is corrupt", path.display()))?;

    let result = kill(Pid::from_raw(pid), Signal::SIGTERM);
    let _ = fs::remove_file(path);

    match result {
        Ok(()) => {
            tracing::info!(pid, "sent SIGTERM");
            Ok(())
        }
        Err(nix::errno::Errno::ESRCH) => {
            tracing::warn!(pid, "process was not running; stale PID file removed");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("failed to signal pid {pid}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_remove_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("test.pid");

        let handle = write_pid_file(&pid_path).unwrap();

        let content = fs::read_to_string(&pid_path).unwrap();
        let stored_pid: u32 = content.trim().parse().unwrap();
        assert_eq!(stored_pid, std::process::id());

        let second = write_pid_file(&pid_path);
        assert!(second.is_err(), "expected lock conflict");

        remove_pid_file(&pid_path, handle);
        assert!(!pid_path.exists());
    }

    #[test]
    fn creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("nested").join("dirs").join("cs.pid");

        let handle = write_pid_file(&pid_path).unwrap();
        assert!(pid_path.exists());

        remove_pid_file(&pid_path, handle);
    }

    #[test]
    fn stop_on_missing_pid_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("missing.pid");
        assert!(stop_via_pid_file(&pid_path).is_err());
    }
}
