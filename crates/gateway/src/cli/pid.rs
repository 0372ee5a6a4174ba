//! PID file management for daemon-style operation.
//!
//! On startup the server writes its PID to the configured path and acquires an
//! `fs2` exclusive lock on the file.  If another instance already holds the
//! lock, startup fails immediately.  The lock (and file) are released on
//! shutdown via [`remove_pid_file`].

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use fs2::FileExt;

/// Write the current process PID to `path` and acquire an exclusive lock.
///
/// Returns the open [`File`] handle — the caller **must** keep it alive for
/// the lifetime of the server so the advisory lock is held.
///
/// # Errors
///
/// * Another process already holds the lock (stale or running).
/// * Filesystem I/O failure.
pub fn write_pid_file(path: &Path) -> anyhow::Result<File> {
    // Ensure parent directory exists.
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
            "another SerialAgent instance is running (PID file {} is locked)",
            path.display()
        )
    })?;

    let pid = std::process::id();
    // Re-open for write after lock (file was opened read+write, just write content).
    {
        let mut f = &file;
        writeln!(f, "{pid}")?;
        f.flush()?;
    }

    tracing::info!(path = %path.display(), pid, "PID file written");
    Ok(file)
}

/// Remove the PID file at `path`.  The exclusive lock is released when the
/// `_handle` is dropped (happens automatically, but calling this makes the
/// cleanup explicit and removes the stale file from disk).
pub fn remove_pid_file(path: &Path, _handle: File) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cross-process lifecycle (stop/status/restart): spec §6 "PID file
// recorded under config dir; stale PID is detected (signal 0 probe) and
// cleaned." Grounded on the original's `os.kill(pid, 0)` liveness probe
// and SIGTERM-based stop (see `plug/cli.py`'s `_daemonize_subprocess`).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read the PID recorded at `path`, if any.
pub fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Signal-0 liveness probe: sends no signal, just checks whether `pid`
/// could be signaled (i.e. the process exists and we have permission).
pub fn is_alive(pid: u32) -> bool {
    // SAFETY: kill with signal 0 performs no action beyond existence/
    // permission checks; pid is a plain integer with no aliasing concerns.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Read `path`'s PID and report whether that process is still alive. If
/// the PID file exists but the process is gone, the stale file is removed.
pub fn probe(path: &Path) -> Option<u32> {
    let pid = read_pid(path)?;
    if is_alive(pid) {
        Some(pid)
    } else {
        tracing::info!(path = %path.display(), pid, "removing stale PID file");
        let _ = fs::remove_file(path);
        None
    }
}

/// Send `SIGTERM` to `pid`, requesting graceful shutdown.
pub fn terminate(pid: u32) -> anyhow::Result<()> {
    // SAFETY: pid is a plain integer; SIGTERM is a standard termination
    // request with no memory-safety implications for the caller.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        anyhow::bail!("kill({pid}, SIGTERM) failed: {}", std::io::Error::last_os_error());
    }
    Ok(())
}

/// Spawn a detached copy of the current executable with `args`, redirecting
/// its stdout/stderr to `log_path`. Used by `start --detach`: a plain
/// subprocess rather than a double-fork, matching the original's
/// `_daemonize_subprocess()` approach rather than a POSIX fork/setsid dance.
pub fn spawn_detached(args: &[String], log_path: &Path) -> anyhow::Result<u32> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| anyhow::anyhow!("opening log file {}: {e}", log_path.display()))?;
    let log_file_err = log_file.try_clone()?;

    let exe = std::env::current_exe()?;
    let child = std::process::Command::new(exe)
        .args(args)
        .stdin(std::process::Stdio::null())
        .stdout(log_file)
        .stderr(log_file_err)
        .spawn()
        .map_err(|e| anyhow::anyhow!("spawning detached process: {e}"))?;

    Ok(child.id())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_remove_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("test.pid");

        let handle = write_pid_file(&pid_path).unwrap();

        // File exists and contains our PID.
        let content = fs::read_to_string(&pid_path).unwrap();
        let stored_pid: u32 = content.trim().parse().unwrap();
        assert_eq!(stored_pid, std::process::id());

        // A second lock attempt should fail.
        let second = write_pid_file(&pid_path);
        assert!(second.is_err(), "expected lock conflict");

        // Cleanup.
        remove_pid_file(&pid_path, handle);
        assert!(!pid_path.exists());
    }

    #[test]
    fn creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("nested").join("dirs").join("sa.pid");

        let handle = write_pid_file(&pid_path).unwrap();
        assert!(pid_path.exists());

        remove_pid_file(&pid_path, handle);
    }

    #[test]
    fn is_alive_true_for_own_process() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn is_alive_false_for_unused_pid() {
        // Not a guaranteed-unused PID on every system, but i32::MAX is
        // never a real process id in practice.
        assert!(!is_alive(u32::MAX - 1));
    }

    #[test]
    fn probe_removes_stale_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("stale.pid");
        fs::write(&pid_path, format!("{}\n", u32::MAX - 1)).unwrap();

        assert!(probe(&pid_path).is_none());
        assert!(!pid_path.exists());
    }

    #[test]
    fn probe_keeps_live_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("live.pid");
        fs::write(&pid_path, format!("{}\n", std::process::id())).unwrap();

        assert_eq!(probe(&pid_path), Some(std::process::id()));
        assert!(pid_path.exists());
    }
}
