//! # Process wrapper: daemonization and pid file.
//!
//! Both run **before** the tokio runtime is built, so forking never happens
//! with runtime threads alive:
//!
//! ```text
//! parse CLI ─► logging ─► settings (fail fast) ─► PidFile::resolve()
//!           ─► daemonize() ─► PidFile::create()
//!           ─► tokio runtime ─► Supervisor::run() ─► PidFile dropped (file removed)
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ProcessError;

/// Detaches from the controlling terminal (`daemon(3)`): fork, `setsid`,
/// `chdir("/")`, stdio to `/dev/null`.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub fn daemonize() -> Result<(), ProcessError> {
    nix::unistd::daemon(false, false).map_err(|errno| ProcessError::Daemonize {
        reason: errno.desc().to_string(),
    })
}

/// Detaches from the controlling terminal. Unsupported on this platform.
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
pub fn daemonize() -> Result<(), ProcessError> {
    Err(ProcessError::Daemonize {
        reason: "not supported on this platform".to_string(),
    })
}

/// Pid file removed when dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Writes the current pid to `path`.
    ///
    /// A file naming a live process is refused; a stale one is replaced.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ProcessError> {
        let path = path.as_ref().to_path_buf();
        let err = |source: io::Error| ProcessError::PidFile {
            path: path.display().to_string(),
            source,
        };

        match fs::read_to_string(&path) {
            Ok(text) => {
                if let Ok(pid) = text.trim().parse::<i32>() {
                    if is_alive(pid) {
                        return Err(ProcessError::AlreadyRunning {
                            pid,
                            path: path.display().to_string(),
                        });
                    }
                }
                warn!(path = %path.display(), "replacing stale pid file");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(err(e)),
        }

        fs::write(&path, format!("{}\n", std::process::id())).map_err(err)?;
        debug!(path = %path.display(), pid = std::process::id(), "pid file written");
        Ok(Self { path })
    }

    /// Anchors a relative pid file path at the current directory.
    ///
    /// Must run before [`daemonize`], which changes the directory to `/`.
    pub fn resolve(path: impl AsRef<Path>) -> Result<PathBuf, ProcessError> {
        let path = path.as_ref();
        std::path::absolute(path).map_err(|source| ProcessError::PidFile {
            path: path.display().to_string(),
            source,
        })
    }

    /// Location of the pid file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
        }
    }
}

#[cfg(unix)]
fn is_alive(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_alive(_pid: i32) -> bool {
    false
}
