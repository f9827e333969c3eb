use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::project_io::ProjectPaths;

/// How long a write command waits for another `canopy` process to finish
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

const MAX_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error(
        "project is busy: another canopy process{} is writing (lock file {path})",
        .holder.map(|pid| format!(" (pid {pid})")).unwrap_or_default()
    )]
    Busy { path: PathBuf, holder: Option<u32> },
    #[error("flock failed: {0}")]
    Flock(#[source] io::Error),
}

/// Exclusive hold on a project's `.canopy/.lock`.
///
/// Write commands keep one for their whole run so their reads and writes of
/// `tasks.json` and `history.json` never interleave with another process.
/// The lock file itself is left in place: waiters must all contend on the
/// same inode. It holds the pid of the current holder.
pub struct ProjectLock {
    file: File,
}

impl ProjectLock {
    /// Take the lock, retrying with backoff until `wait` has passed.
    pub fn acquire(paths: &ProjectPaths, wait: Duration) -> Result<Self, LockError> {
        let path = paths.lock();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;

        let deadline = Instant::now() + wait;
        let mut backoff = Duration::from_millis(5);
        while !try_flock(&file).map_err(LockError::Flock)? {
            if Instant::now() >= deadline {
                let holder = read_holder(&path);
                tracing::warn!(path = %path.display(), ?holder, "project lock busy");
                return Err(LockError::Busy { path, holder });
            }
            std::thread::sleep(backoff);
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        let mut lock = ProjectLock { file };
        if let Err(e) = lock.record_holder() {
            tracing::debug!(error = %e, "could not record lock holder");
        }
        tracing::debug!(path = %path.display(), "project lock held");
        Ok(lock)
    }

    fn record_holder(&mut self) -> io::Result<()> {
        self.file.set_len(0)?;
        write!(self.file, "{}", std::process::id())?;
        self.file.flush()
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        // The flock itself goes away with the descriptor.
        let _ = self.file.set_len(0);
    }
}

fn read_holder(path: &std::path::Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// `Ok(false)` when another descriptor already holds the lock.
#[cfg(unix)]
fn try_flock(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;
    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.kind() {
        io::ErrorKind::WouldBlock => Ok(false),
        _ => Err(err),
    }
}

#[cfg(not(unix))]
fn try_flock(_file: &File) -> io::Result<bool> {
    Ok(true)
}
