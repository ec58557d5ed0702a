//! Decides whether a freshly changed file has been fully written.
//!
//! A writer that still holds the file prevents an exclusive open, so the
//! probe keeps trying for a bounded number of attempts before giving up.

use async_trait::async_trait;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ATTEMPTS: u32 = 10;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

#[async_trait]
pub trait Readiness: Send + Sync {
    async fn is_ready(&self, path: &Path) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessProbe {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl ReadinessProbe {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

#[async_trait]
impl Readiness for ReadinessProbe {
    async fn is_ready(&self, path: &Path) -> bool {
        for attempt in 1..=self.attempts {
            let owned: PathBuf = path.to_path_buf();
            let opened = tokio::task::spawn_blocking(move || try_exclusive_open(&owned))
                .await
                .map(|res| res.is_ok())
                .unwrap_or(false);

            if opened {
                return true;
            }

            if attempt < self.attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        false
    }
}

/// Opens `path` for reading with an exclusive, non-blocking lock and
/// releases it again before returning.
///
/// `flock` is advisory: only writers that take an `flock` themselves hold the
/// probe off. Dump tools that write without one (`pg_dump`, `mysqldump`, most
/// SMB and NFS clients) are reported ready mid-write, and the quiet period is
/// then the only guard against copying a partial file.
#[cfg(unix)]
pub fn try_exclusive_open(path: &Path) -> io::Result<()> {
    use nix::fcntl::{Flock, FlockArg};

    let file = File::open(path)?;
    if !file.metadata()?.is_file() {
        return Err(io::Error::new(io::ErrorKind::Other, "not a regular file"));
    }

    let lock = Flock::lock(file, FlockArg::LockExclusiveNonblock)
        .map_err(|(_, errno)| io::Error::from(errno))?;
    drop(lock);
    Ok(())
}

#[cfg(windows)]
pub fn try_exclusive_open(path: &Path) -> io::Result<()> {
    use std::os::windows::fs::OpenOptionsExt;

    let file = std::fs::OpenOptions::new()
        .read(true)
        .share_mode(0)
        .open(path)?;
    if !file.metadata()?.is_file() {
        return Err(io::Error::new(io::ErrorKind::Other, "not a regular file"));
    }
    Ok(())
}
