//! Exclusive lock file guarding the database directory.
//!
//! The lock is a file created with `create_new`. A lock older than
//! `stale_after` is assumed to belong to a crashed build and is taken over.

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant, SystemTime},
};

use tracing::{debug, warn};

use crate::core::error::{Result, SpgmError};

pub const LOCK_FILE: &str = "database.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub timeout: Duration,
    pub stale_after: Duration,
    pub poll_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            stale_after: Duration::from_secs(300),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl LockOptions {
    pub fn from_secs(timeout_secs: u64, stale_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            stale_after: Duration::from_secs(stale_secs),
            ..Self::default()
        }
    }
}

/// Held lock; the file is removed on drop.
#[derive(Debug)]
pub struct DatabaseLock {
    path: PathBuf,
}

impl DatabaseLock {
    pub fn acquire(dir: &Path, options: &LockOptions) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|err| SpgmError::io(dir, err))?;
        let path = dir.join(LOCK_FILE);
        let started = Instant::now();

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    // the content is informational only
                    let _ = writeln!(file, "{}", std::process::id());
                    debug!("acquired {}", path.display());
                    return Ok(Self { path });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(&path, options.stale_after) {
                        remove_stale(&path, options.stale_after)?;
                        continue;
                    }
                    if started.elapsed() >= options.timeout {
                        return Err(SpgmError::LockTimeout {
                            path,
                            waited_secs: options.timeout.as_secs(),
                        });
                    }
                    thread::sleep(options.poll_interval);
                }
                Err(err) => return Err(SpgmError::io(&path, err)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DatabaseLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!("cannot remove database lock {}: {}", self.path.display(), err);
        }
    }
}

/// Remove a lock found stale.
///
/// The lock is first renamed aside, so only one waiter ever removes a given
/// lock file. If a fresh lock was created between the staleness check and the
/// rename, it is linked back into place.
fn remove_stale(path: &Path, stale_after: Duration) -> Result<()> {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    let aside = path.with_file_name(format!("{LOCK_FILE}.{}.{nanos}", std::process::id()));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(SpgmError::io(path, err)),
    }

    if is_stale(&aside, stale_after) {
        warn!("removing stale database lock {}", path.display());
    } else if let Err(err) = fs::hard_link(&aside, path) {
        warn!("cannot restore database lock {}: {}", path.display(), err);
    }
    fs::remove_file(&aside).map_err(|err| SpgmError::io(&aside, err))
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|metadata| metadata.modified()) else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .is_ok_and(|age| age > stale_after)
}
