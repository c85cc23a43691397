use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs4::FileExt;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::config::LockConfig;
use crate::error::ProvisionError;
use crate::fs::sibling_with_suffix;

pub const LOCK_SUFFIX: &str = ".lock";

const MIN_POLL: Duration = Duration::from_millis(1);

/// Exclusive advisory lock guarding one destination directory.
///
/// The lock lives on `<dest>.lock` next to the destination so that wiping the
/// destination never touches it. It is released when the region is dropped,
/// and by the kernel if the holding process dies.
#[derive(Debug)]
pub struct LockedRegion {
    file: File,
    path: PathBuf,
    waited: Duration,
}

#[derive(Serialize)]
struct HolderNote<'a> {
    pid: u32,
    host: Option<&'a str>,
    acquired_at: Option<String>,
}

impl LockedRegion {
    /// Blocks for at most `config.timeout` waiting for the lock on `dest`.
    pub fn acquire(dest: &Path, config: &LockConfig) -> Result<Self, ProvisionError> {
        let path = lock_path(dest)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| ProvisionError::io("failed to create directory", parent, err))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| ProvisionError::io("failed to open lock", &path, err))?;

        let poll = config.poll_interval.max(MIN_POLL);
        let started = Instant::now();
        let mut announced = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(err) if is_contended(&err) => {
                    let waited = started.elapsed();
                    if waited >= config.timeout {
                        return Err(ProvisionError::LockTimeout { lock: path, waited });
                    }
                    if !announced {
                        info!(
                            lock = %path.display(),
                            "waiting for another job to finish provisioning"
                        );
                        announced = true;
                    }
                    thread::sleep(poll.min(config.timeout - waited));
                }
                Err(err) => return Err(ProvisionError::io("failed to lock", &path, err)),
            }
        }

        let waited = started.elapsed();
        debug!(lock = %path.display(), waited_ms = waited.as_millis(), "acquired lock");
        let region = Self { file, path, waited };
        region.record_holder();
        Ok(region)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How long acquisition blocked.
    #[must_use]
    pub fn waited(&self) -> Duration {
        self.waited
    }

    // Informational only; a failed write never affects the lock itself.
    fn record_holder(&self) {
        let host = std::env::var("SLURMD_NODENAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .ok();
        let note = HolderNote {
            pid: std::process::id(),
            host: host.as_deref(),
            acquired_at: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
        };
        let Ok(payload) = serde_json::to_string(&note) else {
            return;
        };
        let mut file = &self.file;
        let _ = self.file.set_len(0);
        let _ = file.write_all(format!("{payload}\n").as_bytes());
    }
}

impl Drop for LockedRegion {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(lock = %self.path.display(), "released lock");
    }
}

/// `<dest>.lock`, alongside the destination directory.
pub fn lock_path(dest: &Path) -> Result<PathBuf, ProvisionError> {
    sibling_with_suffix(dest, LOCK_SUFFIX).ok_or_else(|| {
        ProvisionError::InvalidManifest(format!(
            "destination {} has no directory name to derive a lock from",
            dest.display()
        ))
    })
}

fn is_contended(err: &std::io::Error) -> bool {
    if err.kind() == ErrorKind::WouldBlock {
        return true;
    }
    #[cfg(windows)]
    if matches!(err.raw_os_error(), Some(32 | 33)) {
        return true;
    }
    false
}
