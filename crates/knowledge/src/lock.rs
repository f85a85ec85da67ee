//! Filesystem rebuild lock.
//!
//! `index.lock` sits next to the index directory and holds a JSON
//! [`LockRecord`]. Creation uses `create_new`, so of two racing acquirers
//! exactly one wins. A lock whose file is older than twice its timeout is
//! presumed abandoned and may be reclaimed. The timeout is the longer of the
//! holder's recorded one and our own. Staleness is judged from the file's
//! mtime and is only as good as the clocks involved.

use chrono::{DateTime, Utc};
use docent_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

pub const LOCK_FILE: &str = "index.lock";

/// Contents of the lock artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub holder: String,
    pub pid: u32,
    pub host: String,
    pub acquired_at: DateTime<Utc>,
    pub timeout_secs: u64,
    /// Unique per acquisition; release only removes a lock carrying it
    pub token: String,
}

impl LockRecord {
    fn for_current_process(timeout: Duration) -> Self {
        let pid = std::process::id();
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string());
        Self {
            holder: format!("pid {} on {}", pid, host),
            pid,
            host,
            acquired_at: Utc::now(),
            timeout_secs: timeout.as_secs(),
            token: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Observed state of the lock, for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockState {
    Free,
    Held { holder: String, age_secs: u64 },
    Stale { holder: String, age_secs: u64 },
}

/// The rebuild lock of one knowledge base.
#[derive(Debug, Clone)]
pub struct IndexLock {
    path: PathBuf,
    timeout: Duration,
}

struct ExistingLock {
    raw: Vec<u8>,
    holder: String,
    age: Duration,
    /// Timeout the holder was configured with, when the record parses
    holder_timeout: Option<Duration>,
}

impl IndexLock {
    pub fn new(base_dir: &Path, timeout: Duration) -> Self {
        Self {
            path: base_dir.join(LOCK_FILE),
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn stale_after(&self, existing: &ExistingLock) -> Duration {
        existing.holder_timeout.map_or(self.timeout, |t| t.max(self.timeout)) * 2
    }

    /// Take the lock or fail fast with `RebuildInProgress`.
    pub fn acquire(&self) -> AppResult<LockHandle> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Second pass only runs after a stale lock was reclaimed
        for _ in 0..2 {
            let record = LockRecord::for_current_process(self.timeout);
            match self.try_create(&record) {
                Ok(()) => {
                    debug!(holder = %record.holder, "Acquired rebuild lock {:?}", self.path);
                    return Ok(LockHandle {
                        path: self.path.clone(),
                        token: record.token,
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }

            let Some(existing) = self.read_existing()? else {
                // Released between our attempt and the read
                continue;
            };

            if existing.age < self.stale_after(&existing) {
                return Err(busy(&existing));
            }

            if !self.reclaim(&existing)? {
                return Err(busy(&existing));
            }
        }

        Err(AppError::RebuildInProgress {
            holder: "another process".to_string(),
            age_secs: 0,
        })
    }

    /// Report the lock state without touching it.
    pub fn inspect(&self) -> AppResult<LockState> {
        Ok(match self.read_existing()? {
            None => LockState::Free,
            Some(existing) if existing.age >= self.stale_after(&existing) => LockState::Stale {
                holder: existing.holder,
                age_secs: existing.age.as_secs(),
            },
            Some(existing) => LockState::Held {
                holder: existing.holder,
                age_secs: existing.age.as_secs(),
            },
        })
    }

    fn try_create(&self, record: &LockRecord) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;

        let json = serde_json::to_vec_pretty(record).map_err(std::io::Error::other)?;
        file.write_all(&json)?;
        file.sync_all()
    }

    fn read_existing(&self) -> AppResult<Option<ExistingLock>> {
        let modified = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // An empty or torn record still counts as held; the mtime decides staleness
        let (holder, holder_timeout) = match serde_json::from_slice::<LockRecord>(&raw) {
            Ok(record) => (record.holder, Some(Duration::from_secs(record.timeout_secs))),
            Err(_) => ("unknown holder".to_string(), None),
        };

        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);

        Ok(Some(ExistingLock {
            raw,
            holder,
            age,
            holder_timeout,
        }))
    }

    /// Move a stale lock aside. Returns false when the lock changed hands
    /// after it was judged stale, in which case it is put back.
    fn reclaim(&self, stale: &ExistingLock) -> AppResult<bool> {
        let aside = sibling(&self.path, "reclaim");

        match fs::rename(&self.path, &aside) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        }

        let moved = fs::read(&aside)?;
        if moved != stale.raw {
            // A fresh lock replaced the stale one; hand it back
            if let Err(e) = fs::hard_link(&aside, &self.path) {
                warn!("Could not restore lock {:?}: {}", self.path, e);
            }
            fs::remove_file(&aside)?;
            return Ok(false);
        }

        fs::remove_file(&aside)?;
        warn!(
            holder = %stale.holder,
            age_secs = stale.age.as_secs(),
            "Reclaimed stale rebuild lock {:?}",
            self.path
        );
        Ok(true)
    }
}

fn busy(existing: &ExistingLock) -> AppError {
    AppError::RebuildInProgress {
        holder: existing.holder.clone(),
        age_secs: existing.age.as_secs(),
    }
}

fn sibling(path: &Path, purpose: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}-{}", purpose, uuid::Uuid::new_v4().simple()));
    PathBuf::from(name)
}

/// Ownership of the rebuild lock. Dropping the handle releases it.
#[derive(Debug)]
pub struct LockHandle {
    path: PathBuf,
    token: String,
    released: bool,
}

impl LockHandle {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Release the lock. Safe to call more than once; a lock that was
    /// reclaimed by someone else is left in place.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let aside = sibling(&self.path, "release");
        match fs::rename(&self.path, &aside) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Rebuild lock {:?} was already gone at release", self.path);
                return;
            }
            Err(e) => {
                warn!("Failed to release rebuild lock {:?}: {}", self.path, e);
                return;
            }
        }

        let ours = fs::read(&aside)
            .ok()
            .and_then(|raw| serde_json::from_slice::<LockRecord>(&raw).ok())
            .is_some_and(|record| record.token == self.token);

        if !ours {
            warn!(
                "Rebuild lock {:?} was reclaimed by another holder; leaving it",
                self.path
            );
            if let Err(e) = fs::hard_link(&aside, &self.path) {
                warn!("Could not restore lock {:?}: {}", self.path, e);
            }
        }

        if let Err(e) = fs::remove_file(&aside) {
            warn!("Failed to remove {:?}: {}", aside, e);
        }

        if ours {
            debug!("Released rebuild lock {:?}", self.path);
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.release();
    }
}
