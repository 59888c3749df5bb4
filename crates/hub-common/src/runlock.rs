//! Job run-locks
//!
//! A sweep must not start while a previous run of the same job is still in
//! flight. Locks carry a TTL slightly longer than the expected run time so a
//! crashed holder does not block the job forever.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::LockError;

/// Held lock; released on drop
pub struct RunGuard {
    job: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl RunGuard {
    fn new(job: &str, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            job: job.to_string(),
            release: Some(Box::new(release)),
        }
    }

    /// Locked job name
    pub fn job(&self) -> &str {
        &self.job
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            tracing::debug!(job = %self.job, "run lock released");
        }
    }
}

impl std::fmt::Debug for RunGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunGuard").field("job", &self.job).finish_non_exhaustive()
    }
}

/// Mutual exclusion per job name
pub trait RunLock: Send + Sync {
    /// Take the lock, or `None` while another live holder has it
    fn try_acquire(&self, job: &str, ttl: Duration) -> Result<Option<RunGuard>, LockError>;
}

/// Process-local run-lock
#[derive(Debug, Default, Clone)]
pub struct InMemoryRunLock {
    held: Arc<DashMap<String, Instant>>,
}

impl InMemoryRunLock {
    /// Create empty lock table
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunLock for InMemoryRunLock {
    fn try_acquire(&self, job: &str, ttl: Duration) -> Result<Option<RunGuard>, LockError> {
        let now = Instant::now();
        let expires_at = now + ttl;

        match self.held.entry(job.to_string()) {
            Entry::Occupied(mut held) => {
                if *held.get() > now {
                    return Ok(None);
                }
                tracing::warn!(job, "taking over expired run lock");
                held.insert(expires_at);
            }
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
            }
        }

        let held = self.held.clone();
        let key = job.to_string();
        Ok(Some(RunGuard::new(job, move || {
            held.remove_if(&key, |_, exp| *exp == expires_at);
        })))
    }
}

/// Cross-process run-lock backed by one file per job
///
/// File content is `<expiry unix millis> <holder token>`. The file is written
/// under a temporary name and hard-linked into place, so it never exists
/// without its expiry and two processes cannot both create it.
#[derive(Debug, Clone)]
pub struct FileRunLock {
    dir: PathBuf,
}

impl FileRunLock {
    /// Locks live under `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, job: &str) -> PathBuf {
        self.dir.join(format!("{job}.lock"))
    }

    /// Publish `content` at `path`; fails with `AlreadyExists` if taken
    fn create(path: &Path, content: &str) -> std::io::Result<()> {
        let tmp = path.with_extension(format!("lock.{}.tmp", Uuid::new_v4().simple()));
        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(content.as_bytes())?;
            file.sync_all()
        });
        let linked = written.and_then(|()| fs::hard_link(&tmp, path));
        if let Err(e) = fs::remove_file(&tmp) {
            tracing::debug!("failed to remove {}: {}", tmp.display(), e);
        }
        linked
    }

    /// Whether the current lock file still excludes others
    ///
    /// Unparseable content counts as held until the file is older than `ttl`.
    fn is_live(path: &Path, content: &str, now: i64, ttl: Duration) -> std::io::Result<bool> {
        match parse_expiry(content) {
            Some(held_until) => Ok(held_until > now),
            None => {
                let modified = match fs::metadata(path) {
                    Ok(meta) => meta.modified()?,
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
                    Err(e) => return Err(e),
                };
                Ok(modified.elapsed().unwrap_or(Duration::ZERO) < ttl)
            }
        }
    }

    /// Move a stale lock aside; false if what was moved turned out to be live
    fn set_aside(path: &Path, stale: &str) -> std::io::Result<bool> {
        let aside = path.with_extension(format!("lock.{}.stale", Uuid::new_v4().simple()));
        match fs::rename(path, &aside) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e),
        }
        let moved = fs::read_to_string(&aside)?;
        if moved != stale {
            // Another process replaced the stale lock first; put theirs back
            if let Err(e) = fs::hard_link(&aside, path) {
                tracing::error!("failed to restore run lock {}: {}", path.display(), e);
            }
            fs::remove_file(&aside)?;
            return Ok(false);
        }
        fs::remove_file(&aside)?;
        Ok(true)
    }
}

fn parse_expiry(content: &str) -> Option<i64> {
    content.split_whitespace().next()?.parse().ok()
}

impl RunLock for FileRunLock {
    fn try_acquire(&self, job: &str, ttl: Duration) -> Result<Option<RunGuard>, LockError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(job);
        let now = Utc::now().timestamp_millis();
        let expires_at = now + ttl.as_millis() as i64;
        let token = format!("{expires_at} {}", Uuid::new_v4().simple());

        match Self::create(&path, &token) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let held = match fs::read_to_string(&path) {
                    Ok(content) => Some(content),
                    // Released between our create and read
                    Err(e) if e.kind() == ErrorKind::NotFound => None,
                    Err(e) => return Err(e.into()),
                };
                if let Some(held) = held {
                    if Self::is_live(&path, &held, now, ttl)? {
                        return Ok(None);
                    }
                    tracing::warn!(job, held = %held.trim(), "taking over expired run lock file");
                    if !Self::set_aside(&path, &held)? {
                        return Ok(None);
                    }
                }
                match Self::create(&path, &token) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Some(RunGuard::new(job, move || {
            let ours = fs::read_to_string(&path)
                .map(|content| content == token)
                .unwrap_or(false);
            if ours {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::error!("failed to remove run lock file {}: {}", path.display(), e);
                }
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_exclusion() {
        let lock = InMemoryRunLock::new();
        let guard = lock.try_acquire("sweep", Duration::from_secs(60)).unwrap();
        assert!(guard.is_some());
        assert!(lock.try_acquire("sweep", Duration::from_secs(60)).unwrap().is_none());
        // other job names are independent
        assert!(lock.try_acquire("sync", Duration::from_secs(60)).unwrap().is_some());

        drop(guard);
        assert!(lock.try_acquire("sweep", Duration::from_secs(60)).unwrap().is_some());
    }

    #[test]
    fn test_in_memory_expired_takeover() {
        let lock = InMemoryRunLock::new();
        let stale = lock.try_acquire("sweep", Duration::ZERO).unwrap();
        assert!(stale.is_some());
        let fresh = lock.try_acquire("sweep", Duration::from_secs(60)).unwrap();
        assert!(fresh.is_some());

        // dropping the stale guard must not release the new holder
        drop(stale);
        assert!(lock.try_acquire("sweep", Duration::from_secs(60)).unwrap().is_none());
    }

    #[test]
    fn test_file_lock_exclusion_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileRunLock::new(dir.path().join("locks"));

        let guard = lock.try_acquire("sync-members-to-router", Duration::from_secs(60)).unwrap();
        assert!(guard.is_some());
        assert!(dir.path().join("locks/sync-members-to-router.lock").exists());

        let other = FileRunLock::new(dir.path().join("locks"));
        assert!(other.try_acquire("sync-members-to-router", Duration::from_secs(60)).unwrap().is_none());

        drop(guard);
        assert!(!dir.path().join("locks/sync-members-to-router.lock").exists());
        assert!(other.try_acquire("sync-members-to-router", Duration::from_secs(60)).unwrap().is_some());
    }

    #[test]
    fn test_file_lock_takes_over_expired() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("job.lock"), "0").unwrap();

        let lock = FileRunLock::new(dir.path());
        assert!(lock.try_acquire("job", Duration::from_secs(60)).unwrap().is_some());
        let content = std::fs::read_to_string(dir.path().join("job.lock")).unwrap();
        assert!(parse_expiry(&content).unwrap() > Utc::now().timestamp_millis());
    }

    #[test]
    fn test_file_lock_empty_fresh_file_is_held() {
        let dir = tempfile::tempdir().unwrap();
        // a peer's lock whose content is not yet readable
        std::fs::write(dir.path().join("sync-members-to-router.lock"), "").unwrap();

        let lock = FileRunLock::new(dir.path());
        assert!(lock
            .try_acquire("sync-members-to-router", Duration::from_secs(60))
            .unwrap()
            .is_none());
        assert!(dir.path().join("sync-members-to-router.lock").exists());
    }

    #[test]
    fn test_file_lock_garbage_older_than_ttl_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("job.lock"), "not-a-timestamp").unwrap();
        std::thread::sleep(Duration::from_millis(30));

        let lock = FileRunLock::new(dir.path());
        assert!(lock.try_acquire("job", Duration::from_millis(10)).unwrap().is_some());
    }

    #[test]
    fn test_file_lock_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("job.lock"), "0").unwrap();

        let lock = FileRunLock::new(dir.path());
        let guard = lock.try_acquire("job", Duration::from_secs(60)).unwrap();
        assert!(guard.is_some());
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["job.lock".to_string()]);

        drop(guard);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
