//! A keyed memo from absolute directory path to a recursive file listing.
//!
//! Reads are served from cache while `now - timestamp < ttl`. This mirrors the
//! precedence/caching shape of `swissarmyhammer-common::file_loader`'s virtual
//! file system, specialised to a single TTL'd directory-listing cache instead
//! of a layered builtin/user/local merge.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{PromptsmithError, Result};

const DEFAULT_TTL: Duration = Duration::from_secs(5);

struct CacheEntry {
    files: Vec<PathBuf>,
    at: Instant,
}

/// Memoised recursive directory scanner with TTL-based invalidation.
pub struct FileCache {
    ttl: Duration,
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl FileCache {
    /// Create a cache with an explicit TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// List the recursive set of regular-file paths under `dir`, excluding
    /// entries whose basename begins with `.`. Served from cache unless
    /// `use_cache` is false or the cached entry has expired.
    pub fn list(&self, dir: &Path, use_cache: bool) -> Result<Vec<PathBuf>> {
        let key = dir.to_path_buf();

        if use_cache {
            let entries = self.entries.lock().expect("file cache lock poisoned");
            if let Some(entry) = entries.get(&key) {
                if entry.at.elapsed() < self.ttl {
                    trace!(dir = %dir.display(), "file cache hit");
                    return Ok(entry.files.clone());
                }
            }
        }

        let files = scan_dir(dir)?;
        debug!(dir = %dir.display(), count = files.len(), "file cache miss, rescanned");
        self.entries.lock().expect("file cache lock poisoned").insert(
            key,
            CacheEntry {
                files: files.clone(),
                at: Instant::now(),
            },
        );
        Ok(files)
    }

    /// Drop a single cache entry, or the entire map if `dir` is `None`.
    pub fn invalidate(&self, dir: Option<&Path>) {
        let mut entries = self.entries.lock().expect("file cache lock poisoned");
        match dir {
            Some(dir) => {
                entries.remove(dir);
            }
            None => entries.clear(),
        }
    }

    /// Remove all expired entries, returning the number removed.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().expect("file cache lock poisoned");
        let ttl = self.ttl;
        let before = entries.len();
        entries.retain(|_, entry| entry.at.elapsed() < ttl);
        before - entries.len()
    }
}

fn scan_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PromptsmithError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "directory not found"),
        ));
    }

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| {
            e.file_name()
                .to_str()
                .map(|name| !name.starts_with('.') || e.depth() == 0)
                .unwrap_or(true)
        })
    {
        let entry = entry.map_err(|e| PromptsmithError::io(dir, std::io::Error::other(e.to_string())))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Scoped handle for a periodic sweep task. Dropping it (or calling
/// [`SweepHandle::stop`]) stops the task and releases its timer.
pub struct SweepHandle {
    handle: Option<JoinHandle<()>>,
    stop: std::sync::Arc<Notify>,
}

impl SweepHandle {
    /// Stop the sweeper, releasing the background task. Safe to call more
    /// than once.
    pub fn stop(&mut self) {
        self.stop.notify_waiters();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl FileCache {
    /// Start a periodic sweep task at `interval`, optionally invoking
    /// `on_swept(count)` after each pass. Returns a scoped handle; dropping
    /// or calling [`SweepHandle::stop`] releases the task.
    pub fn start_sweeper(
        self: &std::sync::Arc<Self>,
        interval: Duration,
        on_swept: Option<Box<dyn Fn(usize) + Send + Sync>>,
    ) -> SweepHandle {
        let cache = self.clone();
        let stop = std::sync::Arc::new(Notify::new());
        let stop_rx = stop.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let count = cache.sweep();
                        if let Some(cb) = &on_swept {
                            cb(count);
                        }
                    }
                    _ = stop_rx.notified() => break,
                }
            }
        });

        SweepHandle {
            handle: Some(handle),
            stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn lists_files_recursively_excluding_dotfiles() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yaml"), "x").unwrap();
        fs::write(dir.path().join(".hidden.yaml"), "x").unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("b.yaml"), "x").unwrap();

        let cache = FileCache::default();
        let files = cache.list(dir.path(), true).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn cache_is_served_until_invalidated() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yaml"), "x").unwrap();

        let cache = FileCache::new(Duration::from_secs(60));
        let first = cache.list(dir.path(), true).unwrap();
        assert_eq!(first.len(), 1);

        fs::write(dir.path().join("b.yaml"), "x").unwrap();
        let second = cache.list(dir.path(), true).unwrap();
        assert_eq!(second.len(), 1, "cached result should not see the new file");

        cache.invalidate(Some(dir.path()));
        let third = cache.list(dir.path(), true).unwrap();
        assert_eq!(third.len(), 2);
    }

    #[test]
    fn unreadable_dir_is_an_error() {
        let cache = FileCache::default();
        let result = cache.list(Path::new("/nonexistent/does/not/exist"), true);
        assert!(result.is_err());
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yaml"), "x").unwrap();

        let cache = FileCache::new(Duration::from_millis(10));
        cache.list(dir.path(), true).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.sweep(), 1);
    }
}
