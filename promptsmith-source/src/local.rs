//! `LocalSource`: mirrors (or directly reads) a local directory tree, and
//! watches it for per-file `.yaml`/`.yml` changes with a debounce window.
//!
//! Grounded on the mirror-copy/exclusion-set idiom in
//! `mirdan-cli::git_source` and the debounced `notify::RecommendedWatcher`
//! pattern used for config reloading in the VTCode example.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::{Result, SourceError};

/// Basenames (already lower-cased) skipped while mirroring a local tree.
const EXCLUDED_DIR_NAMES: &[&str] = &[
    ".git",
    "node_modules",
    ".ds_store",
    ".vscode",
    ".idea",
    "dist",
    "build",
    ".next",
    ".nuxt",
    ".cache",
    "coverage",
    ".nyc_output",
];

const STABILITY_THRESHOLD: Duration = Duration::from_millis(300);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A user- or system-configured source that is already a directory on disk.
#[derive(Debug, Clone)]
pub struct LocalSource {
    path: PathBuf,
}

/// What [`LocalSource::sync`] actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalSyncOutcome {
    /// `path` and the target directory resolve to the same place; nothing was copied.
    DirectRead,
    /// `path` was mirrored into the target directory.
    Mirrored {
        /// Number of files copied.
        copied: usize,
        /// Number of entries skipped (excluded dir, symlink, or non-regular file).
        skipped: usize,
    },
}

impl LocalSource {
    /// Wrap a configured local path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The configured path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Confirm the path exists and is a directory.
    pub fn validate(&self) -> Result<()> {
        if !self.path.is_dir() {
            return Err(SourceError::Sync {
                url: self.path.display().to_string(),
                message: "path does not exist or is not a directory".to_string(),
            });
        }
        Ok(())
    }

    /// Mirror into `target_dir`, or do nothing beyond direct-read if `path`
    /// and `target_dir` are the same directory.
    pub fn sync(&self, target_dir: &Path) -> Result<LocalSyncOutcome> {
        let same = canonical(&self.path) == canonical(target_dir);
        if same {
            debug!(path = %self.path.display(), "local source in direct-read mode");
            return Ok(LocalSyncOutcome::DirectRead);
        }

        std::fs::create_dir_all(target_dir)?;
        let mut copied = 0usize;
        let mut skipped = 0usize;
        mirror_dir(&self.path, target_dir, &mut copied, &mut skipped)?;
        debug!(copied, skipped, "mirrored local source");
        Ok(LocalSyncOutcome::Mirrored { copied, skipped })
    }

    /// Watch `watch_dir` for `.yaml`/`.yml` create/modify/delete events,
    /// debounced per file. `on_change` receives the absolute changed path
    /// once events for it have been quiet for the stability window.
    pub fn watch<F>(&self, watch_dir: &Path, on_change: F) -> Result<LocalWatchHandle>
    where
        F: Fn(PathBuf) + Send + Sync + 'static,
    {
        let pending: Arc<Mutex<HashMap<PathBuf, Instant>>> = Arc::new(Mutex::new(HashMap::new()));
        let pending_writer = pending.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "watch error");
                    return;
                }
            };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                return;
            }
            let mut pending = pending_writer.lock().expect("watch pending lock poisoned");
            for path in event.paths {
                if is_yaml(&path) {
                    pending.insert(path, Instant::now());
                }
            }
        })
        .map_err(|e| SourceError::Sync {
            url: watch_dir.display().to_string(),
            message: e.to_string(),
        })?;

        watcher
            .watch(watch_dir, RecursiveMode::Recursive)
            .map_err(|e| SourceError::Sync {
                url: watch_dir.display().to_string(),
                message: e.to_string(),
            })?;

        let stop = Arc::new(AtomicBool::new(false));
        let poll_stop = stop.clone();
        let poll_pending = pending;
        let poll_handle = std::thread::spawn(move || loop {
            if poll_stop.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
            let mut ready = Vec::new();
            {
                let mut pending = poll_pending.lock().expect("watch pending lock poisoned");
                pending.retain(|path, at| {
                    if at.elapsed() >= STABILITY_THRESHOLD {
                        ready.push(path.clone());
                        false
                    } else {
                        true
                    }
                });
            }
            for path in ready {
                on_change(path);
            }
        });

        Ok(LocalWatchHandle {
            _watcher: watcher,
            stop,
            poll_handle: Some(poll_handle),
        })
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn mirror_dir(src: &Path, dst: &Path, copied: &mut usize, skipped: &mut usize) -> Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_lower = name.to_string_lossy().to_lowercase();
        if EXCLUDED_DIR_NAMES.contains(&name_lower.as_str()) {
            *skipped += 1;
            continue;
        }

        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            warn!(path = %entry.path().display(), "skipping symlink while mirroring source");
            *skipped += 1;
            continue;
        }

        let src_path = entry.path();
        let dst_path = dst.join(&name);

        if file_type.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            mirror_dir(&src_path, &dst_path, copied, skipped)?;
        } else if file_type.is_file() {
            match std::fs::copy(&src_path, &dst_path) {
                Ok(_) => *copied += 1,
                Err(e) => {
                    warn!(path = %src_path.display(), error = %e, "failed to copy file while mirroring source");
                    *skipped += 1;
                }
            }
        } else {
            *skipped += 1;
        }
    }
    Ok(())
}

/// Scoped handle for a `LocalSource` watcher. Dropping it (or calling
/// [`LocalWatchHandle::stop`]) releases the OS watch handle and the debounce
/// poll thread.
pub struct LocalWatchHandle {
    _watcher: RecommendedWatcher,
    stop: Arc<AtomicBool>,
    poll_handle: Option<std::thread::JoinHandle<()>>,
}

impl LocalWatchHandle {
    /// Stop watching. Safe to call more than once.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.poll_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LocalWatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn direct_read_mode_when_same_directory() {
        let dir = TempDir::new().unwrap();
        let source = LocalSource::new(dir.path());
        let outcome = source.sync(dir.path()).unwrap();
        assert_eq!(outcome, LocalSyncOutcome::DirectRead);
    }

    #[test]
    fn mirrors_excluding_excluded_dirs() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("a.yaml"), "x").unwrap();
        fs::create_dir(src.path().join("node_modules")).unwrap();
        fs::write(src.path().join("node_modules").join("b.yaml"), "x").unwrap();
        fs::create_dir(src.path().join("common")).unwrap();
        fs::write(src.path().join("common").join("c.yaml"), "x").unwrap();

        let dst = TempDir::new().unwrap();
        let source = LocalSource::new(src.path());
        let outcome = source.sync(dst.path().join("target").as_path()).unwrap();
        match outcome {
            LocalSyncOutcome::Mirrored { copied, .. } => assert_eq!(copied, 2),
            other => panic!("expected mirrored outcome, got {other:?}"),
        }
        assert!(dst.path().join("target/a.yaml").exists());
        assert!(dst.path().join("target/common/c.yaml").exists());
        assert!(!dst.path().join("target/node_modules").exists());
    }

    #[test]
    fn validate_rejects_missing_path() {
        let source = LocalSource::new("/does/not/exist/anywhere");
        assert!(source.validate().is_err());
    }

    #[test]
    fn watch_fires_after_stability_window() {
        let dir = TempDir::new().unwrap();
        let source = LocalSource::new(dir.path());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_writer = seen.clone();
        let _handle = source
            .watch(dir.path(), move |path| {
                seen_writer.lock().unwrap().push(path);
            })
            .unwrap();

        std::fs::write(dir.path().join("new.yaml"), "hello").unwrap();
        std::thread::sleep(Duration::from_millis(700));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
