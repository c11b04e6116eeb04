//! `GitSource`: syncs a remote Git repository into a target directory and
//! polls it for upstream changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use promptsmith_git::{fetch_remote_head, sync_repo, SyncOutcome};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Result, SourceError};

/// A user- or system-configured Git remote.
#[derive(Debug, Clone)]
pub struct GitSource {
    url: String,
    default_branch: String,
}

impl GitSource {
    /// Wrap a configured Git remote and default branch.
    pub fn new(url: impl Into<String>, default_branch: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            default_branch: default_branch.into(),
        }
    }

    /// The remote URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Confirm the URL looks like an `http(s)://` or `git@` remote.
    pub fn validate(&self) -> Result<()> {
        let ok = self.url.starts_with("http://")
            || self.url.starts_with("https://")
            || self.url.starts_with("git@");
        if !ok {
            return Err(SourceError::Sync {
                url: self.url.clone(),
                message: "not a recognised git remote (expected http(s):// or git@)".to_string(),
            });
        }
        Ok(())
    }

    /// Clone-or-update `target_dir` to the remote's `default_branch`.
    pub fn sync(&self, target_dir: &Path, max_retries: u32) -> Result<SyncOutcome> {
        sync_repo(&self.url, target_dir, &self.default_branch, max_retries).map_err(|e| {
            SourceError::Sync {
                url: self.url.clone(),
                message: e.to_string(),
            }
        })
    }

    /// Start a periodic poller: each tick fetches `origin` and compares the
    /// remote branch's commit hash to the last-seen one. The first tick only
    /// records the hash. A changed hash triggers a full [`Self::sync`] and
    /// then `on_update`; on success the remembered hash advances.
    pub fn poll<F>(
        &self,
        target_dir: PathBuf,
        interval: Duration,
        max_retries: u32,
        on_update: F,
    ) -> GitPollHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let url = self.url.clone();
        let branch = self.default_branch.clone();
        let stop = Arc::new(Notify::new());
        let stop_rx = stop.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut last_seen: Option<String> = None;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let head = match tokio::task::spawn_blocking({
                            let target_dir = target_dir.clone();
                            let branch = branch.clone();
                            move || fetch_remote_head(&target_dir, &branch)
                        }).await {
                            Ok(Ok(head)) => head,
                            Ok(Err(e)) => {
                                warn!(url, error = %e, "poll: fetch failed");
                                continue;
                            }
                            Err(e) => {
                                warn!(url, error = %e, "poll: fetch task panicked");
                                continue;
                            }
                        };

                        match &last_seen {
                            None => {
                                debug!(url, %head, "poll: recorded initial remote head");
                                last_seen = Some(head);
                            }
                            Some(seen) if seen == &head => {}
                            Some(_) => {
                                debug!(url, %head, "poll: remote head changed, syncing");
                                let sync_result = tokio::task::spawn_blocking({
                                    let url = url.clone();
                                    let branch = branch.clone();
                                    let target_dir = target_dir.clone();
                                    move || sync_repo(&url, &target_dir, &branch, max_retries)
                                }).await;
                                match sync_result {
                                    Ok(Ok(_)) => {
                                        last_seen = Some(head);
                                        on_update();
                                    }
                                    Ok(Err(e)) => warn!(url, error = %e, "poll: sync failed"),
                                    Err(e) => warn!(url, error = %e, "poll: sync task panicked"),
                                }
                            }
                        }
                    }
                    _ = stop_rx.notified() => break,
                }
            }
        });

        GitPollHandle {
            handle: Some(handle),
            stop,
        }
    }
}

/// Scoped handle for a `GitSource` poller. Dropping it (or calling
/// [`GitPollHandle::stop`]) stops the background task.
pub struct GitPollHandle {
    handle: Option<JoinHandle<()>>,
    stop: Arc<Notify>,
}

impl GitPollHandle {
    /// Stop polling. Safe to call more than once.
    pub fn stop(&mut self) {
        self.stop.notify_waiters();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for GitPollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
