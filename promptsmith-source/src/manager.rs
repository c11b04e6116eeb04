//! `SourceManager`: owns the priority-ordered user sources plus the optional
//! system source, and drives the initial load.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Result, SourceError};
use crate::git::GitSource;
use crate::local::LocalSource;

/// One configured source, dispatched by kind rather than through a trait
/// object — `LocalSource` and `GitSource` differ enough in their `watch`
/// signatures that a shared object-safe trait would need to erase most of
/// what each side actually offers.
#[derive(Debug, Clone)]
pub enum Source {
    /// A directory already on disk.
    Local(LocalSource),
    /// A remote Git repository.
    Git(GitSource),
}

impl Source {
    /// Parse a configured URL/path into the matching variant. Values
    /// starting with `http://`, `https://`, or `git@` are treated as Git
    /// remotes; everything else as a local path.
    pub fn parse(url: &str, default_branch: &str) -> Self {
        if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("git@") {
            Source::Git(GitSource::new(url, default_branch))
        } else {
            Source::Local(LocalSource::new(url))
        }
    }

    /// The configured URL or path, as a string.
    pub fn url(&self) -> String {
        match self {
            Source::Local(l) => l.path().display().to_string(),
            Source::Git(g) => g.url().to_string(),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Source::Local(l) => l.validate(),
            Source::Git(g) => g.validate(),
        }
    }

    fn sync(&self, target_dir: &Path, max_retries: u32) -> Result<()> {
        match self {
            Source::Local(l) => l.sync(target_dir).map(|_| ()),
            Source::Git(g) => g.sync(target_dir, max_retries).map(|_| ()),
        }
    }
}

/// One user-configured source, in ascending priority order (lower = earlier).
#[derive(Debug, Clone)]
pub struct PrioritizedSource {
    /// Lower sorts first.
    pub priority: usize,
    /// The source itself.
    pub source: Source,
}

/// Result of [`SourceManager::initial_load`].
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// URL/path of the source that was successfully synced.
    pub active_url: String,
    /// Index into the manager's user source list of the active source.
    pub active_index: usize,
    /// Whether a configured system source synced successfully.
    pub system_synced: bool,
    /// Non-fatal errors from sources that were tried before the active one,
    /// and from a failing system source.
    pub warnings: Vec<(String, String)>,
}

/// Owns the prioritised user sources and the optional system source, and
/// drives their initial sync.
pub struct SourceManager {
    user_sources: Vec<PrioritizedSource>,
    system_source: Option<Source>,
    target_dir: PathBuf,
    max_retries: u32,
    active_index: Option<usize>,
}

impl SourceManager {
    /// Build a manager from configured `(priority, url)` pairs, an optional
    /// system source URL, the target sync directory, the default Git branch,
    /// and the max per-source retry count.
    pub fn new(
        sources: impl IntoIterator<Item = (usize, String)>,
        system_url: Option<String>,
        target_dir: PathBuf,
        default_branch: &str,
        max_retries: u32,
    ) -> Self {
        let mut user_sources: Vec<PrioritizedSource> = sources
            .into_iter()
            .map(|(priority, url)| PrioritizedSource {
                priority,
                source: Source::parse(&url, default_branch),
            })
            .collect();
        user_sources.sort_by_key(|s| s.priority);

        Self {
            user_sources,
            system_source: system_url.map(|url| Source::parse(&url, default_branch)),
            target_dir,
            max_retries,
            active_index: None,
        }
    }

    /// The sibling directory a system source syncs into.
    pub fn system_target_dir(&self) -> PathBuf {
        let name = self
            .target_dir
            .file_name()
            .map(|n| format!("{}_system", n.to_string_lossy()))
            .unwrap_or_else(|| "system".to_string());
        self.target_dir
            .parent()
            .map(|p| p.join(&name))
            .unwrap_or_else(|| PathBuf::from(name))
    }

    /// The main sync target directory.
    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Try each user source in priority order, stopping at the first
    /// successful `validate` + `sync`. Then, if a system source is
    /// configured, sync it to a sibling directory — a failure there is
    /// reported but does not abort the load.
    pub fn initial_load(&mut self) -> Result<LoadReport> {
        let mut warnings = Vec::new();

        let mut active = None;
        for (index, entry) in self.user_sources.iter().enumerate() {
            match entry.source.validate().and_then(|_| {
                entry.source.sync(&self.target_dir, self.max_retries)
            }) {
                Ok(()) => {
                    info!(url = %entry.source.url(), "source synced, active for this reload");
                    active = Some(index);
                    break;
                }
                Err(e) => {
                    warn!(url = %entry.source.url(), error = %e, "source failed, trying next");
                    warnings.push((entry.source.url(), e.to_string()));
                }
            }
        }

        let active_index = active.ok_or_else(|| {
            SourceError::AllSourcesFailed(
                self.user_sources
                    .iter()
                    .map(|s| s.source.url())
                    .zip(warnings.iter().map(|(_, msg)| msg.clone()))
                    .collect(),
            )
        })?;
        self.active_index = Some(active_index);

        let mut system_synced = false;
        if let Some(system) = &self.system_source {
            let system_dir = self.system_target_dir();
            match system.validate().and_then(|_| system.sync(&system_dir, self.max_retries)) {
                Ok(()) => system_synced = true,
                Err(e) => {
                    warn!(url = %system.url(), error = %e, "system source failed, proceeding without it");
                    warnings.push((system.url(), e.to_string()));
                }
            }
        }

        Ok(LoadReport {
            active_url: self.user_sources[active_index].source.url(),
            active_index,
            system_synced,
            warnings,
        })
    }

    /// The currently active user source, if [`Self::initial_load`] has run.
    pub fn active_source(&self) -> Option<&Source> {
        self.active_index.map(|i| &self.user_sources[i].source)
    }

    /// Re-sync the already-active source (and the system source, if any)
    /// without walking the fallback chain again. Used by `fullReload`, as
    /// opposed to [`Self::initial_load`]'s first-success-wins startup path.
    pub fn resync_active(&self) -> Result<()> {
        let index = self.active_index.ok_or_else(|| SourceError::Sync {
            url: "<none>".to_string(),
            message: "no active source; initial_load must run first".to_string(),
        })?;
        self.user_sources[index].source.sync(&self.target_dir, self.max_retries)?;

        if let Some(system) = &self.system_source {
            let system_dir = self.system_target_dir();
            if let Err(e) = system.sync(&system_dir, self.max_retries) {
                warn!(url = %system.url(), error = %e, "system source resync failed, proceeding without it");
            }
        }
        Ok(())
    }

    /// Replace the active source at runtime (e.g. via the `switch_source`
    /// control tool) and re-run the initial-load sequence against it.
    pub fn switch_active_source(&mut self, url: String, default_branch: &str) -> Result<LoadReport> {
        let source = Source::parse(&url, default_branch);
        source.validate().and_then(|_| source.sync(&self.target_dir, self.max_retries))?;

        self.user_sources.insert(
            0,
            PrioritizedSource {
                priority: 0,
                source,
            },
        );
        self.active_index = Some(0);

        let mut system_synced = false;
        if let Some(system) = &self.system_source {
            let system_dir = self.system_target_dir();
            system_synced = system
                .validate()
                .and_then(|_| system.sync(&system_dir, self.max_retries))
                .is_ok();
        }

        Ok(LoadReport {
            active_url: url,
            active_index: 0,
            system_synced,
            warnings: Vec::new(),
        })
    }
}
