//! Idempotent clone-or-update sync, matching spec §4.2 `GitSource::sync`:
//!
//! 1. If `target_dir` is not a repo (or does not exist) → fresh clone.
//! 2. If it is a repo → fetch, then rebase onto the remote branch; on
//!    divergence that the rebase cannot resolve, `reset --hard` to the
//!    remote branch.
//! 3. Retried up to `max_retries` attempts with `1s * attempt` backoff.

use std::path::Path;
use std::thread;
use std::time::Duration;

use git2::{AnnotatedCommit, Repository};
use tracing::{debug, info, warn};

use crate::error::{convert_git2_error, GitError, GitResult};

/// What a successful sync actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The target directory did not hold a repository; a fresh clone was performed.
    Cloned,
    /// The existing repository was already at the remote's head.
    UpToDate,
    /// The existing repository was fast-forwarded or rebased onto the remote.
    Updated,
    /// The existing repository had diverged and was hard-reset to the remote.
    Reset,
}

/// Sync `url`@`branch` into `target_dir`, retrying up to `max_retries` times
/// with `1s * attempt` backoff between attempts. Preserves the last error on
/// exhaustion.
pub fn sync_repo(
    url: &str,
    target_dir: &Path,
    branch: &str,
    max_retries: u32,
) -> GitResult<SyncOutcome> {
    let mut last_error = None;
    for attempt in 1..=max_retries.max(1) {
        match try_sync_once(url, target_dir, branch) {
            Ok(outcome) => return Ok(outcome),
            Err(e) => {
                warn!(url, attempt, error = %e, "sync attempt failed");
                last_error = Some(e);
                if attempt < max_retries {
                    thread::sleep(Duration::from_secs(attempt as u64));
                }
            }
        }
    }
    Err(GitError::RetriesExhausted {
        url: url.to_string(),
        attempts: max_retries,
        last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
    })
}

fn try_sync_once(url: &str, target_dir: &Path, branch: &str) -> GitResult<SyncOutcome> {
    if !is_existing_repo(target_dir) {
        info!(url, target = %target_dir.display(), "cloning fresh repository");
        clone(url, target_dir, branch)?;
        return Ok(SyncOutcome::Cloned);
    }

    let repo = Repository::open(target_dir).map_err(|e| convert_git2_error("open", e))?;
    fetch(&repo, branch)?;

    let remote_commit = find_remote_annotated_commit(&repo, branch)?;
    let analysis = repo
        .merge_analysis(&[&remote_commit])
        .map_err(|e| convert_git2_error("merge_analysis", e))?;

    if analysis.0.is_up_to_date() {
        return Ok(SyncOutcome::UpToDate);
    }

    if analysis.0.is_fast_forward() {
        fast_forward(&repo, branch, &remote_commit)?;
        return Ok(SyncOutcome::Updated);
    }

    match rebase_onto(&repo, &remote_commit) {
        Ok(()) => Ok(SyncOutcome::Updated),
        Err(e) => {
            warn!(error = %e, "rebase failed, resetting hard to origin");
            reset_hard(&repo, &remote_commit)?;
            Ok(SyncOutcome::Reset)
        }
    }
}

fn is_existing_repo(dir: &Path) -> bool {
    dir.is_dir() && Repository::open(dir).is_ok()
}

fn clone(url: &str, target_dir: &Path, branch: &str) -> GitResult<()> {
    if target_dir.exists() && target_dir.read_dir().map(|mut i| i.next().is_some()).unwrap_or(false)
    {
        return Err(GitError::NotARepository {
            path: target_dir.to_path_buf(),
        });
    }
    if let Some(parent) = target_dir.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let mut builder = git2::build::RepoBuilder::new();
    builder.branch(branch);
    builder
        .clone(url, target_dir)
        .map_err(|e| convert_git2_error("clone", e))?;
    Ok(())
}

fn fetch(repo: &Repository, branch: &str) -> GitResult<()> {
    let mut remote = repo
        .find_remote("origin")
        .map_err(|e| convert_git2_error("find_remote", e))?;
    remote
        .fetch(&[branch], None, None)
        .map_err(|e| convert_git2_error("fetch", e))?;
    debug!(branch, "fetched origin");
    Ok(())
}

fn find_remote_annotated_commit<'repo>(
    repo: &'repo Repository,
    branch: &str,
) -> GitResult<AnnotatedCommit<'repo>> {
    let remote_ref = format!("refs/remotes/origin/{branch}");
    let reference = repo
        .find_reference(&remote_ref)
        .map_err(|e| convert_git2_error("find_reference", e))?;
    repo.reference_to_annotated_commit(&reference)
        .map_err(|e| convert_git2_error("reference_to_annotated_commit", e))
}

fn fast_forward(repo: &Repository, branch: &str, remote: &AnnotatedCommit<'_>) -> GitResult<()> {
    let refname = format!("refs/heads/{branch}");
    let mut reference = repo
        .find_reference(&refname)
        .map_err(|e| convert_git2_error("find_reference", e))?;
    reference
        .set_target(remote.id(), "fast-forward")
        .map_err(|e| convert_git2_error("set_target", e))?;
    repo.set_head(&refname)
        .map_err(|e| convert_git2_error("set_head", e))?;
    repo.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))
        .map_err(|e| convert_git2_error("checkout_head", e))?;
    Ok(())
}

fn rebase_onto(repo: &Repository, remote: &AnnotatedCommit<'_>) -> GitResult<()> {
    let head_commit = repo
        .reference_to_annotated_commit(&repo.head().map_err(|e| convert_git2_error("head", e))?)
        .map_err(|e| convert_git2_error("reference_to_annotated_commit", e))?;

    let mut rebase = repo
        .rebase(Some(&head_commit), None, Some(remote), None)
        .map_err(|e| convert_git2_error("rebase", e))?;

    let signature = repo
        .signature()
        .unwrap_or_else(|_| git2::Signature::now("promptsmith", "promptsmith@local").unwrap());

    while let Some(op) = rebase.next() {
        let op = op.map_err(|e| convert_git2_error("rebase_operation", e))?;
        if repo.index().map(|i| i.has_conflicts()).unwrap_or(false) {
            let _ = rebase.abort();
            return Err(convert_git2_error(
                "rebase",
                git2::Error::from_str(&format!("conflict at {}", op.id())),
            ));
        }
        rebase
            .commit(None, &signature, None)
            .map_err(|e| convert_git2_error("rebase_commit", e))?;
    }
    rebase
        .finish(None)
        .map_err(|e| convert_git2_error("rebase_finish", e))?;
    Ok(())
}

fn reset_hard(repo: &Repository, remote: &AnnotatedCommit<'_>) -> GitResult<()> {
    let commit = repo
        .find_commit(remote.id())
        .map_err(|e| convert_git2_error("find_commit", e))?;
    repo.reset(
        commit.as_object(),
        git2::ResetType::Hard,
        Some(git2::build::CheckoutBuilder::default().force()),
    )
    .map_err(|e| convert_git2_error("reset", e))?;
    Ok(())
}

/// Read `HEAD`'s commit hash from an already-synced local clone, with no
/// network access. Used for health reporting, where a fetch would be
/// wasteful.
pub fn local_head_commit(target_dir: &Path) -> Option<String> {
    let repo = Repository::open(target_dir).ok()?;
    let head = repo.head().ok()?;
    head.target().map(|oid| oid.to_string())
}

/// Fetch `origin` and return the current `origin/<branch>` commit hash, used
/// by the polling loop to detect upstream changes without a full sync.
pub fn fetch_remote_head(target_dir: &Path, branch: &str) -> GitResult<String> {
    let repo = Repository::open(target_dir).map_err(|e| convert_git2_error("open", e))?;
    fetch(&repo, branch)?;
    let remote_ref = format!("refs/remotes/origin/{branch}");
    let reference = repo
        .find_reference(&remote_ref)
        .map_err(|e| convert_git2_error("find_reference", e))?;
    let oid = reference
        .target()
        .ok_or_else(|| convert_git2_error("target", git2::Error::from_str("no target")))?;
    Ok(oid.to_string())
}
