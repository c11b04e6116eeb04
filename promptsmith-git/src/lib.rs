//! git2-backed clone/fetch/rebase operations used by `GitSource`.
//!
//! Grounded on `swissarmyhammer-git`'s `git2_utils` error-conversion style and
//! on `mirdan-cli::git_source`'s clone/checkout helpers, generalised from a
//! one-shot package install to the idempotent sync-then-poll lifecycle this
//! spec's `GitSource` requires.

mod error;
mod sync;

pub use error::{GitError, GitResult};
pub use sync::{fetch_remote_head, local_head_commit, sync_repo, SyncOutcome};
