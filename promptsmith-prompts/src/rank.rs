//! Stable total order over tool-eligible runtime entries (spec §4.7).

use crate::runtime::PromptRuntime;

/// Rank key: `(status, version, source-kind)` descending, then `id` ascending
/// as the stable tiebreaker. Built once per entry so sorting is a cheap key
/// comparison rather than repeated field lookups.
fn rank_key(runtime: &PromptRuntime) -> (std::cmp::Reverse<u8>, std::cmp::Reverse<crate::runtime::Version>, std::cmp::Reverse<u8>, &str) {
    (
        std::cmp::Reverse(runtime.status.rank()),
        std::cmp::Reverse(runtime.version),
        std::cmp::Reverse(runtime.source.rank()),
        runtime.id.as_str(),
    )
}

/// Stable-sort `runtimes` into priority order (highest-priority first).
/// Only meant to be called with entries whose `runtime_state` is
/// `active`/`legacy`; callers filter eligibility before ranking.
pub fn rank(mut runtimes: Vec<PromptRuntime>) -> Vec<PromptRuntime> {
    runtimes.sort_by(|a, b| rank_key(a).cmp(&rank_key(b)));
    runtimes
}

/// The same ordering [`rank`] applies, exposed for callers that need to sort
/// a `PromptRuntime` paired with something else (e.g. its compiled
/// template) by priority without unzipping the pair.
pub fn cmp_priority(a: &PromptRuntime, b: &PromptRuntime) -> std::cmp::Ordering {
    rank_key(a).cmp(&rank_key(b))
}

/// Resolve duplicate ids by keeping only the rank-winning entry per id,
/// assuming `ranked` is already in priority order (as returned by [`rank`]).
/// Entries that lose are returned separately as shadow entries (still valid
/// `PromptRuntime`s, just not tool-registered).
pub fn dedupe_by_id(ranked: Vec<PromptRuntime>) -> (Vec<PromptRuntime>, Vec<PromptRuntime>) {
    let mut seen = std::collections::HashSet::new();
    let mut winners = Vec::new();
    let mut shadows = Vec::new();
    for runtime in ranked {
        if seen.insert(runtime.id.clone()) {
            winners.push(runtime);
        } else {
            shadows.push(runtime);
        }
    }
    (winners, shadows)
}
