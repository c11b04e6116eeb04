//! Group derivation and the active-group filter (spec's "first path segment"
//! rule, plus the `common`/system-source carve-out).

use std::path::Path;

/// Name used for documents directly under a source root.
pub const ROOT_GROUP: &str = "root";
/// The single group a system source is allowed to contribute.
pub const COMMON_GROUP: &str = "common";

/// Compute a document's group: the first path segment of `path` relative to
/// `root`, or [`ROOT_GROUP`] for files directly under it.
pub fn compute_group(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) => match relative.components().next() {
            Some(first) if relative.components().count() > 1 => {
                first.as_os_str().to_string_lossy().into_owned()
            }
            _ => ROOT_GROUP.to_string(),
        },
        Err(_) => ROOT_GROUP.to_string(),
    }
}

/// Whether a document with `group` should be loaded, given the active group
/// set `active`, whether a system source is configured (`system_configured`),
/// and whether this document came from the system source itself
/// (`from_system_source`).
pub fn should_load(
    group: &str,
    active: &std::collections::HashSet<String>,
    system_configured: bool,
    from_system_source: bool,
) -> bool {
    if from_system_source {
        return group == COMMON_GROUP;
    }
    if group == ROOT_GROUP {
        return true;
    }
    if group == COMMON_GROUP {
        return system_configured || active.contains(COMMON_GROUP);
    }
    active.contains(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn root_level_files_get_root_group() {
        let root = Path::new("/repo");
        assert_eq!(compute_group(root, Path::new("/repo/code-review.yaml")), ROOT_GROUP);
    }

    #[test]
    fn nested_files_use_first_segment() {
        let root = Path::new("/repo");
        assert_eq!(compute_group(root, Path::new("/repo/laravel/x.yaml")), "laravel");
    }

    #[test]
    fn root_group_always_loads() {
        let active = HashSet::new();
        assert!(should_load(ROOT_GROUP, &active, false, false));
    }

    #[test]
    fn common_loads_only_with_system_source_or_explicit_activation() {
        let mut active = HashSet::new();
        assert!(!should_load(COMMON_GROUP, &active, false, false));
        assert!(should_load(COMMON_GROUP, &active, true, false));
        active.insert(COMMON_GROUP.to_string());
        assert!(should_load(COMMON_GROUP, &active, false, false));
    }

    #[test]
    fn system_source_documents_only_load_as_common() {
        let active: HashSet<String> = ["laravel".to_string()].into_iter().collect();
        assert!(!should_load("laravel", &active, true, true));
        assert!(should_load(COMMON_GROUP, &active, true, true));
    }

    #[test]
    fn other_groups_require_explicit_activation() {
        let active: HashSet<String> = ["laravel".to_string()].into_iter().collect();
        assert!(should_load("laravel", &active, false, false));
        assert!(!should_load("django", &active, false, false));
    }
}
