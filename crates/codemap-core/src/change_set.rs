use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sentinel member: in `added` it means "treat everything as added", in
/// `unchanged` it means "nothing to do".
pub const ALL_PATHS: &str = "*";

/// Classified diff driving incremental work. Paths are relative to the
/// project root and use `/` separators. The four collections stay disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
}

impl ChangeSet {
    pub fn full_rescan() -> Self {
        Self {
            added: BTreeSet::from([ALL_PATHS.to_string()]),
            ..Default::default()
        }
    }

    pub fn nothing_changed() -> Self {
        Self {
            unchanged: BTreeSet::from([ALL_PATHS.to_string()]),
            ..Default::default()
        }
    }

    pub fn is_full_rescan(&self) -> bool {
        self.added.contains(ALL_PATHS)
    }

    pub fn is_unchanged(&self) -> bool {
        self.unchanged.contains(ALL_PATHS)
            && self.added.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.modified.is_empty() || !self.deleted.is_empty()
    }

    pub fn record_added(&mut self, path: impl Into<String>) {
        let path = path.into();
        if self.deleted.remove(&path) {
            self.record_modified(path);
            return;
        }
        self.clear_unchanged_sentinel();
        self.modified.remove(&path);
        self.unchanged.remove(&path);
        self.added.insert(path);
    }

    pub fn record_modified(&mut self, path: impl Into<String>) {
        let path = path.into();
        if self.added.contains(&path) {
            return;
        }
        self.clear_unchanged_sentinel();
        self.deleted.remove(&path);
        self.unchanged.remove(&path);
        self.modified.insert(path);
    }

    pub fn record_deleted(&mut self, path: impl Into<String>) {
        let path = path.into();
        self.clear_unchanged_sentinel();
        self.added.remove(&path);
        self.modified.remove(&path);
        self.unchanged.remove(&path);
        self.deleted.insert(path);
    }

    /// Folds in paths known to be touched since the last generation (for
    /// example from file-system events). A full rescan already covers them.
    pub fn merge_dirty<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.is_full_rescan() {
            return;
        }
        for path in paths {
            let path = path.into();
            if self.added.contains(&path) || self.deleted.contains(&path) {
                continue;
            }
            self.record_modified(path);
        }
    }

    /// Whether the content at `path` may differ from what was last processed.
    pub fn may_have_changed(&self, path: &str) -> bool {
        if self.is_full_rescan() {
            return true;
        }
        self.added.contains(path) || self.modified.contains(path)
    }

    pub fn is_deleted(&self, path: &str) -> bool {
        self.deleted.contains(path)
    }

    pub fn changed_paths(&self) -> impl Iterator<Item = &String> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .chain(self.deleted.iter())
            .filter(|p| p.as_str() != ALL_PATHS)
    }

    /// True if the full-rescan sentinel is set or any changed path is an
    /// ancestor or descendant of `dir` (string prefix test on root-relative
    /// paths; an empty or `.` dir is the root itself).
    pub fn touches_directory(&self, dir: &str) -> bool {
        if self.is_full_rescan() {
            return true;
        }
        let dir = dir.trim_end_matches('/');
        if dir.is_empty() || dir == "." {
            return self.has_changes();
        }
        self.changed_paths()
            .any(|changed| changed.starts_with(dir) || dir.starts_with(changed.as_str()))
    }

    pub fn total_changed(&self) -> usize {
        self.changed_paths().count()
    }

    fn clear_unchanged_sentinel(&mut self) {
        self.unchanged.remove(ALL_PATHS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        let full = ChangeSet::full_rescan();
        assert!(full.is_full_rescan());
        assert!(full.may_have_changed("anything.rs"));
        assert!(full.touches_directory("src"));

        let none = ChangeSet::nothing_changed();
        assert!(none.is_unchanged());
        assert!(!none.may_have_changed("src/lib.rs"));
        assert!(!none.touches_directory("src"));
    }

    #[test]
    fn test_collections_stay_disjoint() {
        let mut cs = ChangeSet::default();
        cs.record_added("a.rs");
        cs.record_modified("a.rs");
        assert!(cs.added.contains("a.rs"));
        assert!(!cs.modified.contains("a.rs"));

        cs.record_deleted("b.rs");
        cs.record_added("b.rs");
        assert!(cs.modified.contains("b.rs"));
        assert!(!cs.deleted.contains("b.rs"));
        assert!(!cs.added.contains("b.rs"));
    }

    #[test]
    fn test_merge_dirty_clears_unchanged_sentinel() {
        let mut cs = ChangeSet::nothing_changed();
        cs.merge_dirty(["src/main.rs"]);
        assert!(!cs.is_unchanged());
        assert!(cs.may_have_changed("src/main.rs"));
        assert!(!cs.may_have_changed("src/other.rs"));
    }

    #[test]
    fn test_touches_directory_ancestor_and_descendant() {
        let mut cs = ChangeSet::default();
        cs.record_modified("src/app/main.rs");
        assert!(cs.touches_directory("src"));
        assert!(cs.touches_directory("src/app"));
        assert!(cs.touches_directory("src/app/main.rs/"));
        assert!(!cs.touches_directory("docs"));
        assert!(cs.touches_directory("."));

        let mut dir_removed = ChangeSet::default();
        dir_removed.record_deleted("lib");
        assert!(dir_removed.touches_directory("lib/nested"));
    }
}
