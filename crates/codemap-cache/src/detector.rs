use crate::entity::{scan_entity, EntityScan};
use crate::snapshot::{ProjectSnapshot, SnapshotCache, SnapshotUpdate};
use crate::vcs::{base_commit, ReferenceState, VersionControl};
use codemap_core::{ChangeSet, Result};
use codemap_git::DeltaKind;
use std::path::Path;
use tracing::{debug, info, warn};

/// Decides how much of a project must be regenerated, preferring cheap
/// signals first: reference equality, then a history diff, then a full
/// rescan. Any failure degrades to the next, more expensive signal.
pub struct ChangeDetector {
    cache: SnapshotCache,
    vcs: Box<dyn VersionControl>,
    /// Reference observed by the last detection; the next `update` stamps it
    /// so edits made while generating are picked up by the following run.
    observed: Option<ReferenceState>,
}

impl ChangeDetector {
    pub fn new(cache: SnapshotCache, vcs: Box<dyn VersionControl>) -> Self {
        Self {
            cache,
            vcs,
            observed: None,
        }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn load(&self) -> Option<ProjectSnapshot> {
        self.cache.load()
    }

    /// Version-control state right now, or a fresh synthetic token.
    pub fn current_state(&self) -> ReferenceState {
        self.vcs.reference().unwrap_or_else(ReferenceState::synthetic)
    }

    pub fn current_reference(&self) -> String {
        self.current_state().token
    }

    pub fn detect_changes(&mut self) -> ChangeSet {
        let state = self.current_state();
        let changes = self.classify(&state);
        self.observed = Some(state);
        changes
    }

    fn classify(&self, current: &ReferenceState) -> ChangeSet {
        let Some(snapshot) = self.cache.load() else {
            debug!("No usable snapshot; full rescan");
            return ChangeSet::full_rescan();
        };
        if snapshot.last_reference_id == current.token {
            debug!("Reference {} unchanged", current.token);
            return ChangeSet::nothing_changed();
        }
        if current.is_synthetic() {
            debug!("Version control unavailable; full rescan");
            return ChangeSet::full_rescan();
        }
        let Some(base) = base_commit(&snapshot.last_reference_id) else {
            debug!("Stored reference is not diffable; full rescan");
            return ChangeSet::full_rescan();
        };

        let deltas = match self.vcs.changes_since(base) {
            Ok(deltas) => deltas,
            Err(e) => {
                warn!("History diff failed, falling back to full rescan: {:#}", e);
                return ChangeSet::full_rescan();
            }
        };

        let mut changes = ChangeSet::default();
        for delta in deltas {
            match delta.kind {
                DeltaKind::Added => changes.record_added(delta.path),
                DeltaKind::Modified => changes.record_modified(delta.path),
                DeltaKind::Deleted => changes.record_deleted(delta.path),
            }
        }
        // A reverted uncommitted edit leaves no diff but was processed in its
        // edited form last time.
        changes.merge_dirty(snapshot.dirty_paths.iter().cloned());

        info!(
            "Detected {} added, {} modified, {} deleted since {}",
            changes.added.len(),
            changes.modified.len(),
            changes.deleted.len(),
            base
        );
        changes
    }

    /// Whether any changed path lies inside or above `dir`.
    pub fn directory_has_changes(dir: &str, changes: &ChangeSet) -> bool {
        changes.touches_directory(dir)
    }

    pub fn entity_hash(&self, path: &Path, excluded: &[String]) -> EntityScan {
        scan_entity(path, excluded)
    }

    /// Classifies the current state without recording it, so a pending
    /// `update` still stamps the reference its change set was computed on.
    pub fn needs_full_regeneration(&self) -> bool {
        self.classify(&self.current_state()).is_full_rescan()
    }

    /// Ignored source files seen by the last detection.
    pub fn ignored_paths(&self) -> &[String] {
        self.observed
            .as_ref()
            .map(|state| state.ignored_paths.as_slice())
            .unwrap_or_default()
    }

    /// Merges `update` into the snapshot and stamps it with the reference
    /// observed by the last detection (or the current one if none ran).
    pub fn update(&mut self, update: SnapshotUpdate) -> Result<ProjectSnapshot> {
        let state = match self.observed.take() {
            Some(state) => state,
            None => self.current_state(),
        };
        self.cache.update(update, &state.token, state.dirty_paths)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.observed = None;
        self.cache.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::NoVersionControl;
    use anyhow::anyhow;
    use codemap_core::ProjectId;
    use codemap_git::PathDelta;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    /// Scripted version control for exercising each detection branch.
    #[derive(Clone, Default)]
    struct FakeVcs {
        state: Arc<Mutex<Option<ReferenceState>>>,
        deltas: Arc<Mutex<Option<Vec<PathDelta>>>>,
    }

    impl FakeVcs {
        fn set(&self, token: &str, dirty: &[&str]) {
            *self.state.lock().unwrap() = Some(ReferenceState {
                token: token.to_string(),
                head: Some(token.split('+').next().unwrap().to_string()),
                dirty_paths: dirty.iter().map(|s| s.to_string()).collect(),
                ignored_paths: Vec::new(),
            });
        }
    }

    impl VersionControl for FakeVcs {
        fn reference(&self) -> Option<ReferenceState> {
            self.state.lock().unwrap().clone()
        }

        fn changes_since(&self, _base: &str) -> anyhow::Result<Vec<PathDelta>> {
            self.deltas
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| anyhow!("unresolvable"))
        }
    }

    fn detector(dir: &Path, vcs: Box<dyn VersionControl>) -> ChangeDetector {
        let cache = SnapshotCache::new(ProjectId::from("demo"), dir.join("snap.json"));
        ChangeDetector::new(cache, vcs)
    }

    #[test]
    fn test_no_snapshot_is_full_rescan() {
        let dir = tempdir().unwrap();
        let vcs = FakeVcs::default();
        vcs.set("c1", &[]);
        let mut d = detector(dir.path(), Box::new(vcs));
        assert!(d.detect_changes().is_full_rescan());
        assert!(d.needs_full_regeneration());
    }

    #[test]
    fn test_equal_reference_is_unchanged() {
        let dir = tempdir().unwrap();
        let vcs = FakeVcs::default();
        vcs.set("c1", &[]);
        let mut d = detector(dir.path(), Box::new(vcs));
        d.detect_changes();
        d.update(SnapshotUpdate::default()).unwrap();

        assert_eq!(d.current_reference(), d.current_reference());
        assert!(d.detect_changes().is_unchanged());
        assert!(!d.needs_full_regeneration());
    }

    #[test]
    fn test_diff_is_classified_and_dirty_paths_merged() {
        let dir = tempdir().unwrap();
        let vcs = FakeVcs::default();
        vcs.set("c1+aaaa", &["scratch.rs"]);
        let mut d = detector(dir.path(), Box::new(vcs.clone()));
        d.detect_changes();
        d.update(SnapshotUpdate::default()).unwrap();

        vcs.set("c2", &[]);
        *vcs.deltas.lock().unwrap() = Some(vec![
            PathDelta::new("new.rs", DeltaKind::Added),
            PathDelta::new("edit.rs", DeltaKind::Modified),
            PathDelta::new("old.rs", DeltaKind::Deleted),
        ]);
        let changes = d.detect_changes();
        assert!(changes.added.contains("new.rs"));
        assert!(changes.modified.contains("edit.rs"));
        assert!(changes.modified.contains("scratch.rs"));
        assert!(changes.deleted.contains("old.rs"));
        assert!(!changes.is_full_rescan());
    }

    #[test]
    fn test_diff_failure_is_full_rescan() {
        let dir = tempdir().unwrap();
        let vcs = FakeVcs::default();
        vcs.set("c1", &[]);
        let mut d = detector(dir.path(), Box::new(vcs.clone()));
        d.detect_changes();
        d.update(SnapshotUpdate::default()).unwrap();

        vcs.set("c2", &[]);
        assert!(d.detect_changes().is_full_rescan());
    }

    #[test]
    fn test_without_version_control_every_run_is_full() {
        let dir = tempdir().unwrap();
        let mut d = detector(dir.path(), Box::new(NoVersionControl));
        d.detect_changes();
        d.update(SnapshotUpdate::default()).unwrap();
        assert!(d.current_reference().starts_with("untracked-"));
        assert!(d.detect_changes().is_full_rescan());
    }

    #[test]
    fn test_update_stamps_observed_reference() {
        let dir = tempdir().unwrap();
        let vcs = FakeVcs::default();
        vcs.set("c1", &[]);
        let mut d = detector(dir.path(), Box::new(vcs.clone()));
        d.detect_changes();
        // HEAD moves while generating
        vcs.set("c2", &[]);
        let snapshot = d.update(SnapshotUpdate::default()).unwrap();
        assert_eq!(snapshot.last_reference_id, "c1");
    }

    #[test]
    fn test_full_regeneration_query_keeps_observed_reference() {
        let dir = tempdir().unwrap();
        let vcs = FakeVcs::default();
        vcs.set("c1", &[]);
        let mut d = detector(dir.path(), Box::new(vcs.clone()));
        assert!(d.detect_changes().is_full_rescan());

        vcs.set("c2", &[]);
        assert!(d.needs_full_regeneration());
        let snapshot = d.update(SnapshotUpdate::default()).unwrap();
        assert_eq!(snapshot.last_reference_id, "c1");

        // the edit behind c2 is still ahead of the snapshot
        assert!(!d.detect_changes().is_unchanged());
    }

    #[test]
    fn test_directory_has_changes() {
        let mut changes = ChangeSet::default();
        changes.record_modified("src/lib.rs");
        assert!(ChangeDetector::directory_has_changes("src", &changes));
        assert!(!ChangeDetector::directory_has_changes("docs", &changes));
        assert!(ChangeDetector::directory_has_changes(
            "docs",
            &ChangeSet::full_rescan()
        ));
    }

    #[test]
    fn test_clear_forces_full_rescan() {
        let dir = tempdir().unwrap();
        let vcs = FakeVcs::default();
        vcs.set("c1", &[]);
        let mut d = detector(dir.path(), Box::new(vcs));
        d.detect_changes();
        d.update(SnapshotUpdate::default()).unwrap();
        d.clear().unwrap();
        assert!(d.load().is_none());
        assert!(d.needs_full_regeneration());
    }
}
