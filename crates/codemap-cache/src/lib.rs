// ABOUTME: Incremental change-detection and caching engine
// ABOUTME: Per-file fingerprints, per-project generation snapshots and version-control driven change sets

pub mod detector;
pub mod entity;
pub mod fingerprint;
pub mod snapshot;
pub mod vcs;

pub use detector::ChangeDetector;
pub use entity::{entity_hash, scan_entity, EntityScan};
pub use fingerprint::{FingerprintEntry, FingerprintStore, FunctionFingerprint};
pub use snapshot::{
    GroupedEntity, ProjectSnapshot, SnapshotCache, SnapshotStats, SnapshotUpdate,
    SNAPSHOT_SCHEMA_VERSION,
};
pub use vcs::{
    synthetic_reference, GitVersionControl, NoVersionControl, ReferenceState, VersionControl,
};
