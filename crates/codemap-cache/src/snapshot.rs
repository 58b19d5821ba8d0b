use chrono::{DateTime, Utc};
use codemap_core::{CodeMapError, ProjectId, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Schema tag written into every snapshot. A stored snapshot carrying any
/// other tag is treated exactly like a missing one.
pub const SNAPSHOT_SCHEMA_VERSION: &str = "codemap-snapshot/2";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStats {
    pub file_count: usize,
    pub directory_count: usize,
    pub total_size: u64,
    #[serde(default)]
    pub lines_by_extension: BTreeMap<String, usize>,
}

/// Cached summary of one sub-application or sub-package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedEntity {
    pub count: usize,
    pub size: u64,
    pub hash: String,
    #[serde(default)]
    pub description: String,
}

/// Record of the last successful generation of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    pub version: String,
    pub project_id: ProjectId,
    pub last_reference_id: String,
    pub last_generated_at: DateTime<Utc>,
    #[serde(default)]
    pub stats: SnapshotStats,
    #[serde(default)]
    pub grouped_entities: BTreeMap<String, GroupedEntity>,
    #[serde(default)]
    pub path_descriptions: BTreeMap<String, String>,
    /// Paths with uncommitted edits when `last_reference_id` was taken.
    #[serde(default)]
    pub dirty_paths: Vec<String>,
}

impl ProjectSnapshot {
    pub fn empty(project_id: ProjectId) -> Self {
        Self {
            version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            project_id,
            last_reference_id: String::new(),
            last_generated_at: Utc::now(),
            stats: SnapshotStats::default(),
            grouped_entities: BTreeMap::new(),
            path_descriptions: BTreeMap::new(),
            dirty_paths: Vec::new(),
        }
    }
}

/// Fields to merge into the snapshot; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct SnapshotUpdate {
    pub stats: Option<SnapshotStats>,
    pub grouped_entities: Option<BTreeMap<String, GroupedEntity>>,
    pub path_descriptions: Option<BTreeMap<String, String>>,
}

/// On-disk snapshot of one project, stored at a fixed path inside the
/// project's output directory.
pub struct SnapshotCache {
    project_id: ProjectId,
    path: PathBuf,
}

impl SnapshotCache {
    pub fn new(project_id: ProjectId, path: impl Into<PathBuf>) -> Self {
        Self {
            project_id,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// Returns `None` when the file is missing, unparsable or written by a
    /// different schema version.
    pub fn load(&self) -> Option<ProjectSnapshot> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cannot read snapshot {:?}: {}", self.path, e);
                return None;
            }
        };

        // Check the tag before the full shape so older layouts are reported
        // as a version mismatch rather than as corruption.
        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("Ignoring corrupt snapshot {:?}: {}", self.path, e);
                return None;
            }
        };
        let version = value.get("version").and_then(|v| v.as_str());
        if version != Some(SNAPSHOT_SCHEMA_VERSION) {
            info!(
                "Snapshot {:?} has schema {:?}, expected {}; ignoring",
                self.path, version, SNAPSHOT_SCHEMA_VERSION
            );
            return None;
        }

        match serde_json::from_value::<ProjectSnapshot>(value) {
            Ok(snapshot) => {
                debug!(
                    "Loaded snapshot for {} at {}",
                    snapshot.project_id, snapshot.last_reference_id
                );
                Some(snapshot)
            }
            Err(e) => {
                warn!("Ignoring malformed snapshot {:?}: {}", self.path, e);
                None
            }
        }
    }

    /// Merges `update` into the stored snapshot (or a fresh one), stamps the
    /// reference and generation time, and writes it back.
    pub fn update(
        &self,
        update: SnapshotUpdate,
        reference: &str,
        dirty_paths: Vec<String>,
    ) -> Result<ProjectSnapshot> {
        let mut snapshot = self
            .load()
            .unwrap_or_else(|| ProjectSnapshot::empty(self.project_id.clone()));

        snapshot.version = SNAPSHOT_SCHEMA_VERSION.to_string();
        snapshot.project_id = self.project_id.clone();
        if let Some(stats) = update.stats {
            snapshot.stats = stats;
        }
        if let Some(entities) = update.grouped_entities {
            snapshot.grouped_entities = entities;
        }
        if let Some(descriptions) = update.path_descriptions {
            snapshot.path_descriptions = descriptions;
        }
        snapshot.dirty_paths = dirty_paths;
        snapshot.last_reference_id = reference.to_string();
        snapshot.last_generated_at = Utc::now();

        self.save(&snapshot)?;
        Ok(snapshot)
    }

    pub fn save(&self, snapshot: &ProjectSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// Deletes the snapshot file. Idempotent.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Cleared snapshot for {}", self.project_id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CodeMapError::Io(e)),
        }
    }
}
