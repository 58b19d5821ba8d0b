use chrono::{DateTime, Utc};
use codemap_core::{content_digest, CodeMapError, ProjectId, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionFingerprint {
    /// Digest of the function's source text.
    pub description_hash: String,
    pub description: String,
}

/// Last-seen state of one file.
///
/// `content_hash` is the digest of exactly the content last passed to
/// [`FingerprintStore::update_file`]. Function entries are tracked
/// independently of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintEntry {
    pub content_hash: String,
    #[serde(default)]
    pub content: String,
    pub last_modified_at: DateTime<Utc>,
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionFingerprint>,
}

impl FingerprintEntry {
    fn empty() -> Self {
        Self {
            content_hash: String::new(),
            content: String::new(),
            last_modified_at: Utc::now(),
            functions: BTreeMap::new(),
        }
    }
}

type Table = BTreeMap<String, FingerprintEntry>;

/// Per-project tables mapping file paths to fingerprints, persisted as
/// `{cache_dir}/{project_id}.json`. Every mutation writes the project's
/// table back to disk before returning.
pub struct FingerprintStore {
    cache_dir: PathBuf,
    tables: HashMap<ProjectId, Table>,
}

impl FingerprintStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            tables: HashMap::new(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_file(&self, project: &ProjectId) -> PathBuf {
        self.cache_dir.join(format!("{}.json", project))
    }

    /// Reads the persisted table, replacing any in-memory copy. A missing or
    /// unparsable file yields an empty table.
    pub fn load(&mut self, project: &ProjectId) {
        let path = self.cache_file(project);
        let table = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Table>(&raw) {
                Ok(table) => {
                    debug!("Loaded {} fingerprints for {}", table.len(), project);
                    table
                }
                Err(e) => {
                    warn!("Ignoring corrupt fingerprint cache {:?}: {}", path, e);
                    Table::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Table::new(),
            Err(e) => {
                warn!("Cannot read fingerprint cache {:?}: {}", path, e);
                Table::new()
            }
        };
        self.tables.insert(project.clone(), table);
    }

    pub fn has_file_changed(&mut self, project: &ProjectId, path: &str, content: &str) -> bool {
        match self.table(project).get(path) {
            Some(entry) => entry.content_hash != content_digest(content),
            None => true,
        }
    }

    pub fn has_function_changed(
        &mut self,
        project: &ProjectId,
        path: &str,
        name: &str,
        content: &str,
    ) -> bool {
        match self
            .table(project)
            .get(path)
            .and_then(|entry| entry.functions.get(name))
        {
            Some(function) => function.description_hash != content_digest(content),
            None => true,
        }
    }

    /// Stores the file's hash and raw content, keeping existing function
    /// entries.
    pub fn update_file(&mut self, project: &ProjectId, path: &str, content: &str) -> Result<()> {
        let entry = self
            .table_mut(project)
            .entry(path.to_string())
            .or_insert_with(FingerprintEntry::empty);
        entry.content_hash = content_digest(content);
        entry.content = content.to_string();
        entry.last_modified_at = Utc::now();
        self.persist(project)
    }

    /// Stores one function's hash and description, creating an empty parent
    /// entry when the file is not tracked yet.
    pub fn update_function(
        &mut self,
        project: &ProjectId,
        path: &str,
        name: &str,
        content: &str,
        description: &str,
    ) -> Result<()> {
        let entry = self
            .table_mut(project)
            .entry(path.to_string())
            .or_insert_with(FingerprintEntry::empty);
        entry.functions.insert(
            name.to_string(),
            FunctionFingerprint {
                description_hash: content_digest(content),
                description: description.to_string(),
            },
        );
        entry.last_modified_at = Utc::now();
        self.persist(project)
    }

    /// Drops function entries of `path` whose names are not in `keep`.
    pub fn retain_functions(
        &mut self,
        project: &ProjectId,
        path: &str,
        keep: &[&str],
    ) -> Result<()> {
        let Some(entry) = self.table_mut(project).get_mut(path) else {
            return Ok(());
        };
        let before = entry.functions.len();
        entry.functions.retain(|name, _| keep.contains(&name.as_str()));
        if entry.functions.len() == before {
            return Ok(());
        }
        self.persist(project)
    }

    /// Forgets a file, for example after it was deleted.
    pub fn remove_file(&mut self, project: &ProjectId, path: &str) -> Result<()> {
        if self.table_mut(project).remove(path).is_none() {
            return Ok(());
        }
        self.persist(project)
    }

    pub fn get_cached_file_content(&mut self, project: &ProjectId, path: &str) -> Option<String> {
        self.table(project)
            .get(path)
            .filter(|entry| !entry.content_hash.is_empty())
            .map(|entry| entry.content.clone())
    }

    pub fn get_cached_function_description(
        &mut self,
        project: &ProjectId,
        path: &str,
        name: &str,
    ) -> Option<String> {
        self.table(project)
            .get(path)
            .and_then(|entry| entry.functions.get(name))
            .map(|function| function.description.clone())
    }

    pub fn tracked_paths(&mut self, project: &ProjectId) -> Vec<String> {
        self.table(project).keys().cloned().collect()
    }

    /// Deletes the on-disk table and the in-memory copy. Idempotent.
    pub fn clear(&mut self, project: &ProjectId) -> Result<()> {
        let path = self.cache_file(project);
        match fs::remove_file(&path) {
            Ok(()) => info!("Cleared fingerprint cache for {}", project),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CodeMapError::Io(e)),
        }
        // Keep an empty table so nothing stale is read back lazily.
        self.tables.insert(project.clone(), Table::new());
        Ok(())
    }

    fn table(&mut self, project: &ProjectId) -> &Table {
        self.table_mut(project)
    }

    fn table_mut(&mut self, project: &ProjectId) -> &mut Table {
        if !self.tables.contains_key(project) {
            self.load(project);
        }
        self.tables.entry(project.clone()).or_default()
    }

    fn persist(&self, project: &ProjectId) -> Result<()> {
        let Some(table) = self.tables.get(project) else {
            return Ok(());
        };
        fs::create_dir_all(&self.cache_dir)?;
        let json = serde_json::to_string(table)?;
        fs::write(self.cache_file(project), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn id(s: &str) -> ProjectId {
        ProjectId::from(s)
    }

    #[test]
    fn test_unknown_file_is_changed() {
        let dir = tempdir().unwrap();
        let mut store = FingerprintStore::new(dir.path());
        assert!(store.has_file_changed(&id("p"), "a.rs", "x"));
        assert!(store.has_function_changed(&id("p"), "a.rs", "f", "x"));
        assert_eq!(store.get_cached_file_content(&id("p"), "a.rs"), None);
    }

    #[test]
    fn test_update_then_compare() {
        let dir = tempdir().unwrap();
        let mut store = FingerprintStore::new(dir.path());
        let p = id("p");
        store.update_file(&p, "a.rs", "fn a() {}").unwrap();
        assert!(!store.has_file_changed(&p, "a.rs", "fn a() {}"));
        assert!(store.has_file_changed(&p, "a.rs", "fn a() { 1 }"));
    }

    #[test]
    fn test_update_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut store = FingerprintStore::new(dir.path());
        let p = id("p");
        store.update_file(&p, "a.rs", "same").unwrap();
        store.update_file(&p, "a.rs", "same").unwrap();
        assert_eq!(store.get_cached_file_content(&p, "a.rs").as_deref(), Some("same"));
        assert!(!store.has_file_changed(&p, "a.rs", "same"));
    }

    #[test]
    fn test_update_file_preserves_functions() {
        let dir = tempdir().unwrap();
        let mut store = FingerprintStore::new(dir.path());
        let p = id("p");
        store.update_function(&p, "a.rs", "f", "fn f() {}", "does f").unwrap();
        store.update_file(&p, "a.rs", "fn f() {}\n// edit").unwrap();
        assert!(!store.has_function_changed(&p, "a.rs", "f", "fn f() {}"));
        assert_eq!(
            store.get_cached_function_description(&p, "a.rs", "f").as_deref(),
            Some("does f")
        );
    }

    #[test]
    fn test_update_function_creates_parent_with_empty_hash() {
        let dir = tempdir().unwrap();
        let mut store = FingerprintStore::new(dir.path());
        let p = id("p");
        store.update_function(&p, "a.rs", "f", "body", "").unwrap();
        // parent has no content hash yet, so the file still reads as changed
        assert!(store.has_file_changed(&p, "a.rs", "body"));
        assert_eq!(store.get_cached_file_content(&p, "a.rs"), None);
    }

    #[test]
    fn test_functions_isolated_between_files() {
        let dir = tempdir().unwrap();
        let mut store = FingerprintStore::new(dir.path());
        let p = id("p");
        store.update_function(&p, "a.rs", "run", "v1", "").unwrap();
        store.update_function(&p, "b.rs", "run", "v1", "").unwrap();
        store.update_function(&p, "a.rs", "run", "v2", "").unwrap();
        assert!(!store.has_function_changed(&p, "b.rs", "run", "v1"));
        assert!(store.has_function_changed(&p, "b.rs", "run", "v2"));
    }

    #[test]
    fn test_persisted_across_instances() {
        let dir = tempdir().unwrap();
        let p = id("p");
        {
            let mut store = FingerprintStore::new(dir.path());
            store.update_file(&p, "a.rs", "abc").unwrap();
        }
        assert!(dir.path().join("p.json").exists());
        let mut store = FingerprintStore::new(dir.path());
        store.load(&p);
        assert!(!store.has_file_changed(&p, "a.rs", "abc"));
    }

    #[test]
    fn test_projects_are_separate_namespaces() {
        let dir = tempdir().unwrap();
        let mut store = FingerprintStore::new(dir.path());
        store.update_file(&id("one"), "a.rs", "abc").unwrap();
        assert!(store.has_file_changed(&id("two"), "a.rs", "abc"));
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("p.json"), "{ not json").unwrap();
        let mut store = FingerprintStore::new(dir.path());
        store.load(&id("p"));
        assert!(store.tracked_paths(&id("p")).is_empty());
        // and it is writable again afterwards
        store.update_file(&id("p"), "a.rs", "x").unwrap();
        assert!(!store.has_file_changed(&id("p"), "a.rs", "x"));
    }

    #[test]
    fn test_clear_drops_disk_and_memory() {
        let dir = tempdir().unwrap();
        let mut store = FingerprintStore::new(dir.path());
        let p = id("p");
        store.update_file(&p, "a.rs", "abc").unwrap();
        store.clear(&p).unwrap();
        assert!(!dir.path().join("p.json").exists());
        assert_eq!(store.get_cached_file_content(&p, "a.rs"), None);
        store.clear(&p).unwrap();
    }

    #[test]
    fn test_retain_and_remove() {
        let dir = tempdir().unwrap();
        let mut store = FingerprintStore::new(dir.path());
        let p = id("p");
        store.update_function(&p, "a.rs", "f", "1", "").unwrap();
        store.update_function(&p, "a.rs", "g", "2", "").unwrap();
        store.retain_functions(&p, "a.rs", &["g"]).unwrap();
        assert!(store.has_function_changed(&p, "a.rs", "f", "1"));
        assert!(!store.has_function_changed(&p, "a.rs", "g", "2"));

        store.remove_file(&p, "a.rs").unwrap();
        assert!(store.tracked_paths(&p).is_empty());
    }
}
