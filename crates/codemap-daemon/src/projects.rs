use codemap_core::{CodeMapError, ProjectId, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEntry {
    pub id: ProjectId,
    pub path: PathBuf,
    #[serde(default = "default_auto_update")]
    pub auto_update: bool,
}

fn default_auto_update() -> bool {
    true
}

/// Projects registered through the command line, persisted as JSON so
/// `watch` can pick them up later.
#[derive(Debug, Clone)]
pub struct ProjectList {
    path: PathBuf,
    entries: Vec<ProjectEntry>,
}

impl ProjectList {
    /// Loads the list; a missing or unreadable file yields an empty list.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<ProjectEntry>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Ignoring corrupt project list {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Cannot read project list {}: {}", path.display(), e);
                Vec::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[ProjectEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &ProjectId) -> Option<&ProjectEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Returns false when the id is already registered.
    pub fn add(&mut self, entry: ProjectEntry) -> bool {
        if self.get(&entry.id).is_some() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn remove(&mut self, id: &ProjectId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.id != id);
        self.entries.len() != before
    }

    pub fn set_auto_update(&mut self, id: &ProjectId, enabled: bool) -> bool {
        match self.entries.iter_mut().find(|e| &e.id == id) {
            Some(entry) => {
                entry.auto_update = enabled;
                true
            }
            None => false,
        }
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, json).map_err(CodeMapError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(id: &str) -> ProjectEntry {
        ProjectEntry {
            id: ProjectId::from(id),
            path: PathBuf::from(format!("/work/{}", id)),
            auto_update: true,
        }
    }

    #[test]
    fn test_add_remove_and_persist() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("state/projects.json");

        let mut list = ProjectList::load(&file);
        assert!(list.is_empty());
        assert!(list.add(entry("api")));
        assert!(!list.add(entry("api")));
        assert!(list.add(entry("web")));
        assert!(list.set_auto_update(&ProjectId::from("web"), false));
        list.save().unwrap();

        let mut reloaded = ProjectList::load(&file);
        assert_eq!(reloaded.entries().len(), 2);
        assert!(!reloaded.get(&ProjectId::from("web")).unwrap().auto_update);
        assert!(reloaded.remove(&ProjectId::from("api")));
        assert!(!reloaded.remove(&ProjectId::from("api")));

        let raw = fs::read_to_string(&file).unwrap();
        assert!(raw.contains("\"autoUpdate\""));
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("projects.json");
        fs::write(&file, "{ not json").unwrap();
        assert!(ProjectList::load(&file).is_empty());
    }
}
