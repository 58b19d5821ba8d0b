use codemap_core::{is_ignored_name, relative_key, CodeMapError, Language, Result};
use ignore::WalkBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Configuration for one project walk.
#[derive(Debug, Clone)]
pub struct WalkConfig {
    pub max_depth: usize,
    /// Directory names skipped in addition to the shared ignore list,
    /// typically the project's own output directory.
    pub extra_excludes: Vec<String>,
    /// Honour the ignore files git would: those in the tree and its parent
    /// directories, `.git/info/exclude` and the global excludes file.
    pub respect_gitignore: bool,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            extra_excludes: vec![],
            respect_gitignore: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    Dir(DirNode),
    File { size: u64 },
}

/// Nested name to children structure of a project directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirNode {
    pub children: BTreeMap<String, TreeNode>,
}

impl DirNode {
    fn insert_path(&mut self, components: &[&str], leaf: TreeNode) {
        match components {
            [] => {}
            [name] => {
                // Existing directories keep the children inserted so far.
                self.children.entry((*name).to_string()).or_insert(leaf);
            }
            [head, rest @ ..] => {
                let entry = self
                    .children
                    .entry((*head).to_string())
                    .or_insert_with(|| TreeNode::Dir(DirNode::default()));
                if let TreeNode::File { .. } = entry {
                    *entry = TreeNode::Dir(DirNode::default());
                }
                if let TreeNode::Dir(dir) = entry {
                    dir.insert_path(rest, leaf);
                }
            }
        }
    }

    /// Immediate child directory names, sorted.
    pub fn subdirectories(&self) -> impl Iterator<Item = &str> {
        self.children.iter().filter_map(|(name, node)| match node {
            TreeNode::Dir(_) => Some(name.as_str()),
            TreeNode::File { .. } => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Aggregate counts gathered during a walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub file_count: usize,
    pub directory_count: usize,
    pub total_size: u64,
    pub files_by_extension: BTreeMap<String, usize>,
    /// Line counts, only for extensions of known source languages.
    pub lines_by_extension: BTreeMap<String, usize>,
}

/// A file seen by the walk, keyed the same way as change sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    pub language: Option<Language>,
}

#[derive(Debug, Clone, Default)]
pub struct WalkResult {
    pub tree: DirNode,
    pub stats: TreeStats,
    /// Every regular file reached, sorted by key.
    pub files: Vec<WalkedFile>,
}

impl WalkResult {
    pub fn source_files(&self) -> impl Iterator<Item = &WalkedFile> {
        self.files.iter().filter(|f| f.language.is_some())
    }
}

/// Walks `root` to `config.max_depth`, skipping ignored directory names.
pub fn walk_project(root: &Path, config: &WalkConfig) -> Result<WalkResult> {
    if !root.is_dir() {
        return Err(CodeMapError::InvalidOperation(format!(
            "not a directory: {}",
            root.display()
        )));
    }
    info!("Walking project tree: {:?}", root);

    let excludes = config.extra_excludes.clone();
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(config.respect_gitignore)
        .git_global(config.respect_gitignore)
        .git_exclude(config.respect_gitignore)
        .parents(config.respect_gitignore)
        .require_git(false)
        .follow_links(false)
        .max_depth(Some(config.max_depth))
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir || entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !is_ignored_name(&name) && !excludes.iter().any(|e| e == name.as_ref())
        });

    let mut result = WalkResult::default();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let Some(key) = relative_key(root, entry.path()) else {
            continue;
        };
        let components: Vec<&str> = key.split('/').collect();
        let file_type = match entry.file_type() {
            Some(t) => t,
            None => continue,
        };

        if file_type.is_dir() {
            result.stats.directory_count += 1;
            result
                .tree
                .insert_path(&components, TreeNode::Dir(DirNode::default()));
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let language = Language::from_path(entry.path());
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        result.stats.file_count += 1;
        result.stats.total_size += size;
        *result.stats.files_by_extension.entry(ext.clone()).or_default() += 1;
        if language.is_some() {
            match count_lines(entry.path()) {
                Ok(lines) => *result.stats.lines_by_extension.entry(ext).or_default() += lines,
                Err(e) => debug!("Could not count lines in {:?}: {}", entry.path(), e),
            }
        }

        result.tree.insert_path(&components, TreeNode::File { size });
        result.files.push(WalkedFile {
            key,
            path: entry.path().to_path_buf(),
            size,
            language,
        });
    }

    result.files.sort_by(|a, b| a.key.cmp(&b.key));
    info!(
        "Walk complete: {} files in {} directories",
        result.stats.file_count, result.stats.directory_count
    );
    Ok(result)
}

fn count_lines(path: &Path) -> std::io::Result<usize> {
    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        return Ok(0);
    }
    let newlines = bytes.iter().filter(|b| **b == b'\n').count();
    Ok(if bytes.last() == Some(&b'\n') {
        newlines
    } else {
        newlines + 1
    })
}
