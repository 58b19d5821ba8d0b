use codemap_core::Language;
use codemap_parser::DirNode;
use codemap_parser::TreeNode;
use std::path::Path;

/// Directory names whose children are scanned for sub-packages.
pub const CONTAINER_DIRS: &[&str] = &["apps", "packages", "crates", "libs", "services"];

/// A directory carrying its own manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCandidate {
    /// Root-relative key, `.` for the project root.
    pub key: String,
    pub manifest: &'static str,
}

/// Finds grouped entities: the root and its direct subdirectories, plus the
/// children of container directories, whenever they hold a manifest.
pub fn find_entities(root: &Path, tree: &DirNode) -> Vec<EntityCandidate> {
    let mut keys = vec![".".to_string()];
    for name in tree.subdirectories() {
        keys.push(name.to_string());
        if CONTAINER_DIRS.contains(&name) {
            if let Some(TreeNode::Dir(container)) = tree.children.get(name) {
                keys.extend(
                    container
                        .subdirectories()
                        .map(|child| format!("{}/{}", name, child)),
                );
            }
        }
    }

    keys.into_iter()
        .filter_map(|key| {
            let dir = if key == "." { root.to_path_buf() } else { root.join(&key) };
            Language::manifest_files()
                .find(|m| dir.join(m).is_file())
                .map(|manifest| EntityCandidate { key, manifest })
        })
        .collect()
}

/// Immediate child names of the directory at `key`, directories suffixed `/`.
pub fn child_listing(tree: &DirNode, key: &str) -> Vec<String> {
    let mut node = tree;
    if key != "." && !key.is_empty() {
        for part in key.split('/') {
            match node.children.get(part) {
                Some(TreeNode::Dir(child)) => node = child,
                _ => return Vec::new(),
            }
        }
    }
    node.children
        .iter()
        .map(|(name, child)| match child {
            TreeNode::Dir(_) => format!("{}/", name),
            TreeNode::File { .. } => name.clone(),
        })
        .collect()
}
