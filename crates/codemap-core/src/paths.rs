use std::path::{Component, Path};

/// Directory names never descended into and never reacted to: version
/// control metadata, dependency trees, build output, caches and logs.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "vendor",
    "target",
    "dist",
    "build",
    "out",
    ".next",
    "__pycache__",
    ".pytest_cache",
    ".venv",
    "venv",
    ".cache",
    "coverage",
    "logs",
    "tmp",
];

pub fn is_ignored_name(name: &str) -> bool {
    IGNORED_DIRS.contains(&name)
}

/// True if any component of `path` is an ignored directory name.
pub fn is_ignored_path(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => name.to_str().map(is_ignored_name).unwrap_or(false),
        _ => false,
    })
}

/// Root-relative, `/`-separated key for `path`. Returns `None` when `path`
/// lies outside `root`. The root itself maps to the empty string.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}
