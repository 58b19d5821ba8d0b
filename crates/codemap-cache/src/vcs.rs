use anyhow::{Context, Result};
use codemap_core::{is_ignored_path, FieldDigest, Language};
use codemap_git::{GitRepository, PathDelta};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Prefix of tokens minted when no version control is available. Such a
/// token never equals a later one and can never be diffed against.
pub const SYNTHETIC_PREFIX: &str = "untracked-";

/// The version-control state a generation is stamped with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceState {
    /// Opaque token compared for equality: `<head>` when the tree is clean,
    /// `<head>+<digest>` with uncommitted edits or ignored source files, or
    /// a synthetic token.
    pub token: String,
    /// Commit the token is based on, `None` for synthetic tokens.
    pub head: Option<String>,
    /// Project-relative paths with uncommitted edits.
    pub dirty_paths: Vec<String>,
    /// Project-relative source files git ignores. History says nothing
    /// about them, so their cached content is never trusted.
    pub ignored_paths: Vec<String>,
}

impl ReferenceState {
    pub fn synthetic() -> Self {
        Self {
            token: synthetic_reference(),
            head: None,
            dirty_paths: Vec::new(),
            ignored_paths: Vec::new(),
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.head.is_none()
    }
}

pub fn synthetic_reference() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}{}", SYNTHETIC_PREFIX, nanos)
}

/// Commit part of a stored token, `None` when the token is synthetic.
pub fn base_commit(token: &str) -> Option<&str> {
    if token.starts_with(SYNTHETIC_PREFIX) || token.is_empty() {
        return None;
    }
    Some(token.split('+').next().unwrap_or(token))
}

/// Source of version-control signals for one project root.
pub trait VersionControl: Send + Sync {
    /// Current state, or `None` when version control is unavailable.
    fn reference(&self) -> Option<ReferenceState>;

    /// Classified project-relative path changes between commit `base` and
    /// the current working tree.
    fn changes_since(&self, base: &str) -> Result<Vec<PathDelta>>;
}

/// Used for projects known to be outside any repository.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVersionControl;

impl VersionControl for NoVersionControl {
    fn reference(&self) -> Option<ReferenceState> {
        None
    }

    fn changes_since(&self, base: &str) -> Result<Vec<PathDelta>> {
        anyhow::bail!("no version control available to diff against {}", base)
    }
}

/// Git-backed signals. The repository is reopened on each call so the
/// adapter holds no libgit2 handle between generations.
pub struct GitVersionControl {
    root: PathBuf,
    excluded_dirs: Vec<String>,
}

impl GitVersionControl {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded_dirs: Vec::new(),
        }
    }

    /// Top-level directory names whose contents never count as changes,
    /// typically the generator's own output directory.
    pub fn with_excluded_dirs(mut self, dirs: Vec<String>) -> Self {
        self.excluded_dirs = dirs;
        self
    }

    fn counts(&self, path: &str) -> bool {
        if is_ignored_path(Path::new(path)) {
            return false;
        }
        let first = path.split('/').next().unwrap_or(path);
        !self.excluded_dirs.iter().any(|d| d == first)
    }

    /// Folds each path with its size and mtime into `digest`.
    fn digest_paths(&self, digest: &mut FieldDigest, paths: &[String]) {
        for path in paths {
            digest.field(path);
            match fs::metadata(self.root.join(path)) {
                Ok(meta) => {
                    let mtime = meta
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                        .map(|d| d.as_nanos())
                        .unwrap_or_default();
                    digest.field(meta.len().to_le_bytes());
                    digest.field(mtime.to_le_bytes());
                }
                // deleted but not yet committed
                Err(_) => {
                    digest.field(b"missing");
                }
            }
        }
    }

    fn open(&self) -> Result<(GitRepository, String)> {
        let repo = GitRepository::open(&self.root)?;
        let workdir = repo
            .workdir()
            .context("repository has no working directory")?
            .to_path_buf();
        let prefix = project_prefix(&workdir, &self.root)?;
        Ok((repo, prefix))
    }
}

impl VersionControl for GitVersionControl {
    fn reference(&self) -> Option<ReferenceState> {
        let (repo, prefix) = match self.open() {
            Ok(opened) => opened,
            Err(e) => {
                debug!("No repository for {:?}: {:#}", self.root, e);
                return None;
            }
        };
        let head = match repo.head_commit_id() {
            Ok(Some(head)) => head,
            Ok(None) => {
                debug!("Repository at {:?} has no commits yet", self.root);
                return None;
            }
            Err(e) => {
                warn!("Cannot read HEAD for {:?}: {}", self.root, e);
                return None;
            }
        };
        let dirty = match repo.dirty_paths() {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Cannot read working tree status for {:?}: {}", self.root, e);
                return None;
            }
        };
        let dirty_paths: Vec<String> = dirty
            .iter()
            .filter_map(|p| strip_prefix(p, &prefix))
            .filter(|p| self.counts(p))
            .collect();
        let ignored_paths: Vec<String> = match repo.ignored_paths() {
            Ok(paths) => paths
                .iter()
                .filter_map(|p| strip_prefix(p, &prefix))
                .filter(|p| self.counts(p) && Language::is_source_path(Path::new(p)))
                .collect(),
            Err(e) => {
                warn!("Cannot list ignored files for {:?}: {}", self.root, e);
                return None;
            }
        };

        if dirty_paths.is_empty() && ignored_paths.is_empty() {
            return Some(ReferenceState {
                token: head.clone(),
                head: Some(head),
                dirty_paths,
                ignored_paths,
            });
        }

        let mut digest = FieldDigest::new();
        self.digest_paths(&mut digest, &dirty_paths);
        digest.field(b"ignored");
        self.digest_paths(&mut digest, &ignored_paths);
        let token = format!("{}+{}", head, &digest.finish()[..16]);
        Some(ReferenceState {
            token,
            head: Some(head),
            dirty_paths,
            ignored_paths,
        })
    }

    fn changes_since(&self, base: &str) -> Result<Vec<PathDelta>> {
        let (repo, prefix) = self.open()?;
        let deltas = repo
            .changes_since(base)
            .with_context(|| format!("diff against {} failed", base))?;
        Ok(deltas
            .into_iter()
            .filter_map(|d| strip_prefix(&d.path, &prefix).map(|p| PathDelta::new(p, d.kind)))
            .filter(|d| self.counts(&d.path))
            .collect())
    }
}

/// Path of `root` relative to the repository work directory, `/` separated,
/// with a trailing slash unless empty.
fn project_prefix(workdir: &Path, root: &Path) -> Result<String> {
    let workdir = fs::canonicalize(workdir)
        .with_context(|| format!("cannot resolve {}", workdir.display()))?;
    let root =
        fs::canonicalize(root).with_context(|| format!("cannot resolve {}", root.display()))?;
    let rel = codemap_core::relative_key(&workdir, &root)
        .context("project root lies outside the repository work directory")?;
    Ok(if rel.is_empty() { rel } else { format!("{}/", rel) })
}

fn strip_prefix(path: &str, prefix: &str) -> Option<String> {
    if prefix.is_empty() {
        return Some(path.to_string());
    }
    path.strip_prefix(prefix)
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
}
