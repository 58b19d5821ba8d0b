use crate::{errors::*, types::*};
use git2::{Delta, DiffFindOptions, DiffOptions, Oid, Repository, RepositoryOpenFlags, StatusOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct GitRepository {
    path: PathBuf,
    repo: Repository,
}

impl GitRepository {
    /// Opens the repository containing `path`, searching parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let repo = Repository::open_ext(
            path_ref,
            RepositoryOpenFlags::empty(),
            &[] as &[&std::ffi::OsStr],
        )
        .map_err(|_| GitIntegrationError::RepoNotFound(path_ref.display().to_string()))?;
        Ok(Self {
            path: path_ref.to_path_buf(),
            repo,
        })
    }

    pub fn init<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Repository::init(path.as_ref())?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            repo,
        })
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.repo.workdir()
    }

    pub fn is_bare(&self) -> bool {
        self.repo.is_bare()
    }

    /// HEAD commit id, or `None` for a repository without commits.
    pub fn head_commit_id(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(head.target().map(|oid| oid.to_string()))
    }

    /// Work-directory relative paths with uncommitted edits, including
    /// untracked files that are not ignored. Sorted for stable digests.
    pub fn dirty_paths(&self) -> Result<Vec<String>> {
        if self.is_bare() {
            return Err(GitIntegrationError::BareRepository);
        }
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;

        let mut paths = Vec::with_capacity(statuses.len());
        for entry in statuses.iter() {
            let status = entry.status();
            if status.is_ignored() || status.is_empty() {
                continue;
            }
            match entry.path() {
                Some(p) => paths.push(p.to_string()),
                None => return Err(GitIntegrationError::InvalidUtf8),
            }
        }
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// Work-directory relative files git ignores. Ignored directories are
    /// reported as a single entry with a trailing `/` and not descended.
    pub fn ignored_paths(&self) -> Result<Vec<String>> {
        if self.is_bare() {
            return Err(GitIntegrationError::BareRepository);
        }
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(true)
            .recurse_ignored_dirs(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;

        let mut paths = Vec::new();
        for entry in statuses.iter() {
            if !entry.status().is_ignored() {
                continue;
            }
            match entry.path() {
                Some(p) => paths.push(p.to_string()),
                None => return Err(GitIntegrationError::InvalidUtf8),
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Classified deltas between commit `base` and the current working tree
    /// (index and work directory, untracked files included). Renames are
    /// reported as a deletion of the old path plus an addition of the new.
    pub fn changes_since(&self, base: &str) -> Result<Vec<PathDelta>> {
        if self.is_bare() {
            return Err(GitIntegrationError::BareRepository);
        }
        let oid = Oid::from_str(base)
            .map_err(|_| GitIntegrationError::InvalidReference(base.to_string()))?;
        let base_tree = self.repo.find_commit(oid)?.tree()?;

        let mut opts = DiffOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let mut diff = self
            .repo
            .diff_tree_to_workdir_with_index(Some(&base_tree), Some(&mut opts))?;

        let mut find = DiffFindOptions::new();
        find.renames(true).for_untracked(true);
        diff.find_similar(Some(&mut find))?;

        let mut deltas = Vec::new();
        for delta in diff.deltas() {
            let old_path = delta.old_file().path().map(path_to_string).transpose()?;
            let new_path = delta.new_file().path().map(path_to_string).transpose()?;
            match delta.status() {
                Delta::Added | Delta::Untracked | Delta::Copied => {
                    if let Some(p) = new_path {
                        deltas.push(PathDelta::new(p, DeltaKind::Added));
                    }
                }
                Delta::Deleted => {
                    if let Some(p) = old_path {
                        deltas.push(PathDelta::new(p, DeltaKind::Deleted));
                    }
                }
                Delta::Renamed => {
                    if let Some(p) = old_path {
                        deltas.push(PathDelta::new(p, DeltaKind::Deleted));
                    }
                    if let Some(p) = new_path {
                        deltas.push(PathDelta::new(p, DeltaKind::Added));
                    }
                }
                Delta::Modified | Delta::Typechange | Delta::Conflicted | Delta::Unreadable => {
                    if let Some(p) = new_path.or(old_path) {
                        deltas.push(PathDelta::new(p, DeltaKind::Modified));
                    }
                }
                Delta::Unmodified | Delta::Ignored => {}
            }
        }
        debug!("{} deltas since {}", deltas.len(), base);
        Ok(deltas)
    }
}

fn path_to_string(p: &Path) -> Result<String> {
    p.to_str()
        .map(|s| s.replace('\\', "/"))
        .ok_or(GitIntegrationError::InvalidUtf8)
}
