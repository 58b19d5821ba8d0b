use codemap_core::{content_digest, is_ignored_path, relative_key, Language};
use codemap_parser::{RawEvent, RawEventKind};
use std::fs;
use std::path::{Path, PathBuf};

/// How a single touched path bears on the generated artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relevance {
    Irrelevant,
    /// A source file, manifest or structural change, keyed relative to the root.
    Changed(String),
    /// The artifact was edited by someone else.
    Artifact,
}

/// Decides which file-system events should schedule a regeneration.
///
/// Creations, removals and renames of any non-ignored path change the
/// rendered tree. Plain modifications only matter for source files and
/// manifests. Nothing under the output directory counts, except the
/// artifact itself when its content differs from what was last written.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    root: PathBuf,
    output_dir: PathBuf,
    artifact: PathBuf,
    last_written: Option<String>,
}

impl RelevanceFilter {
    pub fn new(root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, artifact: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_dir: output_dir.into(),
            artifact: artifact.into(),
            last_written: None,
        }
    }

    /// Remembers the digest of our own latest write to the artifact.
    pub fn record_write(&mut self, digest: String) {
        self.last_written = Some(digest);
    }

    pub fn classify(&self, kind: RawEventKind, path: &Path) -> Relevance {
        if path == self.artifact {
            return if self.is_own_write() {
                Relevance::Irrelevant
            } else {
                Relevance::Artifact
            };
        }
        if path.starts_with(&self.output_dir) {
            return Relevance::Irrelevant;
        }

        let key = match relative_key(&self.root, path) {
            Some(key) if !key.is_empty() => key,
            _ => return Relevance::Irrelevant,
        };
        if is_ignored_path(Path::new(&key)) {
            return Relevance::Irrelevant;
        }

        let structural = !matches!(kind, RawEventKind::Modify);
        let is_manifest = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(Language::is_manifest)
            .unwrap_or(false);
        if structural || is_manifest || Language::is_source_path(path) {
            Relevance::Changed(key)
        } else {
            Relevance::Irrelevant
        }
    }

    /// Relevant root-relative keys of an event, plus whether the artifact
    /// was edited externally.
    pub fn relevant_paths(&self, event: &RawEvent) -> (Vec<String>, bool) {
        let mut keys = Vec::new();
        let mut artifact = false;
        for path in &event.paths {
            match self.classify(event.kind, path) {
                Relevance::Changed(key) => keys.push(key),
                Relevance::Artifact => artifact = true,
                Relevance::Irrelevant => {}
            }
        }
        (keys, artifact)
    }

    fn is_own_write(&self) -> bool {
        match (&self.last_written, fs::read(&self.artifact)) {
            (Some(expected), Ok(bytes)) => content_digest(&bytes) == *expected,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn filter(root: &Path) -> RelevanceFilter {
        RelevanceFilter::new(
            root,
            root.join(".codemap"),
            root.join(".codemap/project-structure.md"),
        )
    }

    #[test]
    fn test_source_and_manifest_modifications_are_relevant() {
        let root = Path::new("/work/demo");
        let f = filter(root);
        assert_eq!(
            f.classify(RawEventKind::Modify, &root.join("src/lib.rs")),
            Relevance::Changed("src/lib.rs".to_string())
        );
        assert_eq!(
            f.classify(RawEventKind::Modify, &root.join("Cargo.toml")),
            Relevance::Changed("Cargo.toml".to_string())
        );
        assert_eq!(
            f.classify(RawEventKind::Modify, &root.join("README.md")),
            Relevance::Irrelevant
        );
        assert_eq!(
            f.classify(RawEventKind::Create, &root.join("README.md")),
            Relevance::Changed("README.md".to_string())
        );
    }

    #[test]
    fn test_ignored_outside_and_output_paths() {
        let root = Path::new("/work/demo");
        let f = filter(root);
        assert_eq!(
            f.classify(RawEventKind::Create, &root.join("node_modules/x/index.js")),
            Relevance::Irrelevant
        );
        assert_eq!(
            f.classify(RawEventKind::Modify, Path::new("/elsewhere/main.rs")),
            Relevance::Irrelevant
        );
        assert_eq!(
            f.classify(RawEventKind::Modify, &root.join(".codemap/incremental-cache.json")),
            Relevance::Irrelevant
        );
        assert_eq!(f.classify(RawEventKind::Modify, root), Relevance::Irrelevant);
    }

    #[test]
    fn test_artifact_own_write_is_suppressed() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".codemap")).unwrap();
        let artifact = root.join(".codemap/project-structure.md");
        fs::write(&artifact, "# generated\n").unwrap();

        let mut f = filter(root);
        assert_eq!(f.classify(RawEventKind::Modify, &artifact), Relevance::Artifact);

        f.record_write(content_digest("# generated\n"));
        assert_eq!(f.classify(RawEventKind::Modify, &artifact), Relevance::Irrelevant);

        fs::write(&artifact, "# hand edited\n").unwrap();
        assert_eq!(f.classify(RawEventKind::Modify, &artifact), Relevance::Artifact);

        fs::remove_file(&artifact).unwrap();
        assert_eq!(f.classify(RawEventKind::Remove, &artifact), Relevance::Artifact);
    }

    #[test]
    fn test_relevant_paths_of_mixed_event() {
        let root = Path::new("/work/demo");
        let event = RawEvent::new(
            RawEventKind::Rename,
            vec![root.join("src/old.rs"), root.join("target/debug/x")],
        );
        let (keys, artifact) = filter(root).relevant_paths(&event);
        assert_eq!(keys, vec!["src/old.rs".to_string()]);
        assert!(!artifact);
    }
}
