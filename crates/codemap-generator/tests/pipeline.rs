use async_trait::async_trait;
use codemap_ai::{DescriptionProvider, NoopDescriptionProvider};
use codemap_cache::{ReferenceState, VersionControl};
use codemap_core::{CodeMapConfig, ProjectId};
use codemap_git::PathDelta;
use codemap_generator::{GenerationOutcome, GenerationRequest, ProjectGenerator};
use git2::{IndexAddOption, Repository, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};

/// Records every prompt and answers with a fixed description.
#[derive(Default)]
struct CountingProvider {
    prompts: Mutex<Vec<String>>,
}

impl CountingProvider {
    fn count(&self, prefix: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with(prefix))
            .count()
    }

    fn matching(&self, prefix: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn reset(&self) {
        self.prompts.lock().unwrap().clear();
    }
}

#[async_trait]
impl DescriptionProvider for CountingProvider {
    async fn describe(&self, prompt: &str) -> String {
        self.prompts.lock().unwrap().push(prompt.to_string());
        "described".to_string()
    }

    fn provider_name(&self) -> &str {
        "counting"
    }
}

const FUNCTION: &str = "Describe the function";
const PACKAGE: &str = "Describe the package";

struct Fixture {
    _tmp: TempDir,
    root: PathBuf,
    config: CodeMapConfig,
    provider: Arc<CountingProvider>,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("demo");
        fs::create_dir_all(&root).unwrap();
        let mut config = CodeMapConfig::default();
        config.cache.directory = tmp.path().join("cache");
        Self {
            _tmp: tmp,
            root,
            config,
            provider: Arc::new(CountingProvider::default()),
        }
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn generator(&self) -> ProjectGenerator {
        self.generator_at(&self.root)
    }

    fn generator_at(&self, root: &Path) -> ProjectGenerator {
        ProjectGenerator::new(
            ProjectId::from_path(root),
            root,
            &self.config,
            self.provider.clone(),
        )
    }
}

fn commit_all(root: &Path, message: &str) {
    let repo = Repository::open(root).unwrap();
    let sig = Signature::now("Tester", "tester@example.com").unwrap();
    let mut index = repo.index().unwrap();
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None).unwrap();
    index.update_all(["*"].iter(), None).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap();
}

const LIB: &str = "pub fn alpha() {\n    1;\n}\n\npub fn beta() {\n    2;\n}\n";
const LIB_EDITED: &str = "pub fn alpha() {\n    1;\n}\n\npub fn beta() {\n    3 + 4;\n}\n";

#[tokio::test]
async fn fresh_project_generates_everything() {
    let fx = Fixture::new();
    fx.write("src/lib.rs", LIB);
    let mut generator = fx.generator();
    let id = generator.project_id().clone();

    assert!(generator.fingerprints().has_file_changed(&id, "src/lib.rs", LIB));
    assert!(generator.detector().needs_full_regeneration());

    let report = generator.generate(GenerationRequest::default()).await.unwrap();
    assert_eq!(report.outcome, GenerationOutcome::Full);
    assert_eq!(report.files_processed, 1);
    assert_eq!(fx.provider.count(FUNCTION), 2);
    assert!(report.artifact_digest.is_some());

    let artifact = fs::read_to_string(fx.root.join(".codemap/project-structure.md")).unwrap();
    assert!(artifact.contains("### src/lib.rs"));
    assert!(artifact.contains("- `alpha`: described"));
    assert!(fx.root.join(".codemap/incremental-cache.json").exists());
    assert!(!generator.fingerprints().has_file_changed(&id, "src/lib.rs", LIB));
}

#[tokio::test]
async fn without_git_unchanged_functions_are_not_redescribed() {
    let fx = Fixture::new();
    fx.write("src/lib.rs", LIB);
    let mut generator = fx.generator();
    generator.generate(GenerationRequest::default()).await.unwrap();
    fx.provider.reset();

    let report = generator.generate(GenerationRequest::default()).await.unwrap();
    // no history to diff, so the run is a full rescan...
    assert_eq!(report.outcome, GenerationOutcome::Full);
    // ...but fingerprints keep every description
    assert_eq!(fx.provider.count(FUNCTION), 0);
    assert_eq!(report.files_reused, 1);
    assert_eq!(report.files_processed, 0);
}

#[tokio::test]
async fn git_project_reuses_then_describes_only_changed_function() {
    let fx = Fixture::new();
    Repository::init(&fx.root).unwrap();
    fx.write(".gitignore", ".codemap/\n");
    fx.write("src/lib.rs", LIB);
    commit_all(&fx.root, "init");

    let mut generator = fx.generator();
    let first = generator.generate(GenerationRequest::default()).await.unwrap();
    assert_eq!(first.outcome, GenerationOutcome::Full);
    fx.provider.reset();

    let second = generator.generate(GenerationRequest::default()).await.unwrap();
    assert_eq!(second.outcome, GenerationOutcome::Reused);
    assert_eq!(second.description_calls, 0);
    assert!(second.artifact_digest.is_none());
    assert!(fx.provider.prompts.lock().unwrap().is_empty());

    fx.write("src/lib.rs", LIB_EDITED);
    let third = generator.generate(GenerationRequest::default()).await.unwrap();
    assert_eq!(third.outcome, GenerationOutcome::Incremental);
    assert_eq!(third.files_processed, 1);
    let function_prompts = fx.provider.matching(FUNCTION);
    assert_eq!(function_prompts.len(), 1);
    assert!(function_prompts[0].contains("`beta`"));

    fx.provider.reset();
    let fourth = generator.generate(GenerationRequest::default()).await.unwrap();
    assert_eq!(fourth.outcome, GenerationOutcome::Reused);
    assert!(fx.provider.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn force_regenerates_without_new_descriptions() {
    let fx = Fixture::new();
    Repository::init(&fx.root).unwrap();
    fx.write(".gitignore", ".codemap/\n");
    fx.write("src/lib.rs", LIB);
    commit_all(&fx.root, "init");

    let mut generator = fx.generator();
    generator.generate(GenerationRequest::default()).await.unwrap();
    fx.provider.reset();

    let report = generator.generate(GenerationRequest::forced()).await.unwrap();
    assert_eq!(report.outcome, GenerationOutcome::Incremental);
    assert_eq!(fx.provider.count(FUNCTION), 0);
    assert!(report.artifact_digest.is_some());
}

#[tokio::test]
async fn missing_artifact_is_regenerated() {
    let fx = Fixture::new();
    Repository::init(&fx.root).unwrap();
    fx.write(".gitignore", ".codemap/\n");
    fx.write("src/lib.rs", LIB);
    commit_all(&fx.root, "init");

    let mut generator = fx.generator();
    generator.generate(GenerationRequest::default()).await.unwrap();
    fs::remove_file(generator.artifact_path()).unwrap();

    let report = generator.generate(GenerationRequest::default()).await.unwrap();
    assert_ne!(report.outcome, GenerationOutcome::Reused);
    assert!(generator.artifact_path().exists());
}

#[tokio::test]
async fn deleted_files_leave_inventory_and_fingerprints() {
    let fx = Fixture::new();
    fx.write("a.rs", "fn a() {}\n");
    fx.write("b.rs", "fn b() {}\n");
    let mut generator = fx.generator();
    let id = generator.project_id().clone();
    generator.generate(GenerationRequest::default()).await.unwrap();

    fs::remove_file(fx.root.join("b.rs")).unwrap();
    generator.generate(GenerationRequest::default()).await.unwrap();

    let artifact = fs::read_to_string(generator.artifact_path()).unwrap();
    assert!(artifact.contains("### a.rs"));
    assert!(!artifact.contains("### b.rs"));
    assert_eq!(generator.fingerprints().tracked_paths(&id), vec!["a.rs".to_string()]);
}

#[tokio::test]
async fn clear_cache_forgets_everything() {
    let fx = Fixture::new();
    fx.write("src/lib.rs", LIB);
    let mut generator = fx.generator();
    let id = generator.project_id().clone();
    generator.generate(GenerationRequest::default()).await.unwrap();

    generator.clear_cache().unwrap();
    assert_eq!(
        generator.fingerprints().get_cached_file_content(&id, "src/lib.rs"),
        None
    );
    assert!(generator.detector().load().is_none());

    fx.provider.reset();
    generator.generate(GenerationRequest::default()).await.unwrap();
    assert_eq!(fx.provider.count(FUNCTION), 2);
}

#[tokio::test]
async fn unchanged_packages_reuse_their_summary() {
    let fx = Fixture::new();
    Repository::init(&fx.root).unwrap();
    fx.write(".gitignore", ".codemap/\n");
    fx.write("crates/one/Cargo.toml", "[package]\nname = \"one\"\n");
    fx.write("crates/one/src/lib.rs", "pub fn one() {}\n");
    fx.write("crates/two/Cargo.toml", "[package]\nname = \"two\"\n");
    fx.write("crates/two/src/lib.rs", "pub fn two() {}\n");
    commit_all(&fx.root, "init");

    let mut generator = fx.generator();
    generator.generate(GenerationRequest::default()).await.unwrap();
    assert_eq!(fx.provider.count(PACKAGE), 2);
    fx.provider.reset();

    fx.write("crates/one/src/lib.rs", "pub fn one() { let _ = 1; }\n");
    generator.generate(GenerationRequest::default()).await.unwrap();
    let package_prompts = fx.provider.matching(PACKAGE);
    assert_eq!(package_prompts.len(), 1);
    assert!(package_prompts[0].contains("`crates/one`"));

    let artifact = fs::read_to_string(generator.artifact_path()).unwrap();
    assert!(artifact.contains("- `crates/two`"));
}

#[tokio::test]
async fn failed_descriptions_still_generate() {
    let fx = Fixture::new();
    fx.write("main.py", "def main():\n    pass\n");
    let mut generator = ProjectGenerator::new(
        ProjectId::from_path(&fx.root),
        &fx.root,
        &fx.config,
        Arc::new(NoopDescriptionProvider),
    );
    let report = generator.generate(GenerationRequest::default()).await.unwrap();
    assert_eq!(report.outcome, GenerationOutcome::Full);

    let artifact = fs::read_to_string(generator.artifact_path()).unwrap();
    assert!(artifact.contains("- `main`\n"));
}

/// Version control frozen at one commit whatever happens on disk.
struct FrozenHistory;

impl VersionControl for FrozenHistory {
    fn reference(&self) -> Option<ReferenceState> {
        Some(ReferenceState {
            token: "c1".to_string(),
            head: Some("c1".to_string()),
            dirty_paths: Vec::new(),
            ignored_paths: Vec::new(),
        })
    }

    fn changes_since(&self, _base: &str) -> anyhow::Result<Vec<PathDelta>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn force_rereads_files_history_does_not_report() {
    let fx = Fixture::new();
    fx.write("src/lib.rs", "pub fn alpha() {}\n");
    let mut generator = ProjectGenerator::with_version_control(
        ProjectId::from_path(&fx.root),
        &fx.root,
        &fx.config,
        fx.provider.clone(),
        Box::new(FrozenHistory),
    );
    generator.generate(GenerationRequest::default()).await.unwrap();

    fx.write("src/lib.rs", "pub fn gamma() {}\n");
    fx.provider.reset();
    let report = generator.generate(GenerationRequest::forced()).await.unwrap();
    assert_eq!(report.outcome, GenerationOutcome::Incremental);
    assert_eq!(report.files_processed, 1);
    let function_prompts = fx.provider.matching(FUNCTION);
    assert_eq!(function_prompts.len(), 1);
    assert!(function_prompts[0].contains("`gamma`"));

    let artifact = fs::read_to_string(generator.artifact_path()).unwrap();
    assert!(artifact.contains("- `gamma`"));
    assert!(!artifact.contains("`alpha`"));
}

#[tokio::test]
async fn subproject_follows_the_parent_gitignore() {
    let fx = Fixture::new();
    Repository::init(&fx.root).unwrap();
    fx.write(".gitignore", "*.gen.rs\n.codemap/\n");
    fx.write("app/src/lib.rs", LIB);
    fx.write("app/src/x.gen.rs", "pub fn old_name() {}\n");
    commit_all(&fx.root, "init");

    let app = fx.root.join("app");
    let mut generator = fx.generator_at(&app);
    let first = generator.generate(GenerationRequest::default()).await.unwrap();
    assert_eq!(first.outcome, GenerationOutcome::Full);
    let artifact = fs::read_to_string(generator.artifact_path()).unwrap();
    assert!(artifact.contains("### src/lib.rs"));
    assert!(!artifact.contains("x.gen.rs"));
    assert!(!artifact.contains("old_name"));

    fx.write("app/src/x.gen.rs", "pub fn renamed_function() {}\n");
    fx.write("app/src/lib.rs", LIB_EDITED);
    fx.provider.reset();
    let second = generator.generate(GenerationRequest::default()).await.unwrap();
    assert_eq!(second.outcome, GenerationOutcome::Incremental);
    assert_eq!(second.files_processed, 1);
    let function_prompts = fx.provider.matching(FUNCTION);
    assert_eq!(function_prompts.len(), 1);
    assert!(function_prompts[0].contains("`beta`"));
    let artifact = fs::read_to_string(generator.artifact_path()).unwrap();
    assert!(!artifact.contains("renamed_function"));
}

#[tokio::test]
async fn edits_to_files_only_git_ignores_are_picked_up() {
    let fx = Fixture::new();
    let repo = Repository::init(&fx.root).unwrap();
    let excludes = fx.root.parent().unwrap().join("git-excludes");
    fs::write(&excludes, "*.gen.rs\n").unwrap();
    repo.config()
        .unwrap()
        .set_str("core.excludesFile", excludes.to_str().unwrap())
        .unwrap();
    fx.write(".gitignore", ".codemap/\n");
    fx.write("src/lib.rs", LIB);
    fx.write("src/x.gen.rs", "pub fn old_name() {}\n");
    commit_all(&fx.root, "init");

    let mut generator = fx.generator();
    generator.generate(GenerationRequest::default()).await.unwrap();
    let artifact = fs::read_to_string(generator.artifact_path()).unwrap();
    assert!(artifact.contains("- `old_name`"));

    fx.write("src/x.gen.rs", "pub fn renamed_function() {}\n");
    let second = generator.generate(GenerationRequest::default()).await.unwrap();
    assert_eq!(second.outcome, GenerationOutcome::Incremental);
    let artifact = fs::read_to_string(generator.artifact_path()).unwrap();
    assert!(artifact.contains("- `renamed_function`"));
    assert!(!artifact.contains("old_name"));

    let third = generator.generate(GenerationRequest::default()).await.unwrap();
    assert_eq!(third.outcome, GenerationOutcome::Reused);

    let forced = generator.generate(GenerationRequest::forced()).await.unwrap();
    assert_eq!(forced.outcome, GenerationOutcome::Incremental);
    let artifact = fs::read_to_string(generator.artifact_path()).unwrap();
    assert!(artifact.contains("- `renamed_function`"));
}
