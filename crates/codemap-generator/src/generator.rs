use crate::entities::{child_listing, find_entities};
use crate::prompts::{directory_prompt, entity_prompt, function_prompt};
use anyhow::{Context, Result};
use chrono::Utc;
use codemap_ai::DescriptionProvider;
use codemap_cache::{
    ChangeDetector, FingerprintStore, GitVersionControl, GroupedEntity, ProjectSnapshot,
    SnapshotCache, SnapshotStats, SnapshotUpdate, VersionControl,
};
use codemap_core::{content_digest, ChangeSet, CodeMapConfig, Language, OutputConfig, ProjectId};
use codemap_parser::{
    detect_language, extract, render_markdown, walk_project, EntityView, FileInventory,
    FunctionView, RenderInput, TreeStats, WalkConfig, WalkResult, WalkedFile,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Regenerate even when nothing changed since the last snapshot, and
    /// reread every file instead of trusting cached content.
    pub force: bool,
    /// Project-relative paths reported by file-system events.
    pub dirty_paths: BTreeSet<String>,
}

impl GenerationRequest {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    Full,
    Incremental,
    Reused,
}

#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub outcome: GenerationOutcome,
    pub files_processed: usize,
    pub files_reused: usize,
    pub description_calls: usize,
    pub duration: Duration,
    pub artifact: PathBuf,
    /// Digest of the artifact as written, `None` when it was reused.
    pub artifact_digest: Option<String>,
}

/// Runs the generation pipeline for one project. Owns that project's
/// fingerprint store and snapshot cache exclusively.
pub struct ProjectGenerator {
    project_id: ProjectId,
    root: PathBuf,
    output: OutputConfig,
    max_chars: usize,
    language: Language,
    fingerprints: FingerprintStore,
    detector: ChangeDetector,
    describer: Arc<dyn DescriptionProvider>,
}

impl ProjectGenerator {
    pub fn new(
        project_id: ProjectId,
        root: impl Into<PathBuf>,
        config: &CodeMapConfig,
        describer: Arc<dyn DescriptionProvider>,
    ) -> Self {
        let root = root.into();
        let vcs = GitVersionControl::new(&root).with_excluded_dirs(output_dir_names(&config.output));
        Self::with_version_control(project_id, root, config, describer, Box::new(vcs))
    }

    pub fn with_version_control(
        project_id: ProjectId,
        root: impl Into<PathBuf>,
        config: &CodeMapConfig,
        describer: Arc<dyn DescriptionProvider>,
        vcs: Box<dyn VersionControl>,
    ) -> Self {
        let root = root.into();
        let snapshot_path = config
            .output
            .output_dir(&root)
            .join(&config.cache.snapshot_file);
        let cache = SnapshotCache::new(project_id.clone(), snapshot_path);
        let language = detect_language(&root);
        debug!(project = %project_id, "Detected language {}", language);

        let mut fingerprints = FingerprintStore::new(&config.cache.directory);
        fingerprints.load(&project_id);

        Self {
            project_id,
            root,
            output: config.output.clone(),
            max_chars: config.description.max_chars,
            language,
            fingerprints,
            detector: ChangeDetector::new(cache, vcs),
            describer,
        }
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.output.artifact_path(&self.root)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output.output_dir(&self.root)
    }

    pub fn fingerprints(&mut self) -> &mut FingerprintStore {
        &mut self.fingerprints
    }

    pub fn detector(&mut self) -> &mut ChangeDetector {
        &mut self.detector
    }

    /// Drops the fingerprint table and the snapshot for this project.
    pub fn clear_cache(&mut self) -> Result<()> {
        self.fingerprints
            .clear(&self.project_id)
            .context("failed to clear fingerprint cache")?;
        self.detector
            .clear()
            .context("failed to clear snapshot cache")?;
        Ok(())
    }

    pub async fn generate(&mut self, request: GenerationRequest) -> Result<GenerationReport> {
        let started = Instant::now();
        let artifact = self.artifact_path();

        let previous = self.detector.load();
        let mut changes = self.detector.detect_changes();
        changes.merge_dirty(request.dirty_paths.iter().cloned());

        if changes.is_unchanged() && !request.force && artifact.is_file() {
            info!(project = %self.project_id, "Nothing changed; reusing {}", artifact.display());
            return Ok(GenerationReport {
                outcome: GenerationOutcome::Reused,
                files_processed: 0,
                files_reused: 0,
                description_calls: 0,
                duration: started.elapsed(),
                artifact,
                artifact_digest: None,
            });
        }

        let outcome = if changes.is_full_rescan() || previous.is_none() {
            GenerationOutcome::Full
        } else {
            GenerationOutcome::Incremental
        };
        info!(
            project = %self.project_id,
            "Generating ({:?}, {} changed paths)",
            outcome,
            changes.total_changed()
        );

        let walk_config = WalkConfig {
            max_depth: self.output.max_depth,
            extra_excludes: output_dir_names(&self.output),
            respect_gitignore: true,
        };
        let walk = walk_project(&self.root, &walk_config)
            .with_context(|| format!("failed to walk {}", self.root.display()))?;

        let reuse = ContentReuse {
            changes: &changes,
            force: request.force,
            ignored: self.detector.ignored_paths().iter().cloned().collect(),
        };
        let mut counters = Counters::default();
        let inventory = self.build_inventory(&walk, &reuse, &mut counters).await;
        let entities = self
            .build_entities(&walk, previous.as_ref(), &mut counters)
            .await;
        let path_descriptions = self
            .build_path_descriptions(&walk, previous.as_ref(), &changes, &mut counters)
            .await;

        let entity_views: Vec<EntityView> = entities
            .iter()
            .map(|(key, entity)| EntityView {
                path: key.clone(),
                file_count: entity.count,
                size: entity.size,
                description: entity.description.clone(),
            })
            .collect();
        let markdown = render_markdown(&RenderInput {
            project_name: self.project_id.as_str(),
            language: self.language,
            generated_at: Utc::now(),
            tree: &walk.tree,
            stats: &walk.stats,
            entities: &entity_views,
            path_descriptions: &path_descriptions,
            inventory: &inventory,
        });

        let output_dir = self.output_dir();
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        fs::write(&artifact, &markdown)
            .with_context(|| format!("failed to write {}", artifact.display()))?;

        self.detector
            .update(SnapshotUpdate {
                stats: Some(snapshot_stats(&walk.stats)),
                grouped_entities: Some(entities),
                path_descriptions: Some(path_descriptions),
            })
            .context("failed to write snapshot")?;

        let report = GenerationReport {
            outcome,
            files_processed: counters.files_processed,
            files_reused: counters.files_reused,
            description_calls: counters.description_calls,
            duration: started.elapsed(),
            artifact,
            artifact_digest: Some(content_digest(&markdown)),
        };
        info!(
            project = %self.project_id,
            "Generated {} ({} processed, {} reused, {} descriptions) in {:?}",
            report.artifact.display(),
            report.files_processed,
            report.files_reused,
            report.description_calls,
            report.duration
        );
        Ok(report)
    }

    async fn build_inventory(
        &mut self,
        walk: &WalkResult,
        reuse: &ContentReuse<'_>,
        counters: &mut Counters,
    ) -> Vec<FileInventory> {
        let candidates: Vec<&WalkedFile> = walk
            .source_files()
            .filter(|f| !reuse.changes.is_deleted(&f.key))
            .take(self.output.max_inventory_files)
            .collect();
        if walk.source_files().count() > candidates.len() {
            warn!(
                project = %self.project_id,
                "Inventory capped at {} files",
                self.output.max_inventory_files
            );
        }

        let mut inventory = Vec::with_capacity(candidates.len());
        for file in &candidates {
            if let Some(entry) = self.inventory_file(file, reuse, counters).await {
                inventory.push(entry);
            }
        }

        let kept: HashSet<&str> = candidates.iter().map(|f| f.key.as_str()).collect();
        for stale in self.fingerprints.tracked_paths(&self.project_id) {
            if !kept.contains(stale.as_str()) {
                if let Err(e) = self.fingerprints.remove_file(&self.project_id, &stale) {
                    warn!(path = %stale, "Failed to drop fingerprint: {}", e);
                }
            }
        }
        inventory
    }

    async fn inventory_file(
        &mut self,
        file: &WalkedFile,
        reuse: &ContentReuse<'_>,
        counters: &mut Counters,
    ) -> Option<FileInventory> {
        let language = file.language?;
        let id = self.project_id.clone();
        let cached = self.fingerprints.get_cached_file_content(&id, &file.key);

        let content = match cached {
            Some(content) if reuse.trusts_cache(&file.key) => {
                counters.files_reused += 1;
                content
            }
            _ => match fs::read_to_string(&file.path) {
                Ok(content) => {
                    if self.fingerprints.has_file_changed(&id, &file.key, &content) {
                        counters.files_processed += 1;
                    } else {
                        counters.files_reused += 1;
                    }
                    content
                }
                Err(e) => {
                    warn!(path = %file.path.display(), "Skipping unreadable file: {}", e);
                    return None;
                }
            },
        };

        let extraction = extract(&content, language);
        let mut functions = Vec::with_capacity(extraction.functions.len());
        for function in &extraction.functions {
            let changed = self.fingerprints.has_function_changed(
                &id,
                &file.key,
                &function.name,
                &function.text,
            );
            let description = if changed {
                let prompt =
                    function_prompt(&file.key, &function.name, &function.text, self.max_chars);
                let description = self.describer.describe(&prompt).await;
                counters.description_calls += 1;
                if let Err(e) = self.fingerprints.update_function(
                    &id,
                    &file.key,
                    &function.name,
                    &function.text,
                    &description,
                ) {
                    warn!(path = %file.key, "Failed to persist function fingerprint: {}", e);
                }
                description
            } else {
                self.fingerprints
                    .get_cached_function_description(&id, &file.key, &function.name)
                    .unwrap_or_default()
            };
            functions.push(FunctionView {
                name: function.name.clone(),
                description,
            });
        }

        let names: Vec<&str> = extraction.functions.iter().map(|f| f.name.as_str()).collect();
        if let Err(e) = self.fingerprints.retain_functions(&id, &file.key, &names) {
            warn!(path = %file.key, "Failed to prune function fingerprints: {}", e);
        }
        if self.fingerprints.has_file_changed(&id, &file.key, &content) {
            if let Err(e) = self.fingerprints.update_file(&id, &file.key, &content) {
                warn!(path = %file.key, "Failed to persist file fingerprint: {}", e);
            }
        }

        Some(FileInventory {
            path: file.key.clone(),
            functions,
            imports: extraction.imports,
        })
    }

    async fn build_entities(
        &mut self,
        walk: &WalkResult,
        previous: Option<&ProjectSnapshot>,
        counters: &mut Counters,
    ) -> BTreeMap<String, GroupedEntity> {
        let excluded = output_dir_names(&self.output);
        let mut entities = BTreeMap::new();
        for candidate in find_entities(&self.root, &walk.tree) {
            let dir = if candidate.key == "." {
                self.root.clone()
            } else {
                self.root.join(&candidate.key)
            };
            let scan = self.detector.entity_hash(&dir, &excluded);
            let cached = previous.and_then(|s| s.grouped_entities.get(&candidate.key));

            let entity = match cached {
                Some(cached) if cached.hash == scan.hash => {
                    debug!(entity = %candidate.key, "Reusing cached entity summary");
                    cached.clone()
                }
                _ => {
                    let children = child_listing(&walk.tree, &candidate.key);
                    let prompt = entity_prompt(
                        &candidate.key,
                        candidate.manifest,
                        &scan,
                        &children,
                        self.max_chars,
                    );
                    let description = self.describer.describe(&prompt).await;
                    counters.description_calls += 1;
                    GroupedEntity {
                        count: scan.file_count,
                        size: scan.size,
                        hash: scan.hash,
                        description,
                    }
                }
            };
            entities.insert(candidate.key, entity);
        }
        entities
    }

    async fn build_path_descriptions(
        &mut self,
        walk: &WalkResult,
        previous: Option<&ProjectSnapshot>,
        changes: &ChangeSet,
        counters: &mut Counters,
    ) -> BTreeMap<String, String> {
        let mut descriptions = BTreeMap::new();
        for dir in walk.tree.subdirectories() {
            let cached = previous.and_then(|s| s.path_descriptions.get(dir));
            let description = match cached {
                Some(text) if !ChangeDetector::directory_has_changes(dir, changes) => text.clone(),
                _ => {
                    let children = child_listing(&walk.tree, dir);
                    let prompt = directory_prompt(dir, &children, self.max_chars);
                    counters.description_calls += 1;
                    self.describer.describe(&prompt).await
                }
            };
            descriptions.insert(dir.to_string(), description);
        }
        descriptions
    }
}

/// When cached file content may stand in for reading the file.
struct ContentReuse<'a> {
    changes: &'a ChangeSet,
    force: bool,
    /// Files git ignores; no history vouches for them.
    ignored: HashSet<String>,
}

impl ContentReuse<'_> {
    fn trusts_cache(&self, key: &str) -> bool {
        !self.force && !self.ignored.contains(key) && !self.changes.may_have_changed(key)
    }
}

#[derive(Default)]
struct Counters {
    files_processed: usize,
    files_reused: usize,
    description_calls: usize,
}

/// First component of the configured output directory, when it lies inside
/// the project.
fn output_dir_names(output: &OutputConfig) -> Vec<String> {
    if output.directory.is_absolute() {
        return Vec::new();
    }
    output
        .directory
        .components()
        .find_map(|c| match c {
            std::path::Component::Normal(name) => Some(name.to_string_lossy().to_string()),
            _ => None,
        })
        .into_iter()
        .collect()
}

fn snapshot_stats(stats: &TreeStats) -> SnapshotStats {
    SnapshotStats {
        file_count: stats.file_count,
        directory_count: stats.directory_count,
        total_size: stats.total_size,
        lines_by_extension: stats.lines_by_extension.clone(),
    }
}
