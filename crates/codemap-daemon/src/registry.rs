// ABOUTME: Owns every watch session of the process, keyed by project id
// ABOUTME: Adding, removing and toggling projects goes through here

use crate::config::WatchConfig;
use crate::regenerator::{generator_factory, RegeneratorFactory};
use crate::session::WatchSession;
use crate::status::ProjectStatus;
use codemap_core::{CodeMapConfig, ProjectId};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// How long `stop_all` waits for in-flight regenerations.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub struct ProjectRegistry {
    config: CodeMapConfig,
    factory: RegeneratorFactory,
    sessions: BTreeMap<ProjectId, WatchSession>,
    detached: bool,
}

impl ProjectRegistry {
    pub fn new(config: CodeMapConfig) -> Self {
        Self::with_factory(config, generator_factory())
    }

    pub fn with_factory(config: CodeMapConfig, factory: RegeneratorFactory) -> Self {
        Self {
            config,
            factory,
            sessions: BTreeMap::new(),
            detached: false,
        }
    }

    /// Sessions added from now on get no file-system watcher.
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    pub fn config(&self) -> &CodeMapConfig {
        &self.config
    }

    /// Registers a project and starts its session. The id defaults to the
    /// directory's basename; registering an id twice returns the existing
    /// session's id. A missing path still registers a session, which simply
    /// never fires.
    pub fn add_project(&mut self, path: &Path, id: Option<ProjectId>) -> ProjectId {
        let root = absolute_root(path);
        let id = id.unwrap_or_else(|| ProjectId::from_path(&root));

        if let Some(existing) = self.sessions.get(&id) {
            if existing.root() != root {
                warn!(
                    target: "codemap::daemon",
                    project = %id,
                    "Id already registered for {}; ignoring {}",
                    existing.root().display(),
                    root.display()
                );
            } else {
                info!(target: "codemap::daemon", project = %id, "Already registered");
            }
            return id;
        }

        let watch = WatchConfig::for_project(id.clone(), root.clone(), &self.config);
        if root.is_dir() {
            if let Err(e) = fs::create_dir_all(&watch.output_dir) {
                warn!(
                    target: "codemap::daemon",
                    project = %id,
                    "Cannot create output directory {}: {}",
                    watch.output_dir.display(),
                    e
                );
            }
        } else {
            warn!(
                target: "codemap::daemon",
                project = %id,
                "Project path {} does not exist; session will stay idle",
                root.display()
            );
        }

        let regenerator = (self.factory)(&id, &root, &self.config);
        let session = if self.detached || !root.is_dir() {
            WatchSession::start_detached(watch, regenerator)
        } else {
            WatchSession::start(watch, regenerator)
        };
        self.sessions.insert(id.clone(), session);
        info!(target: "codemap::daemon", project = %id, "Project registered");
        id
    }

    /// Stops and forgets a session; unknown ids are a no-op.
    pub fn remove_project(&mut self, id: &ProjectId) -> bool {
        match self.sessions.remove(id) {
            Some(mut session) => {
                session.stop();
                info!(target: "codemap::daemon", project = %id, "Project removed");
                true
            }
            None => false,
        }
    }

    pub fn set_auto_update(&mut self, id: &ProjectId, enabled: bool) -> bool {
        match self.sessions.get(id) {
            Some(session) => {
                session.set_auto_update(enabled);
                true
            }
            None => false,
        }
    }

    /// Schedules one regeneration of every registered project.
    pub fn request_regeneration_all(&self) {
        for session in self.sessions.values() {
            session.request_regeneration();
        }
    }

    pub fn session(&self, id: &ProjectId) -> Option<&WatchSession> {
        self.sessions.get(id)
    }

    pub fn list(&self) -> Vec<ProjectId> {
        self.sessions.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn status(&self) -> Vec<ProjectStatus> {
        self.sessions.values().map(WatchSession::status).collect()
    }

    /// Stops every session, waiting for running regenerations to finish.
    pub async fn stop_all(&mut self) {
        let sessions = std::mem::take(&mut self.sessions);
        for session in sessions.values() {
            info!(target: "codemap::daemon", project = %session.project_id(), "Stopping");
        }
        for (_, mut session) in sessions {
            session.shutdown(SHUTDOWN_GRACE).await;
        }
    }
}

fn absolute_root(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
