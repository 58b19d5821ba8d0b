// ABOUTME: Thin notify wrapper forwarding raw path events of one project root into a tokio channel
// ABOUTME: Dropping the watcher releases the OS watch descriptors for that root

use anyhow::{Context, Result};
use notify::{
    event::{AccessKind, AccessMode, ModifyKind},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    Create,
    Modify,
    Remove,
    Rename,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: RawEventKind,
    pub paths: Vec<PathBuf>,
}

impl RawEvent {
    pub fn new(kind: RawEventKind, paths: Vec<PathBuf>) -> Self {
        Self { kind, paths }
    }

    /// Maps a notify event; read-only accesses and metadata noise return `None`.
    pub fn from_notify(event: Event) -> Option<Self> {
        let kind = match event.kind {
            EventKind::Create(_) => RawEventKind::Create,
            EventKind::Remove(_) => RawEventKind::Remove,
            EventKind::Modify(ModifyKind::Name(_)) => RawEventKind::Rename,
            EventKind::Modify(ModifyKind::Metadata(_)) => return None,
            EventKind::Modify(_) => RawEventKind::Modify,
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => RawEventKind::Modify,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => return None,
        };
        if event.paths.is_empty() {
            return None;
        }
        Some(Self::new(kind, event.paths))
    }
}

/// Recursive file-system observation of one project root.
pub struct ProjectWatcher {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
}

impl ProjectWatcher {
    /// Starts observing `root`. Fails when the root does not exist or the
    /// platform watcher cannot be created.
    pub fn start(root: &Path, sender: UnboundedSender<RawEvent>) -> Result<Self> {
        let root = root.to_path_buf();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    if let Some(raw) = RawEvent::from_notify(event) {
                        // The receiver is gone once the session shut down.
                        if sender.send(raw).is_err() {
                            debug!("Dropping event for closed session");
                        }
                    }
                }
                Err(e) => warn!("File watcher error: {}", e),
            }
        })
        .context("failed to create file system watcher")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", root.display()))?;
        info!("Watching {:?}", root);

        Ok(Self {
            root,
            watcher: Some(watcher),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    /// Closes the observation handle. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.root) {
                debug!("Unwatch of {:?} failed: {}", self.root, e);
            }
            info!("Stopped watching {:?}", self.root);
        }
    }
}

impl Drop for ProjectWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
