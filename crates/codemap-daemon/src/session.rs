// ABOUTME: One watch session per project: raw events in, debounced regenerations out
// ABOUTME: The session task owns the timer and the regenerator; the handle only signals and reads

use crate::config::WatchConfig;
use crate::debounce::DebounceTimer;
use crate::regenerator::Regenerator;
use crate::relevance::RelevanceFilter;
use crate::status::{ProjectStatus, SessionMetrics, SessionState};
use codemap_core::ProjectId;
use codemap_generator::{GenerationReport, GenerationRequest};
use codemap_parser::{ProjectWatcher, RawEvent};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

type Outcome = std::thread::Result<anyhow::Result<GenerationReport>>;

#[derive(Debug, Default)]
struct Shared {
    state: Option<SessionState>,
    metrics: SessionMetrics,
}

/// Handle to a running watch session.
pub struct WatchSession {
    project_id: ProjectId,
    root: PathBuf,
    auto_update: Arc<AtomicBool>,
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedSender<RawEvent>,
    requested: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    watcher: Option<ProjectWatcher>,
}

impl WatchSession {
    /// Spawns the session task and attaches a file-system watcher to the
    /// project root. A root that cannot be watched leaves a session that
    /// never fires on its own.
    pub fn start(config: WatchConfig, regenerator: Box<dyn Regenerator>) -> Self {
        let mut session = Self::start_detached(config, regenerator);
        match ProjectWatcher::start(&session.root, session.events.clone()) {
            Ok(watcher) => session.watcher = Some(watcher),
            Err(e) => warn!(
                target: "codemap::daemon",
                project = %session.project_id,
                "Cannot watch {}: {:#}",
                session.root.display(),
                e
            ),
        }
        session
    }

    /// Spawns the session task without a file-system watcher; events only
    /// arrive through [`WatchSession::notify`].
    pub fn start_detached(config: WatchConfig, regenerator: Box<dyn Regenerator>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let auto_update = Arc::new(AtomicBool::new(config.auto_update));
        let requested = Arc::new(Notify::new());
        let shared = Arc::new(Mutex::new(Shared {
            state: Some(SessionState::Idle),
            metrics: SessionMetrics::new(),
        }));

        let project_id = config.project_id.clone();
        let root = config.project_root.clone();
        let worker = SessionLoop {
            filter: RelevanceFilter::new(
                config.project_root.clone(),
                config.output_dir.clone(),
                config.artifact_path.clone(),
            ),
            debounce: config.debounce(),
            min_interval: config.min_interval(),
            project_id: config.project_id,
            regenerator,
            auto_update: auto_update.clone(),
            requested: requested.clone(),
            shared: shared.clone(),
            timer: DebounceTimer::new(),
            dirty: BTreeSet::new(),
            artifact_edited: false,
            last_run: None,
        };
        let task = tokio::spawn(worker.run(event_rx, shutdown_rx));

        info!(
            target: "codemap::daemon",
            project = %project_id,
            "Watch session started for {}",
            root.display()
        );

        Self {
            project_id,
            root,
            auto_update,
            shared,
            events: event_tx,
            requested,
            shutdown: shutdown_tx,
            task: Some(task),
            watcher: None,
        }
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().map(|w| w.is_active()).unwrap_or(false)
    }

    /// Feeds an event into the session as if the watcher had reported it.
    pub fn notify(&self, event: RawEvent) {
        if self.events.send(event).is_err() {
            debug!(target: "codemap::daemon", project = %self.project_id, "Session no longer running");
        }
    }

    /// Schedules a regeneration without waiting for a file-system event,
    /// for example to catch up on edits made while nothing was watching.
    /// The minimum interval and the auto-update switch still apply.
    pub fn request_regeneration(&self) {
        self.requested.notify_one();
    }

    pub fn auto_update(&self) -> bool {
        self.auto_update.load(Ordering::SeqCst)
    }

    /// Gates reaction only; events keep being observed and counted.
    pub fn set_auto_update(&self, enabled: bool) {
        self.auto_update.store(enabled, Ordering::SeqCst);
        info!(
            target: "codemap::daemon",
            project = %self.project_id,
            "Auto-update {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state.unwrap_or(SessionState::Stopped)
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.shared.lock().metrics.clone()
    }

    pub fn status(&self) -> ProjectStatus {
        let shared = self.shared.lock();
        ProjectStatus {
            id: self.project_id.clone(),
            root: self.root.clone(),
            state: shared.state.unwrap_or(SessionState::Stopped),
            auto_update: self.auto_update(),
            watching: self.is_watching(),
            metrics: shared.metrics.clone(),
        }
    }

    /// Releases the watcher and cancels any pending timer. A regeneration
    /// already running finishes, but its result is discarded.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        if self.shutdown.send(true).is_err() {
            debug!(target: "codemap::daemon", project = %self.project_id, "Session task already gone");
        }
    }

    /// Stops the session and waits up to `grace` for its task to exit.
    pub async fn shutdown(&mut self, grace: Duration) {
        self.stop();
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(grace, task).await.is_err() {
                warn!(
                    target: "codemap::daemon",
                    project = %self.project_id,
                    "Regeneration still running after {:?}; abandoning it",
                    grace
                );
            }
        }
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.stop();
    }
}

struct SessionLoop {
    project_id: ProjectId,
    filter: RelevanceFilter,
    debounce: Duration,
    min_interval: Duration,
    regenerator: Box<dyn Regenerator>,
    auto_update: Arc<AtomicBool>,
    requested: Arc<Notify>,
    shared: Arc<Mutex<Shared>>,
    timer: DebounceTimer,
    dirty: BTreeSet<String>,
    artifact_edited: bool,
    last_run: Option<Instant>,
}

impl SessionLoop {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<RawEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => break,

                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },

                _ = self.requested.notified() => self.schedule_now(),

                _ = self.timer.fired() => {
                    if self.deferred_by_min_interval() {
                        continue;
                    }
                    let Some(outcome) = self.regenerate().await else {
                        continue;
                    };
                    if *shutdown.borrow() {
                        debug!(
                            target: "codemap::daemon",
                            project = %self.project_id,
                            "Session stopped during regeneration; result discarded"
                        );
                        break;
                    }
                    self.record_outcome(outcome);
                }
            }
        }

        self.timer.cancel();
        self.shared.lock().state = None;
        info!(target: "codemap::daemon", project = %self.project_id, "Watch session stopped");
    }

    fn handle_event(&mut self, event: RawEvent) {
        let (keys, artifact) = self.filter.relevant_paths(&event);
        let relevant = artifact || !keys.is_empty();
        {
            let mut shared = self.shared.lock();
            shared.metrics.record_event(relevant);
            if relevant && shared.state == Some(SessionState::Idle) {
                shared.state = Some(SessionState::Pending);
            }
        }
        if !relevant {
            return;
        }

        debug!(
            target: "codemap::daemon",
            project = %self.project_id,
            "Relevant {:?} event: {:?}",
            event.kind,
            keys
        );
        self.dirty.extend(keys);
        self.artifact_edited |= artifact;
        self.timer.reset(self.debounce);
    }

    fn schedule_now(&mut self) {
        debug!(target: "codemap::daemon", project = %self.project_id, "Regeneration requested");
        {
            let mut shared = self.shared.lock();
            if shared.state == Some(SessionState::Idle) {
                shared.state = Some(SessionState::Pending);
            }
        }
        self.timer.reset(Duration::ZERO);
    }

    /// Pushes the deadline out when the previous run finished less than
    /// `min_interval` ago.
    fn deferred_by_min_interval(&mut self) -> bool {
        let Some(last) = self.last_run else {
            return false;
        };
        let since = last.elapsed();
        if since >= self.min_interval {
            return false;
        }
        let remaining = self.min_interval - since;
        debug!(
            target: "codemap::daemon",
            project = %self.project_id,
            "Regeneration deferred by {:?}",
            remaining
        );
        self.timer.reset(remaining);
        true
    }

    /// Runs one regeneration unless auto-update is off, in which case the
    /// accumulated changes are dropped and `None` is returned.
    async fn regenerate(&mut self) -> Option<Outcome> {
        let request = GenerationRequest {
            force: std::mem::take(&mut self.artifact_edited),
            dirty_paths: std::mem::take(&mut self.dirty),
        };

        if !self.auto_update.load(Ordering::SeqCst) {
            let mut shared = self.shared.lock();
            shared.metrics.record_skipped();
            shared.state = Some(SessionState::Idle);
            debug!(target: "codemap::daemon", project = %self.project_id, "Auto-update off; skipping");
            return None;
        }

        self.shared.lock().state = Some(SessionState::Regenerating);
        info!(
            target: "codemap::daemon",
            project = %self.project_id,
            "Regenerating ({} changed paths{})",
            request.dirty_paths.len(),
            if request.force { ", artifact edited" } else { "" }
        );

        let outcome = AssertUnwindSafe(self.regenerator.regenerate(request))
            .catch_unwind()
            .await;
        self.last_run = Some(Instant::now());
        Some(outcome)
    }

    fn record_outcome(&mut self, outcome: Outcome) {
        let mut shared = self.shared.lock();
        match outcome {
            Ok(Ok(report)) => {
                if let Some(digest) = report.artifact_digest.clone() {
                    self.filter.record_write(digest);
                }
                shared.metrics.record_regeneration();
                info!(
                    target: "codemap::daemon",
                    project = %self.project_id,
                    outcome = ?report.outcome,
                    files = report.files_processed,
                    reused = report.files_reused,
                    "Regenerated in {:?}",
                    report.duration
                );
            }
            Ok(Err(e)) => {
                shared.metrics.record_failure();
                error!(target: "codemap::daemon", project = %self.project_id, "Regeneration failed: {:#}", e);
            }
            Err(_) => {
                shared.metrics.record_failure();
                error!(target: "codemap::daemon", project = %self.project_id, "Regeneration panicked");
            }
        }
        shared.state = Some(if self.timer.is_pending() {
            SessionState::Pending
        } else {
            SessionState::Idle
        });
    }
}
