// ABOUTME: Status and metrics structures for watch sessions
// ABOUTME: Counters are updated by the session task and read by the registry

use chrono::{DateTime, Utc};
use codemap_core::ProjectId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Scheduling state of one watch session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Pending,
    Regenerating,
    Stopped,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Pending => write!(f, "Pending"),
            SessionState::Regenerating => write!(f, "Regenerating"),
            SessionState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Session metrics for tracking watch activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub events_seen: u64,
    pub events_relevant: u64,
    pub regenerations: u64,
    pub regenerations_skipped: u64,
    pub failures: u64,
    pub last_generated: Option<DateTime<Utc>>,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self, relevant: bool) {
        self.events_seen += 1;
        if relevant {
            self.events_relevant += 1;
        }
    }

    pub fn record_regeneration(&mut self) {
        self.regenerations += 1;
        self.last_generated = Some(Utc::now());
    }

    pub fn record_skipped(&mut self) {
        self.regenerations_skipped += 1;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }
}

/// Point-in-time view of one registered project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub id: ProjectId,

    pub root: PathBuf,

    pub state: SessionState,

    pub auto_update: bool,

    /// Whether a file-system watcher is attached
    pub watching: bool,

    pub metrics: SessionMetrics,
}
