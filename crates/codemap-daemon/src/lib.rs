// ABOUTME: Update scheduling for watched projects: one debounced session per project
// ABOUTME: The registry owns the sessions; the project list persists what the CLI registered

pub mod config;
pub mod debounce;
pub mod projects;
pub mod regenerator;
pub mod registry;
pub mod relevance;
pub mod session;
pub mod status;

pub use config::WatchConfig;
pub use debounce::DebounceTimer;
pub use projects::{ProjectEntry, ProjectList};
pub use regenerator::{generator_factory, Regenerator, RegeneratorFactory};
pub use registry::ProjectRegistry;
pub use relevance::{Relevance, RelevanceFilter};
pub use session::WatchSession;
pub use status::{ProjectStatus, SessionMetrics, SessionState};
