//! CodeMap Git integration: head tracking, working-tree dirtiness and
//! classified path deltas using libgit2.
//!
//! Every call opens its own view of the repository, so callers can hold a
//! `GitRepository` only for the duration of one detection pass.

pub mod errors;
pub mod repo;
pub mod types;

pub use errors::{GitIntegrationError, Result};
pub use repo::GitRepository;
pub use types::*;
