pub mod change_set;
pub mod config_manager;
pub mod error;
pub mod hashing;
pub mod paths;
pub mod types;

pub use change_set::*;
pub use config_manager::*;
pub use error::*;
pub use hashing::*;
pub use paths::*;
pub use types::*;
