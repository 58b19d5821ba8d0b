// ABOUTME: Replaceable I/O and string-processing collaborators of the generation pipeline
// ABOUTME: Tree walk, markdown rendering, per-language extraction, project detection and raw fs events

pub mod detect;
pub mod extractor;
pub mod render;
pub mod walker;
pub mod watcher;

pub use detect::detect_language;
pub use extractor::{extract, Extraction, FunctionMatch};
pub use render::{render_markdown, EntityView, FileInventory, FunctionView, RenderInput};
pub use walker::{walk_project, DirNode, TreeNode, TreeStats, WalkConfig, WalkResult, WalkedFile};
pub use watcher::{ProjectWatcher, RawEvent, RawEventKind};
