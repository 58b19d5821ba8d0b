use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeltaKind {
    Added,
    Modified,
    Deleted,
}

/// One touched path, relative to the repository work directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDelta {
    pub path: String,
    pub kind: DeltaKind,
}

impl PathDelta {
    pub fn new(path: impl Into<String>, kind: DeltaKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}
