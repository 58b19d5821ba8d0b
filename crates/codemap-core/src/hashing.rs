use sha2::{Digest, Sha256};

/// Hex digest used purely as a staleness signal.
pub fn content_digest(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    format!("{:x}", hasher.finalize())
}

/// Incremental digest over a sequence of fields. Each field is length
/// prefixed so `("ab", "c")` and `("a", "bc")` differ.
#[derive(Default)]
pub struct FieldDigest {
    hasher: Sha256,
}

impl FieldDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        let data = data.as_ref();
        self.hasher.update((data.len() as u64).to_le_bytes());
        self.hasher.update(data);
        self
    }

    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}
