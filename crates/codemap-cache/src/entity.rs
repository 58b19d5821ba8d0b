use codemap_core::{is_ignored_name, FieldDigest};
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::warn;

/// Result of hashing a directory subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityScan {
    pub hash: String,
    pub file_count: usize,
    pub size: u64,
}

/// Name, size and mtime digest over the subtree at `path`.
///
/// This is a heuristic: a rewrite that keeps both byte count and mtime
/// (same-second edits on coarse filesystems) is not detected.
pub fn entity_hash(path: &Path) -> String {
    scan_entity(path, &[]).hash
}

/// Walks the subtree at `path` in name order, skipping ignored directory
/// names and `excluded` names, and returns its digest with file count and
/// total size. Unreadable entries are logged and left out.
pub fn scan_entity(path: &Path, excluded: &[String]) -> EntityScan {
    let mut digest = FieldDigest::new();
    let mut file_count = 0;
    let mut size = 0;
    visit(path, "", excluded, &mut digest, &mut file_count, &mut size);
    EntityScan {
        hash: digest.finish(),
        file_count,
        size,
    }
}

fn visit(
    dir: &Path,
    rel: &str,
    excluded: &[String],
    digest: &mut FieldDigest,
    file_count: &mut usize,
    size: &mut u64,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Skipping unreadable directory {:?}: {}", dir, e);
            return;
        }
    };
    let mut entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Skipping {:?}: {}", entry.path(), e);
                continue;
            }
        };
        let child_rel = if rel.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", rel, name)
        };

        if meta.is_dir() {
            if is_ignored_name(&name) || excluded.iter().any(|x| *x == name) {
                continue;
            }
            digest.field(format!("d:{}", child_rel));
            visit(&entry.path(), &child_rel, excluded, digest, file_count, size);
            continue;
        }

        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        digest
            .field(format!("f:{}", child_rel))
            .field(meta.len().to_le_bytes())
            .field(mtime.to_le_bytes());
        *file_count += 1;
        *size += meta.len();
    }
}
