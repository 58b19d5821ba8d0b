use codemap_core::{is_ignored_name, Language};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Detects the primary language of the project at `root`.
///
/// A manifest in the root decides first, in table order. Without one, the
/// most common source extension among the root and its immediate
/// subdirectories wins; ties resolve in table order.
pub fn detect_language(root: &Path) -> Language {
    for lang in Language::known() {
        if let Some(manifest) = lang.manifest() {
            if root.join(manifest).is_file() {
                debug!("Detected {} via {}", lang, manifest);
                return lang;
            }
        }
    }

    let mut counts: HashMap<Language, usize> = HashMap::new();
    count_sources(root, 1, &mut counts);
    Language::known()
        .filter_map(|lang| counts.get(&lang).map(|n| (lang, *n)))
        .fold(None, |best: Option<(Language, usize)>, (lang, n)| match best {
            Some((_, top)) if top >= n => best,
            _ => Some((lang, n)),
        })
        .map(|(lang, _)| lang)
        .unwrap_or(Language::Unknown)
}

fn count_sources(dir: &Path, depth_left: usize, counts: &mut HashMap<Language, usize>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            let name = entry.file_name();
            let skip = name.to_str().map(is_ignored_name).unwrap_or(true);
            if depth_left > 0 && !skip {
                count_sources(&path, depth_left - 1, counts);
            }
        } else if let Some(lang) = Language::from_path(&path) {
            *counts.entry(lang).or_default() += 1;
        }
    }
}
