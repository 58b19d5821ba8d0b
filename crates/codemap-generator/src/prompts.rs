use codemap_ai::truncate_prompt;
use codemap_cache::EntityScan;

pub fn function_prompt(path: &str, name: &str, source: &str, max_chars: usize) -> String {
    let prompt = format!(
        "Describe the function `{}` from `{}` in one sentence.\n\n```\n{}\n```",
        name, path, source
    );
    truncate_prompt(&prompt, max_chars).to_string()
}

pub fn entity_prompt(
    path: &str,
    manifest: &str,
    scan: &EntityScan,
    children: &[String],
    max_chars: usize,
) -> String {
    let prompt = format!(
        "Describe the package at `{}` (manifest `{}`, {} files) in one sentence.\n\nTop-level entries:\n{}",
        path,
        manifest,
        scan.file_count,
        children.join("\n")
    );
    truncate_prompt(&prompt, max_chars).to_string()
}

pub fn directory_prompt(dir: &str, children: &[String], max_chars: usize) -> String {
    let prompt = format!(
        "Describe the purpose of the directory `{}/` in one sentence.\n\nEntries:\n{}",
        dir,
        children.join("\n")
    );
    truncate_prompt(&prompt, max_chars).to_string()
}
