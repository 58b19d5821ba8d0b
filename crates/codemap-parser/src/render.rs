use crate::walker::{DirNode, TreeNode, TreeStats};
use chrono::{DateTime, Utc};
use codemap_core::Language;
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionView {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInventory {
    pub path: String,
    pub functions: Vec<FunctionView>,
    pub imports: Vec<String>,
}

/// A grouped entity (sub-application or sub-package) as shown in the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityView {
    pub path: String,
    pub file_count: usize,
    pub size: u64,
    pub description: String,
}

pub struct RenderInput<'a> {
    pub project_name: &'a str,
    pub language: Language,
    pub generated_at: DateTime<Utc>,
    pub tree: &'a DirNode,
    pub stats: &'a TreeStats,
    pub entities: &'a [EntityView],
    pub path_descriptions: &'a BTreeMap<String, String>,
    pub inventory: &'a [FileInventory],
}

pub fn render_markdown(input: &RenderInput<'_>) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_document(&mut out, input);
    out
}

fn write_document(out: &mut String, input: &RenderInput<'_>) -> std::fmt::Result {
    writeln!(out, "# Project Structure: {}", input.project_name)?;
    writeln!(out)?;
    writeln!(out, "- Language: {}", input.language)?;
    writeln!(
        out,
        "- Generated: {}",
        input.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(
        out,
        "- Files: {} in {} directories ({})",
        input.stats.file_count,
        input.stats.directory_count,
        human_size(input.stats.total_size)
    )?;
    writeln!(out)?;

    writeln!(out, "## Directory Tree")?;
    writeln!(out)?;
    writeln!(out, "```")?;
    writeln!(out, "{}/", input.project_name)?;
    write_tree(out, input.tree, "")?;
    writeln!(out, "```")?;
    writeln!(out)?;

    if !input.path_descriptions.is_empty() {
        writeln!(out, "## Directories")?;
        writeln!(out)?;
        for (path, description) in input.path_descriptions {
            if description.is_empty() {
                writeln!(out, "- `{}/`", path)?;
            } else {
                writeln!(out, "- `{}/`: {}", path, one_line(description))?;
            }
        }
        writeln!(out)?;
    }

    if !input.stats.files_by_extension.is_empty() {
        writeln!(out, "## Statistics")?;
        writeln!(out)?;
        writeln!(out, "| Extension | Files | Lines |")?;
        writeln!(out, "|---|---:|---:|")?;
        for (ext, files) in &input.stats.files_by_extension {
            let label = if ext.is_empty() { "(none)" } else { ext.as_str() };
            let lines = input
                .stats
                .lines_by_extension
                .get(ext)
                .map(|l| l.to_string())
                .unwrap_or_else(|| "-".to_string());
            writeln!(out, "| {} | {} | {} |", label, files, lines)?;
        }
        writeln!(out)?;
    }

    if !input.entities.is_empty() {
        writeln!(out, "## Packages")?;
        writeln!(out)?;
        for entity in input.entities {
            write!(
                out,
                "- `{}` ({} files, {})",
                entity.path,
                entity.file_count,
                human_size(entity.size)
            )?;
            if entity.description.is_empty() {
                writeln!(out)?;
            } else {
                writeln!(out, ": {}", one_line(&entity.description))?;
            }
        }
        writeln!(out)?;
    }

    if !input.inventory.is_empty() {
        writeln!(out, "## Function Inventory")?;
        writeln!(out)?;
        for file in input.inventory {
            writeln!(out, "### {}", file.path)?;
            writeln!(out)?;
            if !file.imports.is_empty() {
                writeln!(out, "Imports: {}", file.imports.join(", "))?;
                writeln!(out)?;
            }
            for function in &file.functions {
                if function.description.is_empty() {
                    writeln!(out, "- `{}`", function.name)?;
                } else {
                    writeln!(out, "- `{}`: {}", function.name, one_line(&function.description))?;
                }
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

fn write_tree(out: &mut String, dir: &DirNode, prefix: &str) -> std::fmt::Result {
    let count = dir.children.len();
    for (i, (name, node)) in dir.children.iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        match node {
            TreeNode::Dir(child) => {
                writeln!(out, "{}{}{}/", prefix, branch, name)?;
                let next = format!("{}{}", prefix, if last { "    " } else { "│   " });
                write_tree(out, child, &next)?;
            }
            TreeNode::File { .. } => writeln!(out, "{}{}{}", prefix, branch, name)?,
        }
    }
    Ok(())
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit + 1 < UNITS.len() {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
