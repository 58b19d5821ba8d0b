use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Languages a project can be detected as. Each tagged variant maps to one
/// row of [`LANGUAGE_TABLE`]; supporting a new language means adding a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    TypeScript,
    JavaScript,
    Python,
    Go,
    Java,
    Ruby,
    Php,
    Unknown,
}

/// Static facts about one supported language.
#[derive(Debug)]
pub struct LanguageSpec {
    pub language: Language,
    pub name: &'static str,
    /// The single manifest file whose presence identifies the language.
    pub manifest: &'static str,
    pub extensions: &'static [&'static str],
}

/// Ordered by detection priority: TypeScript precedes JavaScript because a
/// TypeScript project normally carries a package.json as well.
pub const LANGUAGE_TABLE: &[LanguageSpec] = &[
    LanguageSpec {
        language: Language::Rust,
        name: "Rust",
        manifest: "Cargo.toml",
        extensions: &["rs"],
    },
    LanguageSpec {
        language: Language::TypeScript,
        name: "TypeScript",
        manifest: "tsconfig.json",
        extensions: &["ts", "tsx"],
    },
    LanguageSpec {
        language: Language::JavaScript,
        name: "JavaScript",
        manifest: "package.json",
        extensions: &["js", "jsx", "mjs", "cjs"],
    },
    LanguageSpec {
        language: Language::Python,
        name: "Python",
        manifest: "pyproject.toml",
        extensions: &["py", "pyi"],
    },
    LanguageSpec {
        language: Language::Go,
        name: "Go",
        manifest: "go.mod",
        extensions: &["go"],
    },
    LanguageSpec {
        language: Language::Java,
        name: "Java",
        manifest: "pom.xml",
        extensions: &["java"],
    },
    LanguageSpec {
        language: Language::Ruby,
        name: "Ruby",
        manifest: "Gemfile",
        extensions: &["rb", "rake"],
    },
    LanguageSpec {
        language: Language::Php,
        name: "PHP",
        manifest: "composer.json",
        extensions: &["php"],
    },
];

impl Language {
    pub fn spec(self) -> Option<&'static LanguageSpec> {
        LANGUAGE_TABLE.iter().find(|row| row.language == self)
    }

    pub fn known() -> impl Iterator<Item = Language> {
        LANGUAGE_TABLE.iter().map(|row| row.language)
    }

    pub fn extensions(self) -> &'static [&'static str] {
        self.spec().map(|row| row.extensions).unwrap_or(&[])
    }

    pub fn manifest(self) -> Option<&'static str> {
        self.spec().map(|row| row.manifest)
    }

    pub fn from_extension(ext: &str) -> Option<Language> {
        let ext = ext.to_ascii_lowercase();
        LANGUAGE_TABLE
            .iter()
            .find(|row| row.extensions.contains(&ext.as_str()))
            .map(|row| row.language)
    }

    pub fn from_path(path: &Path) -> Option<Language> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn from_manifest(file_name: &str) -> Option<Language> {
        LANGUAGE_TABLE
            .iter()
            .find(|row| row.manifest == file_name)
            .map(|row| row.language)
    }

    /// The fixed set of manifest names watched for every project.
    pub fn manifest_files() -> impl Iterator<Item = &'static str> {
        LANGUAGE_TABLE.iter().map(|row| row.manifest)
    }

    pub fn is_manifest(file_name: &str) -> bool {
        Self::manifest_files().any(|m| m == file_name)
    }

    pub fn is_source_path(path: &Path) -> bool {
        Self::from_path(path).is_some()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.spec() {
            Some(row) => write!(f, "{}", row.name),
            None => write!(f, "Unknown"),
        }
    }
}

/// Identifier of a tracked project, used to namespace on-disk caches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives an id from the final path segment.
    ///
    /// Two projects sharing a directory basename map to the same id and
    /// therefore share a cache namespace.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "root".to_string());
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_extension_lookup() {
        assert_eq!(Language::from_extension("rs"), Some(Language::Rust));
        assert_eq!(Language::from_extension("TSX"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("md"), None);
    }

    #[test]
    fn test_one_manifest_per_language() {
        for lang in Language::known() {
            let manifest = lang.manifest().unwrap();
            assert_eq!(Language::from_manifest(manifest), Some(lang));
        }
        assert_eq!(Language::manifest_files().count(), LANGUAGE_TABLE.len());
        assert!(Language::Unknown.manifest().is_none());
    }

    #[test]
    fn test_project_id_uses_basename() {
        let a = ProjectId::from_path(&PathBuf::from("/work/one/app"));
        let b = ProjectId::from_path(&PathBuf::from("/work/two/app"));
        assert_eq!(a.as_str(), "app");
        // Same basename, same namespace.
        assert_eq!(a, b);
    }
}
