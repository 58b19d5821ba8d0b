// ABOUTME: Regex rule table extracting function-like blocks and imports per language
// ABOUTME: Block text runs from one definition to the next, which is what change detection hashes

use codemap_core::Language;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// One extracted definition. `text` is the source from the definition's
/// first line up to the next definition or end of file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMatch {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub functions: Vec<FunctionMatch>,
    pub imports: Vec<String>,
}

struct RuleSource {
    language: Language,
    definitions: &'static [&'static str],
    imports: &'static [&'static str],
}

const RULE_SOURCES: &[RuleSource] = &[
    RuleSource {
        language: Language::Rust,
        definitions: &[
            r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?(?:const[ \t]+)?(?:async[ \t]+)?(?:unsafe[ \t]+)?(?:extern[ \t]+\x22[^\x22]*\x22[ \t]+)?fn[ \t]+([A-Za-z_][A-Za-z0-9_]*)",
            r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?(?:struct|enum|trait)[ \t]+([A-Za-z_][A-Za-z0-9_]*)",
        ],
        imports: &[r"(?m)^[ \t]*(?:pub[ \t]+)?use[ \t]+([^;]+);"],
    },
    RuleSource {
        language: Language::TypeScript,
        definitions: &[
            r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?(?:async[ \t]+)?function[ \t]*\*?[ \t]*([A-Za-z_$][\w$]*)",
            r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?(?:abstract[ \t]+)?(?:class|interface)[ \t]+([A-Za-z_$][\w$]*)",
            r"(?m)^[ \t]*(?:export[ \t]+)?(?:const|let|var)[ \t]+([A-Za-z_$][\w$]*)[^=\n]*=[ \t]*(?:async[ \t]+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)[^=\n]*=>",
        ],
        imports: &[
            r#"(?m)^[ \t]*import[ \t]+(?:[^'";]*[ \t]+from[ \t]+)?['"]([^'"]+)['"]"#,
            r#"require\([ \t]*['"]([^'"]+)['"][ \t]*\)"#,
        ],
    },
    RuleSource {
        language: Language::JavaScript,
        definitions: &[
            r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?(?:async[ \t]+)?function[ \t]*\*?[ \t]*([A-Za-z_$][\w$]*)",
            r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?class[ \t]+([A-Za-z_$][\w$]*)",
            r"(?m)^[ \t]*(?:export[ \t]+)?(?:const|let|var)[ \t]+([A-Za-z_$][\w$]*)[ \t]*=[ \t]*(?:async[ \t]+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)[ \t]*=>",
        ],
        imports: &[
            r#"(?m)^[ \t]*import[ \t]+(?:[^'";]*[ \t]+from[ \t]+)?['"]([^'"]+)['"]"#,
            r#"require\([ \t]*['"]([^'"]+)['"][ \t]*\)"#,
        ],
    },
    RuleSource {
        language: Language::Python,
        definitions: &[
            r"(?m)^[ \t]*(?:async[ \t]+)?def[ \t]+([A-Za-z_]\w*)",
            r"(?m)^[ \t]*class[ \t]+([A-Za-z_]\w*)",
        ],
        imports: &[
            r"(?m)^[ \t]*from[ \t]+([\w.]+)[ \t]+import",
            r"(?m)^[ \t]*import[ \t]+([\w.]+)",
        ],
    },
    RuleSource {
        language: Language::Go,
        definitions: &[
            r"(?m)^func[ \t]+(?:\([^)]*\)[ \t]*)?([A-Za-z_]\w*)",
            r"(?m)^type[ \t]+([A-Za-z_]\w*)[ \t]+(?:struct|interface)",
        ],
        imports: &[
            r#"(?m)^[ \t]*import[ \t]+(?:[\w.]+[ \t]+)?"([^"]+)""#,
            r#"(?m)^[ \t]+(?:[\w.]+[ \t]+)?"([^"]+)"[ \t]*$"#,
        ],
    },
    RuleSource {
        language: Language::Java,
        definitions: &[
            r"(?m)^[ \t]*(?:(?:public|private|protected|static|final|abstract|synchronized|native)[ \t]+)*[\w<>\[\],.?]+[ \t]+([a-zA-Z_]\w*)[ \t]*\([^)]*\)[ \t]*(?:throws[ \t]+[\w.,\t ]+)?\{",
            r"(?m)^[ \t]*(?:(?:public|private|protected|abstract|final|static)[ \t]+)*(?:class|interface|enum|record)[ \t]+([A-Za-z_]\w*)",
        ],
        imports: &[r"(?m)^[ \t]*import[ \t]+(?:static[ \t]+)?([\w.*]+);"],
    },
    RuleSource {
        language: Language::Ruby,
        definitions: &[
            r"(?m)^[ \t]*def[ \t]+(?:self\.)?([A-Za-z_]\w*[?!=]?)",
            r"(?m)^[ \t]*(?:class|module)[ \t]+([A-Z]\w*(?:::\w+)*)",
        ],
        imports: &[r#"(?m)^[ \t]*require(?:_relative)?[ \t(]+['"]([^'"]+)['"]"#],
    },
    RuleSource {
        language: Language::Php,
        definitions: &[
            r"(?m)^[ \t]*(?:(?:public|private|protected|static|abstract|final)[ \t]+)*function[ \t]+&?[ \t]*([A-Za-z_]\w*)",
            r"(?m)^[ \t]*(?:(?:abstract|final)[ \t]+)?(?:class|interface|trait|enum)[ \t]+([A-Za-z_]\w*)",
        ],
        imports: &[
            r"(?m)^[ \t]*use[ \t]+([\w\\]+)",
            r#"(?:require|include)(?:_once)?[ \t]*\(?[ \t]*['"]([^'"]+)['"]"#,
        ],
    },
];

/// Words a loose signature pattern can pick up as a name.
const KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "else",
];

struct CompiledRules {
    definitions: Vec<Regex>,
    imports: Vec<Regex>,
}

static RULES: Lazy<HashMap<Language, CompiledRules>> = Lazy::new(|| {
    RULE_SOURCES
        .iter()
        .map(|src| {
            (
                src.language,
                CompiledRules {
                    definitions: compile_all(src.definitions),
                    imports: compile_all(src.imports),
                },
            )
        })
        .collect()
});

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Invalid extraction pattern {:?}: {}", p, e);
                None
            }
        })
        .collect()
}

/// Extracts definitions and imports from `content`. Unknown languages yield
/// an empty extraction. Repeated names get a `#n` suffix so every block has
/// a distinct key.
pub fn extract(content: &str, language: Language) -> Extraction {
    let Some(rules) = RULES.get(&language) else {
        return Extraction::default();
    };

    let mut starts: Vec<(usize, String)> = Vec::new();
    for re in &rules.definitions {
        for caps in re.captures_iter(content) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if KEYWORDS.contains(&name.as_str()) {
                continue;
            }
            starts.push((whole.start(), name.as_str().to_string()));
        }
    }
    starts.sort_by_key(|(offset, _)| *offset);
    starts.dedup_by_key(|(offset, _)| *offset);

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut functions = Vec::with_capacity(starts.len());
    for (i, (start, name)) in starts.iter().enumerate() {
        let end = starts
            .get(i + 1)
            .map(|(next, _)| *next)
            .unwrap_or(content.len());
        let count = seen.entry(name.clone()).or_insert(0);
        *count += 1;
        let key = if *count == 1 {
            name.clone()
        } else {
            format!("{}#{}", name, count)
        };
        functions.push(FunctionMatch {
            name: key,
            text: content[*start..end].trim_end().to_string(),
        });
    }

    let mut imports = Vec::new();
    let mut seen_imports = HashSet::new();
    for re in &rules.imports {
        for caps in re.captures_iter(content) {
            if let Some(m) = caps.get(1) {
                let import = m.as_str().trim().to_string();
                if seen_imports.insert(import.clone()) {
                    imports.push(import);
                }
            }
        }
    }

    Extraction { functions, imports }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ex: &Extraction) -> Vec<&str> {
        ex.functions.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_rules_compile_for_every_known_language() {
        for lang in Language::known() {
            let rules = RULES.get(&lang).expect("rules for language");
            assert!(!rules.definitions.is_empty(), "{}", lang);
        }
    }

    #[test]
    fn test_rust_blocks_and_imports() {
        let src = "use std::fs;\nuse crate::a::{b, c};\n\npub struct Foo;\n\nfn one() {\n    1\n}\n\npub async fn two() {}\n";
        let ex = extract(src, Language::Rust);
        assert_eq!(names(&ex), vec!["Foo", "one", "two"]);
        assert_eq!(ex.functions[1].text, "fn one() {\n    1\n}");
        assert_eq!(ex.imports, vec!["std::fs", "crate::a::{b, c}"]);
    }

    #[test]
    fn test_editing_one_block_leaves_others_identical() {
        let before = "def a():\n    return 1\n\ndef b():\n    return 2\n";
        let after = "def a():\n    return 1\n\ndef b():\n    return 3\n";
        let x = extract(before, Language::Python);
        let y = extract(after, Language::Python);
        assert_eq!(x.functions[0], y.functions[0]);
        assert_ne!(x.functions[1], y.functions[1]);
    }

    #[test]
    fn test_duplicate_names_are_disambiguated() {
        let src = "impl A {\n    fn new() {}\n}\nimpl B {\n    fn new() {}\n}\n";
        let ex = extract(src, Language::Rust);
        assert_eq!(names(&ex), vec!["new", "new#2"]);
    }

    #[test]
    fn test_typescript_forms() {
        let src = "import { x } from './x';\nconst y = require(\"y\");\nexport function f() {}\nexport const g = async (a) => a;\nclass K {}\n";
        let ex = extract(src, Language::TypeScript);
        assert_eq!(names(&ex), vec!["f", "g", "K"]);
        assert_eq!(ex.imports, vec!["./x", "y"]);
    }

    #[test]
    fn test_java_skips_control_flow() {
        let src = "import java.util.List;\npublic class A {\n    public void run() {\n        if (x) {\n        }\n    }\n}\n";
        let ex = extract(src, Language::Java);
        assert_eq!(names(&ex), vec!["A", "run"]);
        assert_eq!(ex.imports, vec!["java.util.List"]);
    }

    #[test]
    fn test_unknown_language_is_empty() {
        assert_eq!(extract("fn a() {}", Language::Unknown), Extraction::default());
    }
}
