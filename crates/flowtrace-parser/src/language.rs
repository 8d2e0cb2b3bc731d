// ABOUTME: Source dialects the locator understands and the Tree-sitter grammar behind each.
// ABOUTME: Maps file extensions to dialects and builds configured parsers.
use crate::arkts::to_typescript;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// C and C++ sources
    Cpp,
    TypeScript,
    Tsx,
    JavaScript,
    /// ArkTS declarative UI sources (`.ets`)
    ArkTs,
}

impl Dialect {
    /// Dialects whose declarations follow the JavaScript family node kinds.
    pub fn is_script(&self) -> bool {
        matches!(
            self,
            Dialect::TypeScript | Dialect::Tsx | Dialect::JavaScript | Dialect::ArkTs
        )
    }
}

pub struct DialectConfig {
    pub language: tree_sitter::Language,
    pub file_extensions: Vec<&'static str>,
}

pub struct LanguageRegistry {
    configs: HashMap<Dialect, DialectConfig>,
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut configs = HashMap::new();

        configs.insert(
            Dialect::Cpp,
            DialectConfig {
                language: tree_sitter_cpp::LANGUAGE.into(),
                file_extensions: vec!["c", "cc", "cpp", "cxx", "h", "hh", "hpp", "hxx"],
            },
        );

        configs.insert(
            Dialect::TypeScript,
            DialectConfig {
                language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                file_extensions: vec!["ts", "mts", "cts"],
            },
        );

        configs.insert(
            Dialect::Tsx,
            DialectConfig {
                language: tree_sitter_typescript::LANGUAGE_TSX.into(),
                file_extensions: vec!["tsx"],
            },
        );

        configs.insert(
            Dialect::JavaScript,
            DialectConfig {
                language: tree_sitter_javascript::LANGUAGE.into(),
                file_extensions: vec!["js", "mjs", "cjs", "jsx"],
            },
        );

        // No published Rust grammar for ArkTS; sources are rewritten to
        // TypeScript (see `prepare_source`) and parsed with that grammar.
        configs.insert(
            Dialect::ArkTs,
            DialectConfig {
                language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                file_extensions: vec!["ets"],
            },
        );

        Self { configs }
    }

    pub fn detect_dialect(&self, file_path: &Path) -> Option<Dialect> {
        let extension = file_path.extension()?.to_str()?;

        for (dialect, config) in &self.configs {
            if config.file_extensions.contains(&extension) {
                return Some(*dialect);
            }
        }

        None
    }

    pub fn get_config(&self, dialect: &Dialect) -> Option<&DialectConfig> {
        self.configs.get(dialect)
    }

    pub fn create_parser(&self, dialect: &Dialect) -> Option<Parser> {
        let config = self.get_config(dialect)?;
        let mut parser = Parser::new();
        parser.set_language(&config.language).ok()?;
        Some(parser)
    }
}

/// Source text as handed to the grammar.
///
/// ArkTS is rewritten into TypeScript of the same byte length (see
/// [`crate::arkts::to_typescript`]), so node positions still point into the
/// original file.
pub fn prepare_source(dialect: Dialect, source: &str) -> Cow<'_, str> {
    match dialect {
        Dialect::ArkTs => Cow::Owned(to_typescript(source)),
        _ => Cow::Borrowed(source),
    }
}
