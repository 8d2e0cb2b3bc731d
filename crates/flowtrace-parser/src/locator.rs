use crate::{
    collect_source_files, prepare_source, DeclarationSpan, DeclarationVisitor, Dialect,
    LanguageRegistry,
};
use flowtrace_core::LocatorConfig;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};
use tree_sitter::Parser;

/// Resolves a function name to the rendered source of every matching declaration.
pub trait FunctionLocator: Send + Sync {
    /// Rendered matches under `search_root` (or the configured code base).
    /// No match is an empty string, never an error.
    fn locate(&self, function_name: &str, search_root: Option<&Path>) -> String;
}

/// One matched declaration with its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedFunction {
    pub file: PathBuf,
    /// 1-based line of the first source line in `text`
    pub start_line: usize,
    pub text: String,
}

impl LocatedFunction {
    /// `File: <path>` header, then every physical line prefixed with its
    /// right-justified line number.
    pub fn render(&self) -> String {
        let mut block = format!("File: {}\n", self.file.display());
        let numbered: Vec<String> = self
            .text
            .split('\n')
            .enumerate()
            .map(|(i, line)| {
                format!("{:5}: {}", self.start_line + i, line.trim_end_matches('\r'))
            })
            .collect();
        block.push_str(&numbered.join("\n"));
        block.push('\n');
        block
    }
}

/// Blank line between blocks; empty input renders as an empty string.
pub fn render_matches(matches: &[LocatedFunction]) -> String {
    matches
        .iter()
        .map(LocatedFunction::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Syntax-tree backed locator over C/C++, TypeScript, JavaScript and ArkTS sources.
pub struct TreeSitterLocator {
    registry: LanguageRegistry,
    code_base: PathBuf,
    exclude_dirs: Vec<String>,
}

impl TreeSitterLocator {
    pub fn new(code_base: impl Into<PathBuf>) -> Self {
        Self {
            registry: LanguageRegistry::new(),
            code_base: code_base.into(),
            exclude_dirs: Vec::new(),
        }
    }

    pub fn from_config(config: &LocatorConfig) -> Self {
        let code_base = config
            .code_base
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(code_base).with_exclude_dirs(config.exclude_dirs.clone())
    }

    pub fn with_exclude_dirs(mut self, exclude_dirs: Vec<String>) -> Self {
        self.exclude_dirs = exclude_dirs;
        self
    }

    pub fn code_base(&self) -> &Path {
        &self.code_base
    }

    /// Every declaration named `function_name` under `search_root`, in walk order.
    pub fn find_all(&self, function_name: &str, search_root: &Path) -> Vec<LocatedFunction> {
        let started = Instant::now();
        let mut parsers: HashMap<Dialect, Parser> = HashMap::new();
        let mut found = Vec::new();

        let files = collect_source_files(search_root, &self.exclude_dirs, &self.registry);
        for (path, dialect) in &files {
            if !parsers.contains_key(dialect) {
                match self.registry.create_parser(dialect) {
                    Some(parser) => {
                        parsers.insert(*dialect, parser);
                    }
                    None => {
                        warn!("No parser available for {:?}", dialect);
                        continue;
                    }
                }
            }
            if let Some(parser) = parsers.get_mut(dialect) {
                found.extend(self.locate_in_file(parser, path, *dialect, function_name));
            }
        }

        debug!(
            "Located {} match(es) for '{}' across {} files in {:.2?}",
            found.len(),
            function_name,
            files.len(),
            started.elapsed()
        );
        found
    }

    /// Matches within one file. Unreadable or unparseable files yield nothing.
    pub fn locate_in_file(
        &self,
        parser: &mut Parser,
        path: &Path,
        dialect: Dialect,
        function_name: &str,
    ) -> Vec<LocatedFunction> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", path.display(), e);
                return Vec::new();
            }
        };
        let source = String::from_utf8_lossy(&bytes);
        let prepared = prepare_source(dialect, &source);

        let tree = match parser.parse(prepared.as_bytes(), None) {
            Some(tree) => tree,
            None => {
                warn!("Failed to parse {}", path.display());
                return Vec::new();
            }
        };

        let mut visitor = DeclarationVisitor::new(dialect, prepared.as_bytes(), function_name);
        visitor.visit(tree.root_node());

        visitor
            .matches
            .iter()
            .map(|span| LocatedFunction {
                file: path.to_path_buf(),
                start_line: span.start_row + 1,
                text: span_text(&source, span),
            })
            .collect()
    }
}

/// Whole physical lines covered by `span`, from the start of its first row to
/// the end of its last row. Offsets index the prepared text, which has the
/// same length as the original.
fn span_text(source: &str, span: &DeclarationSpan) -> String {
    let bytes = source.as_bytes();
    let end = span.end_byte.min(bytes.len());
    let start = bytes[..span.start_byte.min(end)]
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0);
    let end = bytes[end..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| end + p)
        .unwrap_or(bytes.len());
    source
        .get(start..end)
        .map(|text| text.trim_end_matches('\r').to_string())
        .unwrap_or_default()
}

impl FunctionLocator for TreeSitterLocator {
    fn locate(&self, function_name: &str, search_root: Option<&Path>) -> String {
        let root = search_root.unwrap_or(&self.code_base);
        render_matches(&self.find_all(function_name, root))
    }
}
