use crate::Dialect;
use tree_sitter::{Node, TreeCursor};

/// Name of the pseudo-function that resolves to UI-construction callbacks.
pub const BUILD_SENTINEL: &str = "build";

/// What a syntax node declares, as far as function lookup is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration<'a> {
    /// Function or method with an identifying name.
    Named(&'a str),
    /// Nameless UI-construction callback of a declarative component.
    UiCallback,
}

/// A matched declaration: byte range plus 0-based inclusive row range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclarationSpan {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_row: usize,
    pub end_row: usize,
}

impl DeclarationSpan {
    pub fn rows(&self) -> (usize, usize) {
        (self.start_row, self.end_row)
    }
}

/// Depth-first search for every declaration matching one function name.
pub struct DeclarationVisitor<'a> {
    dialect: Dialect,
    source: &'a [u8],
    function_name: &'a str,
    pub matches: Vec<DeclarationSpan>,
}

impl<'a> DeclarationVisitor<'a> {
    pub fn new(dialect: Dialect, source: &'a [u8], function_name: &'a str) -> Self {
        Self {
            dialect,
            source,
            function_name,
            matches: Vec::new(),
        }
    }

    pub fn visit(&mut self, node: Node) {
        let mut cursor = node.walk();
        self.visit_node(&mut cursor);
    }

    fn visit_node(&mut self, cursor: &mut TreeCursor) {
        let node = cursor.node();

        let is_match = match classify_node(self.dialect, &node, self.source) {
            Some(Declaration::UiCallback) => self.function_name == BUILD_SENTINEL,
            Some(Declaration::Named(name)) => name == self.function_name,
            None => false,
        };
        if is_match {
            self.matches.push(DeclarationSpan {
                start_byte: node.start_byte(),
                end_byte: node.end_byte(),
                start_row: node.start_position().row,
                end_row: node.end_position().row,
            });
        }

        // Nested declarations are matched too; there is no early exit.
        if cursor.goto_first_child() {
            loop {
                self.visit_node(cursor);
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
            cursor.goto_parent();
        }
    }
}

pub fn classify_node<'s>(dialect: Dialect, node: &Node, source: &'s [u8]) -> Option<Declaration<'s>> {
    match dialect {
        Dialect::Cpp => classify_cpp(node, source),
        Dialect::ArkTs if is_ui_callback(node, source) => Some(Declaration::UiCallback),
        _ => classify_script(node, source),
    }
}

fn classify_script<'s>(node: &Node, source: &'s [u8]) -> Option<Declaration<'s>> {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" | "method_definition" => {
            field_text(node, "name", source).map(Declaration::Named)
        }
        // `const load = async () => {}` and `onClick = () => {}` class fields
        "variable_declarator" | "public_field_definition" => {
            let value = node.child_by_field_name("value")?;
            if is_function_value(value.kind()) {
                field_text(node, "name", source).map(Declaration::Named)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn is_function_value(kind: &str) -> bool {
    matches!(
        kind,
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

/// `build()` directly inside a component body: no parameters, member of a class body.
fn is_ui_callback(node: &Node, source: &[u8]) -> bool {
    if node.kind() != "method_definition" {
        return false;
    }
    if field_text(node, "name", source) != Some(BUILD_SENTINEL) {
        return false;
    }
    let no_params = node
        .child_by_field_name("parameters")
        .map(|params| params.named_child_count() == 0)
        .unwrap_or(true);
    let in_class_body = node
        .parent()
        .map(|parent| parent.kind() == "class_body")
        .unwrap_or(false);
    no_params && in_class_body
}

fn classify_cpp<'s>(node: &Node, source: &'s [u8]) -> Option<Declaration<'s>> {
    if node.kind() != "function_definition" {
        return None;
    }
    let declarator = node.child_by_field_name("declarator")?;
    cpp_declarator_name(declarator, source).map(Declaration::Named)
}

/// Follow the declarator chain down to the declared name; qualified names
/// (`Foo::bar`) resolve to their last segment.
fn cpp_declarator_name<'s>(node: Node, source: &'s [u8]) -> Option<&'s str> {
    match node.kind() {
        "identifier" | "field_identifier" | "destructor_name" | "operator_name" => {
            node.utf8_text(source).ok()
        }
        "qualified_identifier" | "template_function" => {
            let name = node.child_by_field_name("name")?;
            cpp_declarator_name(name, source)
        }
        _ => {
            let inner = node.child_by_field_name("declarator")?;
            cpp_declarator_name(inner, source)
        }
    }
}

fn field_text<'s>(node: &Node, field: &str, source: &'s [u8]) -> Option<&'s str> {
    node.child_by_field_name(field)?.utf8_text(source).ok()
}
