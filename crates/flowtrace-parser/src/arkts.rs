// ABOUTME: Rewrites ArkTS declarative UI syntax into TypeScript the grammar accepts.
// ABOUTME: Every rewrite keeps byte length and line breaks, so spans index the original file.
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static STRUCT_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^([ \t]*(?:@\w+(?:\([^)\n]*\))?[ \t]+)*(?:export[ \t]+)?(?:default[ \t]+)?)struct([ \t])",
    )
    .expect("static regex")
});

// `@Styles function f()` and `@Extend(Text) function f()`
static FUNCTION_DECORATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)(@\w+(?:\([^)\n]*\))?)(\s+(?:export\s+)?function\b)")
        .expect("static regex")
});

/// TypeScript view of an ArkTS source, byte-for-byte the same length.
///
/// - component `struct` declarations become `class`
/// - decorators on free functions are blanked
/// - trailing-block component calls (`Column() { ... }`) become a blank
///   statement followed by a plain block
/// - attribute chains on a closed component block (`}.width(100)`) and
///   leading-dot attribute statements (`@Styles` bodies) lose their dot
pub fn to_typescript(source: &str) -> String {
    let classes = STRUCT_KEYWORD.replace_all(source, "${1}class ${2}");
    let functions = FUNCTION_DECORATOR.replace_all(&classes, |caps: &Captures| {
        format!("{}{}{}", &caps[1], " ".repeat(caps[2].len()), &caps[3])
    });
    UiBlockRewriter::new(functions.as_bytes()).run()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Brace {
    /// Body of a class, interface or enum: members are declarations
    TypeBody,
    /// Function body, object literal or plain block
    Block,
    /// Trailing block of a UI component call
    Component,
}

struct UiBlockRewriter<'a> {
    src: &'a [u8],
    out: Vec<u8>,
    braces: Vec<Brace>,
    parens: Vec<usize>,
    /// Open and close offsets of the most recently closed parenthesis pair
    last_paren: Option<(usize, usize)>,
    /// Last significant byte (not whitespace or comment) and its offset
    prev: Option<(u8, usize)>,
    after_component: bool,
}

impl<'a> UiBlockRewriter<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self {
            src,
            out: src.to_vec(),
            braces: Vec::new(),
            parens: Vec::new(),
            last_paren: None,
            prev: None,
            after_component: false,
        }
    }

    fn run(mut self) -> String {
        let src = self.src;
        let len = src.len();
        let mut i = 0;

        while i < len {
            let c = src[i];
            match c {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    i += 1;
                    continue;
                }
                b'/' if src.get(i + 1) == Some(&b'/') => {
                    i = skip_line_comment(src, i);
                    continue;
                }
                b'/' if src.get(i + 1) == Some(&b'*') => {
                    i = skip_block_comment(src, i);
                    continue;
                }
                b'\'' | b'"' | b'`' => {
                    let end = if c == b'`' {
                        skip_template(src, i)
                    } else {
                        skip_string(src, i, c)
                    };
                    self.after_component = false;
                    self.prev = Some((c, i));
                    i = end;
                    continue;
                }
                b'.' => self.on_dot(i),
                b'(' => self.parens.push(i),
                b')' => {
                    if let Some(open) = self.parens.pop() {
                        self.last_paren = Some((open, i));
                    }
                }
                b'{' => self.on_open_brace(i),
                b'}' => {
                    if self.braces.pop() == Some(Brace::Component) {
                        self.after_component = true;
                        self.prev = Some((c, i));
                        i += 1;
                        continue;
                    }
                }
                _ => {}
            }
            self.after_component = false;
            self.prev = Some((c, i));
            i += 1;
        }

        // Only ASCII bytes were written, each over a whole character.
        String::from_utf8(self.out)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
    }

    fn on_dot(&mut self, i: usize) {
        let starts_member = self
            .src
            .get(i + 1)
            .map(|&b| b.is_ascii_alphabetic() || b == b'_' || b == b'$')
            .unwrap_or(false);
        let after_open_brace = matches!(self.prev, Some((b'{', _)));
        if starts_member && (self.after_component || after_open_brace) {
            self.out[i] = b' ';
        }
    }

    fn on_open_brace(&mut self, i: usize) {
        let kind = if is_type_body(self.src, i) {
            Brace::TypeBody
        } else if let Some((start, close)) = self.component_call(i) {
            for byte in &mut self.out[start..=close] {
                if *byte != b'\n' && *byte != b'\r' {
                    *byte = b' ';
                }
            }
            self.out[close] = b';';
            Brace::Component
        } else {
            Brace::Block
        };
        self.braces.push(kind);
    }

    /// `Column(...) {` inside a code block: start of the call and offset of its `)`.
    fn component_call(&self, brace: usize) -> Option<(usize, usize)> {
        let (prev, close) = self.prev?;
        let (open, last_close) = self.last_paren?;
        if prev != b')' || last_close != close || brace <= close {
            return None;
        }
        match self.braces.last() {
            Some(Brace::Block) | Some(Brace::Component) => {}
            _ => return None,
        }

        let src = self.src;
        let start = ident_start(src, open);
        if start == open || !src[start].is_ascii_uppercase() {
            return None;
        }

        let mut before = start;
        while before > 0 && matches!(src[before - 1], b' ' | b'\t') {
            before -= 1;
        }
        if before > 0 && src[before - 1] == b'.' {
            return None;
        }
        let keyword = &src[ident_start(src, before)..before];
        if keyword == b"function" || keyword == b"new" {
            return None;
        }
        Some((start, close))
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn ident_start(src: &[u8], end: usize) -> usize {
    let mut start = end;
    while start > 0 && is_ident_byte(src[start - 1]) {
        start -= 1;
    }
    start
}

/// Whether the `{` at `brace` opens a class, interface or enum body.
fn is_type_body(src: &[u8], brace: usize) -> bool {
    let mut start = brace;
    while start > 0 && !matches!(src[start - 1], b';' | b'{' | b'}') {
        start -= 1;
    }
    src[start..brace]
        .split(|b| !is_ident_byte(*b))
        .any(|word| matches!(word, b"class" | b"interface" | b"enum"))
}

fn skip_line_comment(src: &[u8], i: usize) -> usize {
    src[i..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| i + p)
        .unwrap_or(src.len())
}

fn skip_block_comment(src: &[u8], i: usize) -> usize {
    src[i + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map(|p| i + 2 + p + 2)
        .unwrap_or(src.len())
}

fn skip_string(src: &[u8], i: usize, quote: u8) -> usize {
    let mut j = i + 1;
    while j < src.len() {
        match src[j] {
            b'\\' => j += 2,
            b'\n' => return j,
            b if b == quote => return j + 1,
            _ => j += 1,
        }
    }
    src.len()
}

fn skip_template(src: &[u8], i: usize) -> usize {
    let mut j = i + 1;
    while j < src.len() {
        match src[j] {
            b'\\' => j += 2,
            b'`' => return j + 1,
            b'$' if src.get(j + 1) == Some(&b'{') => {
                let mut depth = 1;
                j += 2;
                while j < src.len() && depth > 0 {
                    match src[j] {
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
            }
            _ => j += 1,
        }
    }
    src.len()
}
