//! TypeScript type erasure.
//!
//! A single pass over the token stream that records byte-range edits: type
//! annotations, type-only declarations and type-only imports are removed,
//! enums are lowered to the usual IIFE form, and everything else is copied
//! through untouched. The walk keeps a stack of bracket frames so it can tell
//! a parameter annotation from an object property or a conditional branch.
//!
//! Syntax that needs real code generation (namespaces, constructor parameter
//! properties, `import x = require()`) is rejected with a diagnostic.

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::fmt::Write as _;

use super::lexer::{SourceTokens, TokenKind};
use super::{CompilerError, Diagnostic};

/// Typed extensions and the extension their erased output uses.
const TYPED_EXTENSIONS: &[(&str, &str)] = &[
    (".tsx", ".js"),
    (".ts", ".js"),
    (".mts", ".mjs"),
    (".cts", ".cjs"),
];

/// Words that end an expression when they precede an operator-like token.
const NON_VALUE_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await", "extends", "export", "import", "default", "let", "const", "var",
    "if", "while", "for", "with", "switch", "try", "catch", "finally", "as", "satisfies",
];

const ACCESSIBILITY: &[&str] = &["public", "private", "protected", "readonly", "override"];

/// Options for [`strip_types`].
#[derive(Debug, Clone, Copy)]
pub struct StripOptions {
    /// Source is TSX: `<` never starts a type assertion or generic arrow.
    pub tsx: bool,
    /// Rewrite `./x.ts` style specifiers to their erased extension.
    pub rewrite_import_extensions: bool,
}

impl Default for StripOptions {
    fn default() -> Self {
        Self {
            tsx: false,
            rewrite_import_extensions: true,
        }
    }
}

impl StripOptions {
    /// Options appropriate for a module id, based on its extension.
    #[must_use]
    pub fn for_id(id: &str) -> Self {
        Self {
            tsx: id.ends_with(".tsx"),
            ..Self::default()
        }
    }
}

/// Whether an id names a typed source file.
#[must_use]
pub fn is_typed(id: &str) -> bool {
    let path = id.split(['?', '#']).next().unwrap_or(id);
    !is_declaration(path)
        && TYPED_EXTENSIONS
            .iter()
            .any(|(ext, _)| path.ends_with(ext))
}

/// Whether an id names a declaration file (`.d.ts` and friends).
#[must_use]
pub fn is_declaration(id: &str) -> bool {
    let path = id.split(['?', '#']).next().unwrap_or(id);
    [".d.ts", ".d.mts", ".d.cts"]
        .iter()
        .any(|ext| path.ends_with(ext))
}

/// The erased form of a relative or absolute specifier, if it names a typed file.
#[must_use]
pub fn erased_specifier(specifier: &str) -> Option<String> {
    if !(specifier.starts_with('.') || specifier.starts_with('/')) || specifier.ends_with(".d.ts")
    {
        return None;
    }
    TYPED_EXTENSIONS.iter().find_map(|(typed, erased)| {
        specifier
            .strip_suffix(typed)
            .map(|stem| format!("{stem}{erased}"))
    })
}

/// Strip TypeScript syntax from `source`, leaving runnable JavaScript.
pub fn strip_types(source: &str, id: &str, options: &StripOptions) -> Result<String, CompilerError> {
    let tokens = SourceTokens::new(source).map_err(|e| {
        CompilerError::parse_error(e.message.clone())
            .with_diagnostic(Diagnostic::at(source, e.offset, &e.message).with_file(id))
    })?;
    let mut stripper = Stripper::new(tokens, id, *options);
    stripper.run()?;
    Ok(stripper.finish())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Block,
    Object,
    Class,
    Paren,
    Bracket,
    Template,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decl {
    None,
    Binding,
    Init,
}

#[derive(Debug, Clone)]
struct Frame {
    scope: Scope,
    ternaries: u32,
    cases: u32,
    decl: Decl,
    /// Class bodies: token index where the next member starts.
    member_start: Option<usize>,
    /// Parameter lists: token index where the enclosing signature starts.
    signature: Option<usize>,
    constructor: bool,
}

impl Frame {
    fn new(scope: Scope) -> Self {
        Self {
            scope,
            ternaries: 0,
            cases: 0,
            decl: Decl::None,
            member_start: None,
            signature: None,
            constructor: false,
        }
    }
}

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

struct Stripper<'a> {
    t: SourceTokens<'a>,
    id: &'a str,
    options: StripOptions,
    edits: Vec<Edit>,
    frames: Vec<Frame>,
    class_bodies: HashSet<usize>,
    signatures: HashMap<usize, usize>,
    constructors: HashSet<usize>,
    last_colon_ternary: bool,
}

impl<'a> Stripper<'a> {
    fn new(t: SourceTokens<'a>, id: &'a str, options: StripOptions) -> Self {
        Self {
            t,
            id,
            options,
            edits: Vec::new(),
            frames: vec![Frame::new(Scope::Block)],
            class_bodies: HashSet::default(),
            signatures: HashMap::default(),
            constructors: HashSet::default(),
            last_colon_ternary: false,
        }
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    fn replace(&mut self, start: usize, end: usize, text: impl Into<String>) {
        self.edits.retain(|e| !(e.start >= start && e.end <= end && e.end > e.start));
        self.edits.push(Edit {
            start,
            end,
            text: text.into(),
        });
    }

    /// Remove bytes `start..end`. Statement-level removals keep their line breaks.
    fn remove(&mut self, start: usize, end: usize, keep_lines: bool) {
        let text = if keep_lines {
            "\n".repeat(self.t.src[start..end].matches('\n').count())
        } else {
            String::new()
        };
        self.replace(start, end, text);
    }

    /// Remove tokens `first..last_exclusive`.
    fn remove_tokens(&mut self, first: usize, last_exclusive: usize, keep_lines: bool) {
        if last_exclusive <= first {
            return;
        }
        let start = self.t.start(first);
        let end = self.t.end(last_exclusive - 1);
        self.remove(start, end, keep_lines);
    }

    fn finish(mut self) -> String {
        self.edits
            .sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
        let src = self.t.src;
        let mut out = String::with_capacity(src.len());
        let mut cursor = 0;
        for edit in &self.edits {
            if edit.start < cursor {
                continue;
            }
            out.push_str(&src[cursor..edit.start]);
            out.push_str(&edit.text);
            cursor = edit.end;
        }
        out.push_str(&src[cursor..]);
        out
    }

    fn error_at(&self, i: usize, message: &str) -> CompilerError {
        CompilerError::unsupported(message).with_diagnostic(
            Diagnostic::at(self.t.src, self.t.start(i), message).with_file(self.id),
        )
    }

    // ------------------------------------------------------------------
    // Token predicates
    // ------------------------------------------------------------------

    fn top(&self) -> &Frame {
        // The module frame is never popped.
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn is(&self, i: usize, s: &str) -> bool {
        self.t.is(i, s)
    }

    fn is_expr_end(&self, i: usize) -> bool {
        match self.t.kind(i) {
            Some(TokenKind::Ident) => !NON_VALUE_KEYWORDS.contains(&self.t.text(i)),
            Some(
                TokenKind::Number
                | TokenKind::String
                | TokenKind::Regex
                | TokenKind::Template
                | TokenKind::TemplateTail
                | TokenKind::PrivateName,
            ) => true,
            Some(TokenKind::Punct) => matches!(self.t.text(i), ")" | "]" | "}"),
            _ => false,
        }
    }

    fn expr_end_before(&self, i: usize) -> bool {
        i > 0 && self.is_expr_end(i - 1)
    }

    /// Whether token `i` continues the expression or type on the previous line.
    fn continues(&self, i: usize) -> bool {
        match self.t.kind(i) {
            Some(TokenKind::Punct) => !matches!(
                self.t.text(i),
                "{" | "(" | "[" | "+" | "-" | "++" | "--" | "!" | "~" | "@" | "..." | ";" | "}"
            ),
            Some(TokenKind::Ident) => {
                matches!(self.t.text(i), "extends" | "is" | "as" | "satisfies" | "implements")
            }
            _ => false,
        }
    }

    fn at_statement_start(&self, i: usize) -> bool {
        if self.top().scope != Scope::Block {
            return false;
        }
        i == 0
            || self.is(i - 1, ";")
            || self.is(i - 1, "{")
            || self.is(i - 1, "}")
            || self.t.newline_before(i)
    }

    /// Index just past the statement starting at `first`.
    fn statement_end(&self, first: usize) -> usize {
        let n = self.t.len();
        let mut k = first;
        while k < n {
            if self.is(k, ";") {
                return k + 1;
            }
            if k > first
                && self.t.newline_before(k)
                && self.is_expr_end(k - 1)
                && !self.continues(k)
            {
                return k;
            }
            if self.is(k, "}") || self.is(k, ")") || self.is(k, "]") {
                return k;
            }
            k = match self.t.matching(k) {
                Some(close) if close > k => close + 1,
                _ => k + 1,
            };
        }
        n
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// Index just past a balanced `<...>` starting at `i`.
    ///
    /// `declaration` lists (after a function or class name) accept any token;
    /// otherwise only tokens that can appear in type arguments are allowed, so
    /// `a < b && c > d` is not mistaken for a type argument list.
    fn skip_angle(&self, i: usize, declaration: bool) -> Option<usize> {
        if !self.is(i, "<") {
            return None;
        }
        let n = self.t.len();
        let mut depth: i32 = 0;
        let mut k = i;
        while k < n {
            let text = self.t.text(k);
            match self.t.kind(k)? {
                TokenKind::Punct => match text {
                    "<" => depth += 1,
                    ">" => depth -= 1,
                    ">>" => depth -= 2,
                    ">>>" => depth -= 3,
                    "(" | "[" | "{" => {
                        k = self.t.matching(k)?;
                    }
                    ")" | "]" | "}" | ";" => return None,
                    "," | "." | "|" | "&" | "=>" | "?" | ":" | "-" | "..." => {}
                    "=" if declaration => {}
                    _ if declaration => {}
                    _ => return None,
                },
                TokenKind::TemplateHead => {
                    k = self.template_end(k)?;
                }
                _ => {}
            }
            if depth < 0 {
                return None;
            }
            if depth == 0 {
                return Some(k + 1);
            }
            k += 1;
        }
        None
    }

    /// Index of the tail token of a template that starts at head `i`.
    fn template_end(&self, i: usize) -> Option<usize> {
        let mut k = self.t.matching(i)?;
        while self.t.kind(k) == Some(TokenKind::TemplateMiddle) {
            k = self.t.matching(k)?;
        }
        Some(k)
    }

    /// Index just past a type starting at `i`.
    fn skip_type(&self, i: usize) -> usize {
        let mut k = i;
        if self.is(k, "|") || self.is(k, "&") {
            k += 1;
        }
        k = self.skip_type_operand(k);
        loop {
            if self.is(k, "|") || self.is(k, "&") {
                k = self.skip_type_operand(k + 1);
                continue;
            }
            if self.is(k, "extends") && !self.t.newline_before(k) {
                let check = self.skip_type_operand(k + 1);
                if self.is(check, "?") {
                    let consequent = self.skip_type(check + 1);
                    if self.is(consequent, ":") {
                        k = self.skip_type(consequent + 1);
                    } else {
                        k = consequent;
                    }
                    continue;
                }
                k = check;
                continue;
            }
            return k;
        }
    }

    fn skip_type_operand(&self, i: usize) -> usize {
        let mut k = i;
        while self.t.is_ident(k)
            && matches!(
                self.t.text(k),
                "keyof" | "unique" | "readonly" | "infer" | "asserts" | "abstract"
            )
            && self.starts_type(k + 1)
        {
            k += 1;
        }

        if self.is(k, "typeof") {
            k += 1;
            if self.is(k, "import") && self.is(k + 1, "(") {
                k = self.t.matching(k + 1).map_or(k + 1, |c| c + 1);
            } else if self.t.is_ident(k) {
                k += 1;
            }
            while self.is(k, ".") && self.t.is_ident(k + 1) {
                k += 2;
            }
            return self.skip_type_postfix(k);
        }

        if self.is(k, "new") {
            k += 1;
        }

        match self.t.kind(k) {
            Some(TokenKind::Punct) => match self.t.text(k) {
                "(" => {
                    let after = self.t.matching(k).map_or(k + 1, |c| c + 1);
                    if self.is(after, "=>") {
                        return self.skip_type(after + 1);
                    }
                    k = after;
                }
                "<" => {
                    let Some(after) = self.skip_angle(k, true) else {
                        return k;
                    };
                    if self.is(after, "(") {
                        let close = self.t.matching(after).map_or(after + 1, |c| c + 1);
                        if self.is(close, "=>") {
                            return self.skip_type(close + 1);
                        }
                        return close;
                    }
                    return after;
                }
                "[" | "{" => {
                    k = self.t.matching(k).map_or(k + 1, |c| c + 1);
                }
                "-" if self.t.kind(k + 1) == Some(TokenKind::Number) => k += 2,
                _ => return k,
            },
            Some(TokenKind::String | TokenKind::Number | TokenKind::Template) => k += 1,
            Some(TokenKind::TemplateHead) => {
                k = self.template_end(k).map_or(k + 1, |e| e + 1);
            }
            Some(TokenKind::Ident) => {
                if self.is(k, "import") && self.is(k + 1, "(") {
                    k = self.t.matching(k + 1).map_or(k + 1, |c| c + 1);
                } else {
                    k += 1;
                }
                while self.is(k, ".") && self.t.is_ident(k + 1) {
                    k += 2;
                }
                if self.is(k, "<") && !self.t.newline_before(k) {
                    if let Some(after) = self.skip_angle(k, true) {
                        k = after;
                    }
                }
                if self.is(k, "is") && !self.t.newline_before(k) {
                    return self.skip_type(k + 1);
                }
            }
            _ => return k,
        }
        self.skip_type_postfix(k)
    }

    fn skip_type_postfix(&self, mut k: usize) -> usize {
        while self.is(k, "[") && !self.t.newline_before(k) {
            k = self.t.matching(k).map_or(k + 1, |c| c + 1);
        }
        k
    }

    fn starts_type(&self, i: usize) -> bool {
        match self.t.kind(i) {
            Some(TokenKind::Ident | TokenKind::String | TokenKind::Number | TokenKind::Template) => {
                true
            }
            Some(TokenKind::TemplateHead) => true,
            Some(TokenKind::Punct) => matches!(self.t.text(i), "(" | "[" | "{" | "<" | "-"),
            _ => false,
        }
    }

    /// Remove `: Type` starting at colon `i`. Returns the index after the type.
    fn annotation(&mut self, i: usize) -> usize {
        let end = self.skip_type(i + 1);
        if end == i + 1 {
            return i + 1;
        }
        self.remove_tokens(i, end, false);
        end
    }

    // ------------------------------------------------------------------
    // Walk
    // ------------------------------------------------------------------

    fn run(&mut self) -> Result<(), CompilerError> {
        let mut i = 0;
        while i < self.t.len() {
            i = self.step(i)?;
        }
        Ok(())
    }

    fn step(&mut self, i: usize) -> Result<usize, CompilerError> {
        if self.top().decl != Decl::None
            && self.t.newline_before(i)
            && self.expr_end_before(i)
            && !self.continues(i)
        {
            self.top_mut().decl = Decl::None;
        }

        if self.top().scope == Scope::Class {
            if self.top().member_start == Some(i) {
                self.top_mut().member_start = None;
                if self.looks_like_member(i) {
                    return self.class_member(i);
                }
            } else if self.t.newline_before(i)
                && self.expr_end_before(i)
                && !self.continues(i)
                && self.looks_like_member(i)
            {
                return self.class_member(i);
            }
        }

        match self.t.kind(i) {
            Some(TokenKind::Ident) => self.word(i),
            Some(TokenKind::Punct) => self.punct(i),
            Some(TokenKind::TemplateHead) => {
                self.frames.push(Frame::new(Scope::Template));
                Ok(i + 1)
            }
            Some(TokenKind::TemplateTail) => {
                self.pop_frame();
                Ok(i + 1)
            }
            _ => Ok(i + 1),
        }
    }

    fn pop_frame(&mut self) -> Option<Frame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    fn word(&mut self, i: usize) -> Result<usize, CompilerError> {
        if self.at_statement_start(i) {
            if let Some(next) = self.statement(i)? {
                return Ok(next);
            }
        }

        let text = self.t.text(i);
        match text {
            "let" | "const" | "var"
                if self.t.is_ident(i + 1) || self.is(i + 1, "{") || self.is(i + 1, "[") =>
            {
                self.top_mut().decl = Decl::Binding;
            }
            "of" | "in" if self.top().decl == Decl::Binding => {
                self.top_mut().decl = Decl::None;
            }
            "function" => return Ok(self.function_keyword(i)),
            "class" => return Ok(self.class_keyword(i)),
            "case" => self.top_mut().cases += 1,
            "this" if self.top().scope == Scope::Paren
                && i > 0
                && self.is(i - 1, "(")
                && self.is(i + 1, ":") =>
            {
                // `this` parameter: drop it and its separating comma.
                let end = self.skip_type(i + 2);
                if self.is(end, ",") {
                    let (start, stop) = (self.t.start(i), self.t.start(end + 1));
                    self.remove(start, stop, false);
                    return Ok(end + 1);
                }
                self.remove_tokens(i, end, false);
                return Ok(end);
            }
            "import" if self.is(i + 1, "(") && self.t.is_string(i + 2) => {
                self.rewrite_specifier(i + 2);
            }
            "as" | "satisfies" if self.expr_end_before(i) && self.starts_type(i + 1) => {
                let end = self.skip_type(i + 1);
                let start = self.t.end(i - 1);
                let stop = self.t.end(end - 1);
                self.remove(start, stop, false);
                return Ok(end);
            }
            _ if ACCESSIBILITY.contains(&text)
                && self.top().scope == Scope::Paren
                && self.top().constructor
                && (self.t.is_ident(i + 1) || self.is(i + 1, "{") || self.is(i + 1, "[")) =>
            {
                return Err(self.error_at(
                    i,
                    "constructor parameter properties are not supported; declare the field and assign it in the constructor",
                ));
            }
            _ => {}
        }
        Ok(i + 1)
    }

    fn punct(&mut self, i: usize) -> Result<usize, CompilerError> {
        match self.t.text(i) {
            "?" => Ok(self.question(i)),
            "!" => Ok(self.bang(i)),
            ":" => Ok(self.colon(i)),
            "<" => Ok(self.less_than(i)),
            "=" => {
                if self.top().decl == Decl::Binding {
                    self.top_mut().decl = Decl::Init;
                }
                Ok(i + 1)
            }
            "," => {
                if self.top().decl == Decl::Init {
                    self.top_mut().decl = Decl::Binding;
                }
                Ok(i + 1)
            }
            ";" => {
                let top = self.top_mut();
                top.decl = Decl::None;
                if top.scope == Scope::Class {
                    top.member_start = Some(i + 1);
                }
                Ok(i + 1)
            }
            "(" => {
                let mut frame = Frame::new(Scope::Paren);
                frame.signature = self.signatures.remove(&i);
                frame.constructor = self.constructors.remove(&i);
                self.frames.push(frame);
                Ok(i + 1)
            }
            "[" => {
                self.frames.push(Frame::new(Scope::Bracket));
                Ok(i + 1)
            }
            "{" => {
                let scope = self.brace_scope(i);
                let mut frame = Frame::new(scope);
                if scope == Scope::Class {
                    frame.member_start = Some(i + 1);
                }
                self.frames.push(frame);
                Ok(i + 1)
            }
            ")" => {
                let frame = self.pop_frame();
                if let Some(signature) = frame.and_then(|f| f.signature) {
                    if let Some(next) = self.overload(i, signature) {
                        return Ok(next);
                    }
                }
                Ok(i + 1)
            }
            "]" => {
                self.pop_frame();
                Ok(i + 1)
            }
            "}" => {
                let frame = self.pop_frame();
                let top = self.top_mut();
                if top.scope == Scope::Class && frame.is_some_and(|f| f.scope != Scope::Class) {
                    top.member_start = Some(i + 1);
                }
                Ok(i + 1)
            }
            _ => Ok(i + 1),
        }
    }

    fn brace_scope(&self, i: usize) -> Scope {
        if self.class_bodies.contains(&i) {
            return Scope::Class;
        }
        if i == 0 {
            return Scope::Block;
        }
        let prev = i - 1;
        match self.t.kind(prev) {
            Some(TokenKind::Punct) => match self.t.text(prev) {
                ")" | "=>" | ";" | "{" | "}" => Scope::Block,
                ":" if self.top().scope == Scope::Block && !self.last_colon_ternary => Scope::Block,
                _ => Scope::Object,
            },
            Some(TokenKind::Ident) => match self.t.text(prev) {
                "return" | "typeof" | "case" | "in" | "of" | "yield" | "await" | "throw"
                | "new" | "void" | "delete" | "instanceof" | "default" => Scope::Object,
                _ => Scope::Block,
            },
            Some(TokenKind::TemplateHead | TokenKind::TemplateMiddle) => Scope::Object,
            _ => Scope::Block,
        }
    }

    fn question(&mut self, i: usize) -> usize {
        let scope = self.top().scope;
        if self.is(i + 1, ":") {
            self.remove_tokens(i, i + 1, false);
            return self.annotation(i + 1);
        }
        let optional_param = scope == Scope::Paren
            && (self.is(i + 1, ")") || self.is(i + 1, ",") || self.is(i + 1, "="));
        let optional_member = scope == Scope::Class
            && (self.is(i + 1, "(")
                || self.is(i + 1, ";")
                || self.is(i + 1, "}")
                || self.t.newline_before(i + 1));
        if optional_param || optional_member {
            self.remove_tokens(i, i + 1, false);
            return i + 1;
        }
        self.top_mut().ternaries += 1;
        i + 1
    }

    fn bang(&mut self, i: usize) -> usize {
        if self.is(i + 1, ":") && i > 0 && self.t.is_ident(i - 1) {
            self.remove_tokens(i, i + 1, false);
            return self.annotation(i + 1);
        }
        let non_null = self.expr_end_before(i)
            && !self.t.newline_before(i)
            && (i + 1 >= self.t.len()
                || [".", "?.", ")", "]", ",", ";", "[", "}", "="]
                    .iter()
                    .any(|s| self.is(i + 1, s)));
        if non_null {
            self.remove_tokens(i, i + 1, false);
        }
        i + 1
    }

    fn colon(&mut self, i: usize) -> usize {
        self.last_colon_ternary = false;
        let top = self.top_mut();
        if top.ternaries > 0 {
            top.ternaries -= 1;
            self.last_colon_ternary = true;
            return i + 1;
        }
        if top.cases > 0 {
            top.cases -= 1;
            return i + 1;
        }
        let scope = top.scope;
        let decl = top.decl;
        if decl == Decl::Binding || scope == Scope::Paren || (i > 0 && self.is(i - 1, ")")) {
            return self.annotation(i);
        }
        if scope == Scope::Class {
            return self.annotation(i);
        }
        i + 1
    }

    fn less_than(&mut self, i: usize) -> usize {
        if self.options.tsx {
            return i + 1;
        }
        let after_name = i > 0
            && self.t.is_ident(i - 1)
            && !NON_VALUE_KEYWORDS.contains(&self.t.text(i - 1));
        if after_name {
            if let Some(end) = self.skip_angle(i, false) {
                let called = self.is(end, "(")
                    || matches!(
                        self.t.kind(end),
                        Some(TokenKind::Template | TokenKind::TemplateHead)
                    );
                // `f<T>;` instantiation expressions erase the same way.
                let instantiated = end >= self.t.len()
                    || self.t.newline_before(end)
                    || [
                        ";", ")", "]", "}", ",", ".", "?.", ":", "=", "==", "===", "!=", "!==",
                        "&&", "||", "??", "?",
                    ]
                    .iter()
                    .any(|s| self.is(end, s));
                if called || instantiated {
                    self.remove_tokens(i, end, false);
                    return end;
                }
            }
            return i + 1;
        }
        if !self.expr_end_before(i) {
            // Generic arrow parameters or a `<T>expr` assertion.
            if let Some(end) = self.skip_angle(i, true) {
                self.remove_tokens(i, end, false);
                return end;
            }
        }
        i + 1
    }

    fn overload(&mut self, close: usize, signature: usize) -> Option<usize> {
        let mut k = close + 1;
        if self.is(k, ":") {
            k = self.skip_type(k + 1);
        }
        if self.is(k, "{") || self.is(k, "=>") {
            return None;
        }
        let end = if self.is(k, ";") {
            k + 1
        } else if k >= self.t.len() || self.t.newline_before(k) || self.is(k, "}") {
            k
        } else {
            return None;
        };
        self.remove_tokens(signature, end, true);
        if self.top().scope == Scope::Class {
            self.top_mut().member_start = Some(end);
        }
        Some(end)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn function_keyword(&mut self, i: usize) -> usize {
        let mut signature = i;
        if signature > 0 && self.is(signature - 1, "async") {
            signature -= 1;
        }
        if signature > 1 && self.is(signature - 1, "default") && self.is(signature - 2, "export")
        {
            signature -= 2;
        } else if signature > 0 && self.is(signature - 1, "export") {
            signature -= 1;
        }

        let mut j = i + 1;
        if self.is(j, "*") {
            j += 1;
        }
        if self.t.is_ident(j) {
            j += 1;
        }
        if let Some(end) = self.skip_angle(j, true) {
            self.remove_tokens(j, end, false);
            j = end;
        }
        if self.is(j, "(") {
            self.signatures.insert(j, signature);
        }
        j
    }

    fn class_keyword(&mut self, i: usize) -> usize {
        let mut j = i + 1;
        if self.t.is_ident(j) && !self.is(j, "extends") && !self.is(j, "implements") {
            j += 1;
        }
        if let Some(end) = self.skip_angle(j, true) {
            self.remove_tokens(j, end, false);
            j = end;
        }
        if self.is(j, "extends") {
            j += 1;
            while j < self.t.len() && !self.is(j, "{") && !self.is(j, "implements") {
                if self.is(j, "<") {
                    if let Some(end) = self.skip_angle(j, true) {
                        self.remove_tokens(j, end, false);
                        j = end;
                        continue;
                    }
                }
                j = match self.t.matching(j) {
                    Some(close) if close > j => close + 1,
                    _ => j + 1,
                };
            }
        }
        if self.is(j, "implements") {
            let mut k = j + 1;
            while k < self.t.len() && !self.is(k, "{") {
                k = self.skip_type(k);
                if self.is(k, ",") {
                    k += 1;
                } else if !self.is(k, "{") {
                    k += 1;
                }
            }
            self.remove(self.t.end(j - 1), self.t.end(k - 1), false);
            j = k;
        }
        if self.is(j, "{") {
            self.class_bodies.insert(j);
        }
        j
    }

    fn looks_like_member(&self, i: usize) -> bool {
        matches!(
            self.t.kind(i),
            Some(TokenKind::Ident | TokenKind::String | TokenKind::Number | TokenKind::PrivateName)
        ) || self.is(i, "[")
            || self.is(i, "*")
            || self.is(i, "@")
    }

    /// Index just past a class member that starts at `i`.
    fn member_end(&self, i: usize) -> usize {
        let n = self.t.len();
        let mut k = i;
        while k < n {
            if self.is(k, ";") {
                return k + 1;
            }
            if self.is(k, "}") {
                return k;
            }
            if k > i && self.t.newline_before(k) && self.is_expr_end(k - 1) && !self.continues(k)
            {
                return k;
            }
            k = match self.t.matching(k) {
                Some(close) if close > k => {
                    if self.is(k, "{") && self.is(close + 1, ";") {
                        return close + 2;
                    }
                    if self.is(k, "{") && self.is(k.saturating_sub(1), ")") {
                        return close + 1;
                    }
                    close + 1
                }
                _ => k + 1,
            };
        }
        n
    }

    fn class_member(&mut self, i: usize) -> Result<usize, CompilerError> {
        let mut j = i;
        while self.is(j, "@") {
            j += 1;
            while self.t.is_ident(j) && self.is(j + 1, ".") {
                j += 2;
            }
            if self.t.is_ident(j) {
                j += 1;
            }
            if self.is(j, "(") {
                j = self.t.matching(j).map_or(j + 1, |c| c + 1);
            }
        }
        let member = j;

        loop {
            let word = self.t.text(j);
            let is_modifier = self.t.is_ident(j) && self.names_member(j + 1);
            if !is_modifier {
                break;
            }
            match word {
                "declare" | "abstract" => {
                    let end = self.member_end(j);
                    self.remove_tokens(member, end, true);
                    self.top_mut().member_start = Some(end);
                    return Ok(end);
                }
                w if ACCESSIBILITY.contains(&w) => {
                    self.remove(self.t.start(j), self.t.start(j + 1), false);
                    j += 1;
                }
                "static" | "async" | "get" | "set" | "accessor" => j += 1,
                _ => break,
            }
        }

        if self.is(j, "[") && self.t.is_ident(j + 1) && self.is(j + 2, ":") {
            // Index signature.
            let end = self.member_end(j);
            self.remove_tokens(member, end, true);
            self.top_mut().member_start = Some(end);
            return Ok(end);
        }

        if self.is(j, "*") {
            j += 1;
        }
        if self.is(j, "{") {
            // `static { ... }` block.
            return Ok(j);
        }
        let is_constructor = self.is(j, "constructor");
        if self.is(j, "[") {
            j = self.t.matching(j).map_or(j + 1, |c| c + 1);
        } else {
            j += 1;
        }
        if self.is(j, "?") || self.is(j, "!") {
            self.remove_tokens(j, j + 1, false);
            j += 1;
        }
        if let Some(end) = self.skip_angle(j, true) {
            self.remove_tokens(j, end, false);
            j = end;
        }
        if self.is(j, "(") {
            self.signatures.insert(j, member);
            if is_constructor {
                self.constructors.insert(j);
            }
            return Ok(j);
        }
        if self.is(j, ":") {
            return Ok(self.annotation(j));
        }
        Ok(j)
    }

    /// Whether token `i` can follow a modifier, i.e. it names a member.
    fn names_member(&self, i: usize) -> bool {
        if self.t.newline_before(i) && !self.t.is_ident(i) {
            return false;
        }
        matches!(
            self.t.kind(i),
            Some(TokenKind::Ident | TokenKind::String | TokenKind::Number | TokenKind::PrivateName)
        ) || self.is(i, "[")
            || self.is(i, "*")
            || self.is(i, "{")
    }

    /// Type-only and TypeScript-only statements. `None` means ordinary code.
    fn statement(&mut self, i: usize) -> Result<Option<usize>, CompilerError> {
        match self.t.text(i) {
            "import" if !self.is(i + 1, "(") && !self.is(i + 1, ".") => {
                self.import_statement(i).map(Some)
            }
            "export" => self.export_statement(i),
            "type" if self.t.is_ident(i + 1) && (self.is(i + 2, "=") || self.is(i + 2, "<")) => {
                Ok(Some(self.type_alias(i, i)))
            }
            "interface" if self.t.is_ident(i + 1) => Ok(Some(self.interface(i, i))),
            "declare" if self.t.is_ident(i + 1) && !self.t.newline_before(i + 1) => {
                let end = self.statement_end(i + 1);
                self.remove_tokens(i, end, true);
                Ok(Some(end))
            }
            "abstract" if self.is(i + 1, "class") => {
                self.remove(self.t.start(i), self.t.start(i + 1), false);
                Ok(Some(i + 1))
            }
            "enum" if self.t.is_ident(i + 1) && self.is(i + 2, "{") => {
                Ok(Some(self.lower_enum(i, i)))
            }
            "const" if self.is(i + 1, "enum") && self.t.is_ident(i + 2) => {
                Ok(Some(self.lower_enum(i, i + 1)))
            }
            "namespace" if self.t.is_ident(i + 1) && (self.is(i + 2, "{") || self.is(i + 2, ".")) => {
                Err(self.error_at(i, "namespaces are not supported; use an ES module instead"))
            }
            "module" if (self.t.is_ident(i + 1) || self.t.is_string(i + 1)) && self.is(i + 2, "{") => {
                Err(self.error_at(i, "module declarations are not supported; use an ES module instead"))
            }
            _ => Ok(None),
        }
    }

    /// `type Name<T> = ...;` starting at `keyword`, removed from `start`.
    fn type_alias(&mut self, start: usize, keyword: usize) -> usize {
        let mut k = keyword + 2;
        if let Some(end) = self.skip_angle(k, true) {
            k = end;
        }
        if self.is(k, "=") {
            k = self.skip_type(k + 1);
        }
        if self.is(k, ";") {
            k += 1;
        }
        self.remove_tokens(start, k, true);
        k
    }

    /// `interface Name<T> extends A, B { ... }` starting at `keyword`, removed from `start`.
    fn interface(&mut self, start: usize, keyword: usize) -> usize {
        let mut k = keyword + 2;
        if let Some(end) = self.skip_angle(k, true) {
            k = end;
        }
        while k < self.t.len() && !self.is(k, "{") {
            k = match self.t.kind(k) {
                Some(TokenKind::Punct) if self.is(k, "<") => {
                    self.skip_angle(k, true).unwrap_or(k + 1)
                }
                _ => k + 1,
            };
        }
        let end = self.t.matching(k).map_or(k + 1, |c| c + 1);
        self.remove_tokens(start, end, true);
        end
    }

    fn export_statement(&mut self, i: usize) -> Result<Option<usize>, CompilerError> {
        let next = i + 1;
        match self.t.text(next) {
            "type" if self.is(next + 1, "{") || self.is(next + 1, "*") => {
                let end = self.statement_end(next);
                self.remove_tokens(i, end, true);
                Ok(Some(end))
            }
            "type" if self.t.is_ident(next + 1) => Ok(Some(self.type_alias(i, next))),
            "interface" if self.t.is_ident(next + 1) => Ok(Some(self.interface(i, next))),
            "declare" => {
                let end = self.statement_end(next + 1);
                self.remove_tokens(i, end, true);
                Ok(Some(end))
            }
            "abstract" if self.is(next + 1, "class") => {
                self.remove(self.t.start(next), self.t.start(next + 1), false);
                Ok(Some(next + 1))
            }
            "enum" if self.t.is_ident(next + 1) => Ok(Some(self.lower_enum(next, next))),
            "const" if self.is(next + 1, "enum") => Ok(Some(self.lower_enum(next, next + 1))),
            "namespace" | "module" if self.t.is_ident(next + 1) => Err(self.error_at(
                next,
                "namespaces are not supported; use an ES module instead",
            )),
            "=" => Err(self.error_at(next, "`export =` is not supported; use `export default`")),
            "import" if self.t.is_ident(next + 1) && self.is(next + 2, "=") => Err(self.error_at(
                next,
                "`export import` aliases are not supported",
            )),
            "as" if self.is(next + 1, "namespace") => {
                let end = self.statement_end(next);
                self.remove_tokens(i, end, true);
                Ok(Some(end))
            }
            "default" => {
                if self.is(next + 1, "interface") && self.t.is_ident(next + 2) {
                    return Ok(Some(self.interface(i, next + 1)));
                }
                if self.is(next + 1, "abstract") && self.is(next + 2, "class") {
                    self.remove(self.t.start(next + 1), self.t.start(next + 2), false);
                    return Ok(Some(next + 2));
                }
                Ok(Some(next + 1))
            }
            "{" => Ok(Some(self.export_clause(i, next))),
            "*" => {
                let mut k = next + 1;
                while k < self.t.len() && !self.t.is_string(k) && !self.is(k, ";") {
                    k += 1;
                }
                if self.t.is_string(k) {
                    self.rewrite_specifier(k);
                    k += 1;
                }
                Ok(Some(k))
            }
            _ => Ok(Some(next)),
        }
    }

    /// Split the specifiers between `open` and its matching `}` into
    /// `(kept, removed_any)`, where each kept item is `(first, last)` token indices.
    fn clause_specifiers(&self, open: usize) -> (Vec<(usize, usize)>, bool, usize) {
        let close = self.t.matching(open).unwrap_or(open);
        let mut kept = Vec::new();
        let mut removed = false;
        let mut k = open + 1;
        while k < close {
            let first = k;
            while k < close && !self.is(k, ",") {
                k += 1;
            }
            let last = k - 1;
            if last >= first {
                let len = last - first + 1;
                let type_only = self.is(first, "type")
                    && len >= 2
                    && !(len == 3 && self.is(first + 1, "as"));
                if type_only {
                    removed = true;
                } else {
                    kept.push((first, last));
                }
            }
            k += 1;
        }
        (kept, removed, close)
    }

    fn render_clause(&self, kept: &[(usize, usize)]) -> String {
        let parts: Vec<&str> = kept
            .iter()
            .map(|(first, last)| &self.t.src[self.t.start(*first)..self.t.end(*last)])
            .collect();
        if parts.is_empty() {
            "{}".to_string()
        } else {
            format!("{{ {} }}", parts.join(", "))
        }
    }

    fn export_clause(&mut self, i: usize, open: usize) -> usize {
        let (kept, removed, close) = self.clause_specifiers(open);
        let mut k = close + 1;
        let has_from = self.is(k, "from") && self.t.is_string(k + 1);
        if has_from {
            self.rewrite_specifier(k + 1);
            k += 2;
        }
        if self.is(k, ";") {
            k += 1;
        }
        if removed {
            if kept.is_empty() && !has_from {
                self.remove_tokens(i, k, true);
            } else {
                let text = self.render_clause(&kept);
                self.replace(self.t.start(open), self.t.end(close), text);
            }
        }
        k
    }

    fn import_statement(&mut self, i: usize) -> Result<usize, CompilerError> {
        let mut k = i + 1;
        if self.t.is_string(k) {
            self.rewrite_specifier(k);
            return Ok(self.after_import_source(k + 1));
        }

        if self.is(k, "type")
            && !self.is(k + 1, ",")
            && !(self.is(k + 1, "from") && self.t.is_string(k + 2))
        {
            let end = self.statement_end(k);
            self.remove_tokens(i, end, true);
            return Ok(end);
        }

        if self.t.is_ident(k) && self.is(k + 1, "=") {
            return Err(self.error_at(
                i,
                "`import x = require()` is not supported; use an ES import",
            ));
        }

        let mut default_import = None;
        if self.t.is_ident(k) && !self.is(k, "from") {
            default_import = Some(k);
            k += 1;
            if self.is(k, ",") {
                k += 1;
            }
        } else if self.t.is_ident(k) && self.is(k, "from") && self.is(k + 1, "from") {
            // `import from from "x"`
            default_import = Some(k);
            k += 1;
        }

        if self.is(k, "*") {
            k += 3;
        } else if self.is(k, "{") {
            let (kept, removed, close) = self.clause_specifiers(k);
            if removed {
                if kept.is_empty() {
                    match default_import {
                        // `import D, { type T } from` -> `import D from`
                        Some(d) => self.remove(self.t.end(d), self.t.end(close), false),
                        // `import { type T } from "m"` -> `import "m"`
                        None => {
                            let source = close + 2;
                            if self.t.is_string(source) {
                                self.remove(self.t.start(k), self.t.start(source), false);
                            }
                        }
                    }
                } else {
                    let text = self.render_clause(&kept);
                    self.replace(self.t.start(k), self.t.end(close), text);
                }
            }
            k = close + 1;
        }

        if self.is(k, "from") && self.t.is_string(k + 1) {
            self.rewrite_specifier(k + 1);
            return Ok(self.after_import_source(k + 2));
        }
        Ok(k)
    }

    /// Skip import attributes and a trailing semicolon.
    fn after_import_source(&self, mut k: usize) -> usize {
        if (self.is(k, "with") || self.is(k, "assert")) && self.is(k + 1, "{") {
            k = self.t.matching(k + 1).map_or(k + 2, |c| c + 1);
        }
        if self.is(k, ";") {
            k += 1;
        }
        k
    }

    fn rewrite_specifier(&mut self, i: usize) {
        if !self.options.rewrite_import_extensions {
            return;
        }
        let Some(value) = self.t.string_value(i) else {
            return;
        };
        let Some(rewritten) = erased_specifier(&value) else {
            return;
        };
        let raw = self.t.text(i);
        let quote = &raw[..1];
        let escaped = rewritten.replace('\\', "\\\\").replace(quote, &format!("\\{quote}"));
        self.replace(
            self.t.start(i),
            self.t.end(i),
            format!("{quote}{escaped}{quote}"),
        );
    }

    /// Lower `enum Name { ... }` (with optional leading `const`) to an IIFE.
    fn lower_enum(&mut self, start: usize, keyword: usize) -> usize {
        let name_idx = keyword + 1;
        let name = self.t.text(name_idx).to_string();
        let open = name_idx + 1;
        let Some(close) = self.t.matching(open) else {
            return open;
        };

        let mut members: Vec<String> = Vec::new();
        let mut body = String::new();
        let mut next_value: Option<i64> = Some(0);
        let mut k = open + 1;
        while k < close {
            let member = if self.t.is_string(k) {
                self.t.string_value(k).unwrap_or_default()
            } else {
                self.t.text(k).to_string()
            };
            k += 1;
            let key = serde_json::to_string(&member).unwrap_or_default();

            if self.is(k, "=") {
                let init_start = k + 1;
                let mut end = init_start;
                while end < close && !self.is(end, ",") {
                    end = match self.t.matching(end) {
                        Some(c) if c > end => c + 1,
                        _ => end + 1,
                    };
                }
                let init = self.enum_initializer(init_start, end, &name, &members);
                if self.t.is_string(init_start) && end == init_start + 1 {
                    let _ = writeln!(body, "  {name}[{key}] = {init};");
                    next_value = None;
                } else {
                    let _ = writeln!(body, "  {name}[{name}[{key}] = {init}] = {key};");
                    next_value = init.trim().parse::<i64>().ok().map(|v| v + 1);
                }
                k = end;
            } else {
                let value = match (next_value, members.last()) {
                    (Some(v), _) => v.to_string(),
                    (None, Some(prev)) => {
                        format!("{name}[{}] + 1", serde_json::to_string(prev).unwrap_or_default())
                    }
                    (None, None) => "0".to_string(),
                };
                let _ = writeln!(body, "  {name}[{name}[{key}] = {value}] = {key};");
                next_value = next_value.map(|v| v + 1);
            }
            members.push(member);
            if self.is(k, ",") {
                k += 1;
            }
        }

        let code = format!("var {name};\n(function ({name}) {{\n{body}}})({name} || ({name} = {{}}));");
        self.replace(self.t.start(start), self.t.end(close), code);
        close + 1
    }

    /// Initializer text with references to earlier members qualified by the enum name.
    fn enum_initializer(&self, first: usize, end: usize, name: &str, members: &[String]) -> String {
        if first >= end {
            return String::new();
        }
        let mut out = String::new();
        let mut cursor = self.t.start(first);
        for k in first..end {
            let text = self.t.text(k);
            let qualify = self.t.is_ident(k)
                && members.iter().any(|m| m == text)
                && !(k > first && self.is(k - 1, "."));
            if qualify {
                out.push_str(&self.t.src[cursor..self.t.start(k)]);
                let _ = write!(out, "{name}.{text}");
                cursor = self.t.end(k);
            }
        }
        out.push_str(&self.t.src[cursor..self.t.end(end - 1)]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(src: &str) -> String {
        strip_types(src, "/test.ts", &StripOptions::default()).unwrap()
    }

    fn squash(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_variable_annotation() {
        assert_eq!(
            strip("let x: number = 1; console.log(x)"),
            "let x = 1; console.log(x)"
        );
    }

    #[test]
    fn test_multiple_declarators_and_destructuring() {
        assert_eq!(
            strip("const a: A = 1, b: Array<B> = [], { c: d }: Obj = o;"),
            "const a = 1, b = [], { c: d } = o;"
        );
    }

    #[test]
    fn test_function_params_and_return_type() {
        assert_eq!(
            strip("function add(a: number, b?: number): number { return a + (b ?? 0); }"),
            "function add(a, b) { return a + (b ?? 0); }"
        );
    }

    #[test]
    fn test_this_parameter_removed() {
        assert_eq!(
            strip("function g(this: Window, a?: number) { return a; }"),
            "function g(a) { return a; }"
        );
        assert_eq!(
            strip("function h(this: { n: number }) { return this.n; }"),
            "function h() { return this.n; }"
        );
        assert_eq!(strip("call(this, a);"), "call(this, a);");
    }

    #[test]
    fn test_arrow_function_types() {
        assert_eq!(
            strip("const f = (a: string, cb: (e: Error) => void): Promise<void> => cb(a);"),
            "const f = (a, cb) => cb(a);"
        );
    }

    #[test]
    fn test_ternary_and_object_literals_untouched() {
        let src = "const o = { a: 1, b: ok ? x : y }; label: for (;;) { break label; }";
        assert_eq!(strip(src), src);
    }

    #[test]
    fn test_switch_case_colons_untouched() {
        let src = "switch (k) { case f(): break; default: g(); }";
        assert_eq!(strip(src), src);
    }

    #[test]
    fn test_interface_and_type_alias_removed() {
        let out = strip("interface User {\n  name: string;\n}\ntype Id = string | number;\nconst u = 1;");
        assert!(!out.contains("interface"));
        assert!(!out.contains("type Id"));
        assert!(out.contains("const u = 1;"));
        // Line structure is preserved for removed statements.
        assert_eq!(out.matches('\n').count(), 4);
    }

    #[test]
    fn test_type_only_imports() {
        assert_eq!(
            squash(&strip("import { type A, B } from \"m\";")),
            "import { B } from \"m\";"
        );
        assert_eq!(strip("import type { A } from './a';\nx();"), "\nx();");
        assert_eq!(
            squash(&strip("import { type A } from \"m\";")),
            "import \"m\";"
        );
        assert_eq!(
            squash(&strip("import D, { type A } from \"m\";")),
            "import D from \"m\";"
        );
    }

    #[test]
    fn test_value_imports_are_kept_even_if_unused() {
        let src = "import { unused } from \"m\";\nimport type from \"./type.js\";";
        assert_eq!(strip(src), src);
    }

    #[test]
    fn test_import_extensions_rewritten() {
        assert_eq!(
            strip("import { a } from './a.ts';\nexport * from \"../b.mts\";\nimport('./c.tsx');"),
            "import { a } from './a.js';\nexport * from \"../b.mjs\";\nimport('./c.js');"
        );
        assert_eq!(strip("import x from 'pkg.ts';"), "import x from 'pkg.ts';");
    }

    #[test]
    fn test_export_type_forms() {
        let out = strip("export type { A } from './a';\nexport interface I { a: 1 }\nexport type T = 1;\nexport const v: T = 1;");
        assert_eq!(squash(&out), "export const v = 1;");

        assert_eq!(
            squash(&strip("export { type A, b as c };")),
            "export { b as c };"
        );
    }

    #[test]
    fn test_as_and_satisfies() {
        assert_eq!(
            strip("const a = (x as unknown as string).length; const b = {} satisfies Obj;"),
            "const a = (x).length; const b = {};"
        );
        assert_eq!(strip("const c = [1] as const;"), "const c = [1];");
    }

    #[test]
    fn test_non_null_and_definite_assignment() {
        assert_eq!(
            strip("let el!: HTMLElement; el = doc.get()!.parent!;"),
            "let el; el = doc.get().parent;"
        );
        assert_eq!(strip("if (!a) b = !c;"), "if (!a) b = !c;");
    }

    #[test]
    fn test_generics() {
        assert_eq!(
            strip("function id<T extends object = {}>(x: T): T { return x; }"),
            "function id(x) { return x; }"
        );
        assert_eq!(
            strip("const m = new Map<string, Array<number>>(); f<T>(1);"),
            "const m = new Map(); f(1);"
        );
        assert_eq!(strip("const g = <T,>(x: T) => x;"), "const g = (x) => x;");
        assert_eq!(strip("const g = f<string>;"), "const g = f;");
        assert_eq!(
            strip("const h = make<number, string>\nh(1);"),
            "const h = make\nh(1);"
        );
        assert_eq!(strip("use(f<A>, g<B>);"), "use(f, g);");
        assert_eq!(strip("const c = a < b > d;"), "const c = a < b > d;");
        assert_eq!(strip("if (a < b && c > d) {}"), "if (a < b && c > d) {}");
        assert_eq!(strip("for (let i = 0; i < n; i++) {}"), "for (let i = 0; i < n; i++) {}");
    }

    #[test]
    fn test_class_members() {
        let src = "abstract class A<T> extends Base<T> implements I, J<T> {\n  private readonly x: number = 1;\n  declare y: string;\n  z?: T;\n  static w!: T;\n  abstract m(): void;\n  public get v(): number { return this.x; }\n  [key: string]: unknown;\n  run<U>(a: U): U { return a; }\n}";
        let out = squash(&strip(src));
        assert_eq!(
            out,
            "class A extends Base { x = 1; z; static w; get v() { return this.x; } run(a) { return a; } }"
        );
    }

    #[test]
    fn test_overloads_removed() {
        let src = "function f(a: string): string;\nfunction f(a: number): number;\nfunction f(a: any) { return a; }";
        assert_eq!(squash(&strip(src)), "function f(a) { return a; }");

        let src = "class C {\n  m(a: string): void;\n  m(a: any) {}\n}";
        assert_eq!(squash(&strip(src)), "class C { m(a) {} }");
    }

    #[test]
    fn test_declare_statements_removed() {
        let out = strip("declare const VERSION: string;\ndeclare module 'x' {\n  export const a: number;\n}\nconsole.log(1);");
        assert_eq!(squash(&out), "console.log(1);");
    }

    #[test]
    fn test_enum_lowering() {
        let out = strip("export enum Color { Red, Green = 5, Blue, Label = \"l\", Twice = Green * 2 }");
        assert!(out.starts_with("export var Color;"));
        assert!(out.contains("Color[Color[\"Red\"] = 0] = \"Red\";"));
        assert!(out.contains("Color[Color[\"Blue\"] = 6] = \"Blue\";"));
        assert!(out.contains("Color[\"Label\"] = \"l\";"));
        assert!(out.contains("Color[Color[\"Twice\"] = Color.Green * 2] = \"Twice\";"));
        assert!(out.ends_with("})(Color || (Color = {}));"));
    }

    #[test]
    fn test_strings_templates_and_regex_are_opaque() {
        let src = "const s = \"a: number\"; const t = `x: ${y as string}`; const r = /a: b/;";
        assert_eq!(
            strip(src),
            "const s = \"a: number\"; const t = `x: ${y}`; const r = /a: b/;"
        );
    }

    #[test]
    fn test_optional_chaining_untouched() {
        let src = "const v = a?.b ?? c?.[0];";
        assert_eq!(strip(src), src);
    }

    #[test]
    fn test_namespace_is_rejected_with_diagnostic() {
        let err = strip_types("const a = 1;\nnamespace NS { }", "/ns.ts", &StripOptions::default())
            .unwrap_err();
        assert_eq!(err.code, "UNSUPPORTED_SYNTAX");
        let diag = &err.diagnostics[0];
        assert_eq!(diag.line, 2);
        assert_eq!(diag.column, 1);
        assert!(diag.frame.contains("namespace NS"));
    }

    #[test]
    fn test_parameter_properties_are_rejected() {
        let err = strip_types(
            "class P { constructor(private x: number) {} }",
            "/p.ts",
            &StripOptions::default(),
        )
        .unwrap_err();
        assert!(err.message.contains("parameter properties"));
    }

    #[test]
    fn test_syntax_error_has_diagnostic() {
        let err = strip_types("let s = 'open\n", "/bad.ts", &StripOptions::default()).unwrap_err();
        assert_eq!(err.code, "SYNTAX_ERROR");
        assert_eq!(err.diagnostics[0].file.as_deref(), Some("/bad.ts"));
    }

    #[test]
    fn test_is_typed() {
        assert!(is_typed("/a.ts"));
        assert!(is_typed("/a.tsx"));
        assert!(is_typed("https://esm.sh/x/index.mts?external=*"));
        assert!(!is_typed("/a.d.ts"));
        assert!(!is_typed("/a.d.mts?x"));
        assert!(is_declaration("/types/index.d.ts"));
        assert!(!is_declaration("/a.ts"));
        assert!(!is_typed("/a.js"));
    }

    #[test]
    fn test_erased_specifier() {
        assert_eq!(erased_specifier("./a.ts").as_deref(), Some("./a.js"));
        assert_eq!(erased_specifier("/x/b.cts").as_deref(), Some("/x/b.cjs"));
        assert_eq!(erased_specifier("react"), None);
        assert_eq!(erased_specifier("./types.d.ts"), None);
    }
}
