//! Import binding references.
//!
//! Finds every place a module reads one of its imported bindings so the
//! emitter can turn `count` into `__ns1.count`, which keeps ES module live
//! bindings intact. Works on tokens with a light scope model: function,
//! arrow, block, `for` and `catch` scopes, with `var` hoisted to the
//! enclosing function. A name re-declared in an inner scope shadows the
//! import there.

use std::ops::Range;

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use crate::compiler::esm::{declarator_names, pattern_names, skip_initializer};
use crate::compiler::lexer::{SourceTokens, TokenKind};

/// One read of an imported binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Byte span of the identifier.
    pub span: Range<usize>,
    pub name: String,
    /// `{ name }` object shorthand; the rewrite must keep `name: ` in front.
    pub shorthand: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Brace {
    Block,
    Object,
    Class,
    Function,
}

#[derive(Debug)]
struct Scope {
    /// First and last token, inclusive.
    start: usize,
    end: usize,
    function: bool,
    names: Vec<String>,
}

/// Statement keywords whose parenthesized head is followed by a block.
const BLOCK_HEADS: &[&str] = &["if", "for", "while", "switch", "catch", "with"];

/// Keywords after which `{` starts an object literal or pattern.
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "in", "of", "new", "delete", "void", "throw", "yield", "await",
    "instanceof", "default", "let", "const", "var",
];

/// Tokens that can precede a class member name.
const MEMBER_PREFIXES: &[&str] = &["{", ";", "}", "static", "get", "set", "async", "accessor"];

/// References to `names` in `t`, ignoring tokens that start inside `skip`.
pub fn references(
    t: &SourceTokens<'_>,
    names: &HashSet<&str>,
    skip: &[Range<usize>],
) -> Vec<Reference> {
    if names.is_empty() {
        return Vec::new();
    }
    let scopes = Scopes::build(t);
    let mut out = Vec::new();
    for i in 0..t.len() {
        if !t.is_ident(i) || !names.contains(t.text(i)) {
            continue;
        }
        let start = t.start(i);
        if skip.iter().any(|r| r.contains(&start)) {
            continue;
        }
        let Some(shorthand) = scopes.reference_kind(i) else {
            continue;
        };
        if scopes.shadowed(i, t.text(i)) {
            continue;
        }
        out.push(Reference {
            span: start..t.end(i),
            name: t.text(i).to_string(),
            shorthand,
        });
    }
    out
}

struct Scopes<'t, 'a> {
    t: &'t SourceTokens<'a>,
    /// Kind of every `{`, by token index.
    braces: HashMap<usize, Brace>,
    /// Innermost open bracket around each token.
    parent: Vec<Option<usize>>,
    scopes: Vec<Scope>,
}

impl<'t, 'a> Scopes<'t, 'a> {
    fn build(t: &'t SourceTokens<'a>) -> Self {
        let mut this = Self {
            t,
            braces: HashMap::default(),
            parent: vec![None; t.len()],
            scopes: Vec::new(),
        };
        this.link_parents();
        this.classify_braces();
        this.collect_scopes();
        this.collect_declarations();
        this
    }

    fn is_member_access(&self, i: usize) -> bool {
        i > 0 && (self.t.is(i - 1, ".") || self.t.is(i - 1, "?."))
    }

    fn link_parents(&mut self) {
        let t = self.t;
        let mut stack: Vec<usize> = Vec::new();
        for i in 0..t.len() {
            let kind = t.kind(i);
            let punct = kind == Some(TokenKind::Punct);
            let closes = (punct && matches!(t.text(i), ")" | "]" | "}"))
                || matches!(kind, Some(TokenKind::TemplateMiddle | TokenKind::TemplateTail));
            if closes {
                stack.pop();
            }
            self.parent[i] = stack.last().copied();
            let opens = (punct && matches!(t.text(i), "(" | "[" | "{"))
                || matches!(kind, Some(TokenKind::TemplateHead | TokenKind::TemplateMiddle));
            if opens {
                stack.push(i);
            }
        }
    }

    fn parent_brace(&self, i: usize) -> Option<Brace> {
        self.parent[i].and_then(|p| self.braces.get(&p).copied())
    }

    /// Classify every `{` in one forward pass; a brace's parent is always
    /// classified before the brace itself.
    fn classify_braces(&mut self) {
        let t = self.t;
        let mut class_bodies: HashSet<usize> = HashSet::default();
        let mut label_colons: HashSet<usize> = HashSet::default();

        for i in 0..t.len() {
            if self.is_member_access(i) {
                continue;
            }
            let in_block = matches!(self.parent_brace(i), None | Some(Brace::Block | Brace::Function))
                && self.parent[i].map_or(true, |p| t.is(p, "{"));
            if t.is(i, "class") {
                if let Some(body) = self.class_body(i) {
                    class_bodies.insert(body);
                }
            } else if t.is(i, "case") && in_block {
                if let Some(colon) = self.case_colon(i) {
                    label_colons.insert(colon);
                }
            } else if t.is(i, "default") && t.is(i + 1, ":") && in_block {
                label_colons.insert(i + 1);
            } else if t.is(i, "{") {
                let kind = if class_bodies.contains(&i) {
                    Brace::Class
                } else {
                    self.brace_after(i, &label_colons)
                };
                self.braces.insert(i, kind);
            }
        }
    }

    fn class_body(&self, class: usize) -> Option<usize> {
        let t = self.t;
        let mut k = class + 1;
        while k < t.len() {
            if t.is(k, "{") {
                return Some(k);
            }
            if t.is(k, ";") || t.is(k, "}") || t.is(k, ")") || t.is(k, "]") || t.is(k, ":") {
                return None;
            }
            k = match t.matching(k) {
                Some(close) if close > k => close + 1,
                _ => k + 1,
            };
        }
        None
    }

    /// The `:` ending `case <expr>:`, skipping conditional expressions.
    fn case_colon(&self, case: usize) -> Option<usize> {
        let t = self.t;
        let mut pending = 0usize;
        let mut k = case + 1;
        while k < t.len() {
            if t.is(k, "?") {
                pending += 1;
            } else if t.is(k, ":") {
                if pending == 0 {
                    return Some(k);
                }
                pending -= 1;
            } else if t.is(k, ";") || t.is(k, "}") {
                return None;
            }
            k = match t.matching(k) {
                Some(close) if close > k => close + 1,
                _ => k + 1,
            };
        }
        None
    }

    fn brace_after(&self, i: usize, label_colons: &HashSet<usize>) -> Brace {
        let t = self.t;
        let Some(p) = i.checked_sub(1) else {
            return Brace::Block;
        };
        match t.kind(p) {
            Some(TokenKind::Punct) => match t.text(p) {
                ")" => {
                    let head = t.matching(p).and_then(|open| open.checked_sub(1));
                    match head {
                        Some(h) if t.is_ident(h) && BLOCK_HEADS.contains(&t.text(h)) => Brace::Block,
                        Some(h) if t.is(h, "await") && h > 0 && t.is(h - 1, "for") => Brace::Block,
                        _ => Brace::Function,
                    }
                }
                "=>" => Brace::Function,
                ";" | "{" | "}" => Brace::Block,
                ":" if label_colons.contains(&p) => Brace::Block,
                _ => Brace::Object,
            },
            Some(TokenKind::Ident) if EXPRESSION_KEYWORDS.contains(&t.text(p)) => Brace::Object,
            Some(TokenKind::TemplateHead | TokenKind::TemplateMiddle) => Brace::Object,
            _ => Brace::Block,
        }
    }

    fn collect_scopes(&mut self) {
        let t = self.t;
        for i in 0..t.len() {
            if t.is(i, "{") {
                let Some(close) = t.matching(i) else {
                    continue;
                };
                match self.braces.get(&i).copied() {
                    Some(Brace::Block) => self.scopes.push(Scope {
                        start: i,
                        end: close,
                        function: false,
                        names: Vec::new(),
                    }),
                    Some(Brace::Function) if i > 0 && t.is(i - 1, ")") => {
                        if let Some(open) = t.matching(i - 1) {
                            let mut names = self.params(open);
                            names.extend(self.function_name(open));
                            self.scopes.push(Scope {
                                start: open,
                                end: close,
                                function: true,
                                names,
                            });
                        }
                    }
                    _ => {}
                }
            } else if t.is(i, "=>") {
                self.arrow_scope(i);
            } else if (t.is(i, "for") || t.is(i, "catch")) && !self.is_member_access(i) {
                let open = if t.is(i + 1, "await") { i + 2 } else { i + 1 };
                if !t.is(open, "(") {
                    continue;
                }
                let Some(close) = t.matching(open) else {
                    continue;
                };
                let end = if t.is(close + 1, "{") {
                    t.matching(close + 1).unwrap_or(close)
                } else {
                    skip_initializer(t, close + 1)
                };
                let names = if t.is(i, "catch") {
                    self.params(open)
                } else {
                    Vec::new()
                };
                self.scopes.push(Scope {
                    start: open,
                    end,
                    function: false,
                    names,
                });
            }
        }
    }

    /// Names bound by the parameter list opening at `open`.
    fn params(&self, open: usize) -> Vec<String> {
        let t = self.t;
        let mut names = Vec::new();
        let Some(close) = t.matching(open) else {
            return names;
        };
        let mut k = open + 1;
        while k < close {
            if t.is(k, "...") {
                k += 1;
            }
            let next = pattern_names(t, k, &mut names);
            k = if t.is(next, "=") {
                skip_initializer(t, next + 1)
            } else {
                next
            };
            if k < close {
                k += 1;
            }
        }
        names
    }

    /// `name` in `function name(` or `function* name(`.
    fn function_name(&self, open: usize) -> Option<String> {
        let t = self.t;
        let name = open.checked_sub(1)?;
        let before = name.checked_sub(1)?;
        let is_function = t.is(before, "function")
            || (t.is(before, "*") && before > 0 && t.is(before - 1, "function"));
        (t.is_ident(name) && is_function).then(|| t.text(name).to_string())
    }

    fn arrow_scope(&mut self, arrow: usize) {
        let t = self.t;
        let Some(before) = arrow.checked_sub(1) else {
            return;
        };
        let (start, names) = if t.is(before, ")") {
            let Some(open) = t.matching(before) else {
                return;
            };
            (open, self.params(open))
        } else if t.is_ident(before) {
            (before, vec![t.text(before).to_string()])
        } else {
            return;
        };
        let end = if t.is(arrow + 1, "{") {
            t.matching(arrow + 1).unwrap_or(arrow + 1)
        } else {
            skip_initializer(t, arrow + 1).saturating_sub(1)
        };
        self.scopes.push(Scope {
            start,
            end,
            function: true,
            names,
        });
    }

    fn at_statement_start(&self, i: usize) -> bool {
        let t = self.t;
        let i = if i > 0 && t.is(i - 1, "async") { i - 1 } else { i };
        i == 0
            || t.is(i - 1, ";")
            || t.is(i - 1, "{")
            || t.is(i - 1, "}")
            || t.is(i - 1, "export")
    }

    fn collect_declarations(&mut self) {
        let t = self.t;
        let mut found: Vec<(usize, bool, Vec<String>)> = Vec::new();
        for i in 0..t.len() {
            if !t.is_ident(i) || self.is_member_access(i) {
                continue;
            }
            match t.text(i) {
                keyword @ ("let" | "const" | "var")
                    if t.is_ident(i + 1) || t.is(i + 1, "{") || t.is(i + 1, "[") =>
                {
                    found.push((i, keyword == "var", declarator_names(t, i + 1)));
                }
                "function" | "class" if self.at_statement_start(i) => {
                    let name = if t.is(i + 1, "*") { i + 2 } else { i + 1 };
                    if t.is_ident(name) {
                        found.push((i, false, vec![t.text(name).to_string()]));
                    }
                }
                _ => {}
            }
        }
        for (at, hoisted, names) in found {
            if let Some(scope) = self.innermost(at, hoisted) {
                self.scopes[scope].names.extend(names);
            }
        }
    }

    fn innermost(&self, at: usize, function_only: bool) -> Option<usize> {
        self.scopes
            .iter()
            .enumerate()
            .filter(|(_, s)| s.start <= at && at <= s.end && (!function_only || s.function))
            .max_by_key(|(_, s)| s.start)
            .map(|(index, _)| index)
    }

    fn shadowed(&self, i: usize, name: &str) -> bool {
        self.scopes
            .iter()
            .any(|s| s.start <= i && i <= s.end && s.names.iter().any(|n| n == name))
    }

    fn member_start(&self, i: usize) -> bool {
        let t = self.t;
        let Some(p) = i.checked_sub(1) else {
            return false;
        };
        if MEMBER_PREFIXES.iter().any(|m| t.is(p, m)) || (t.is(p, "*") && t.is(i + 1, "(")) {
            return true;
        }
        t.newline_before(i)
            && (matches!(
                t.kind(p),
                Some(
                    TokenKind::Ident
                        | TokenKind::Number
                        | TokenKind::String
                        | TokenKind::Template
                        | TokenKind::TemplateTail
                        | TokenKind::Regex
                )
            ) || t.is(p, ")")
                || t.is(p, "]"))
    }

    /// `Some(shorthand)` when the identifier at `i` reads a binding, `None`
    /// for property names, member names, labels and declared names.
    fn reference_kind(&self, i: usize) -> Option<bool> {
        let t = self.t;
        if self.is_member_access(i) {
            return None;
        }
        let prev = i.checked_sub(1);
        let prev_is = |s: &str| prev.is_some_and(|p| t.is(p, s));
        if prev_is("function") || prev_is("class") || prev_is("break") || prev_is("continue") {
            return None;
        }
        if prev_is("*") && i >= 2 && t.is(i - 2, "function") {
            return None;
        }

        match self.parent_brace(i) {
            Some(Brace::Object) => {
                let after_separator = prev_is("{") || prev_is(",");
                let after_modifier = prev.is_some_and(|p| {
                    matches!(t.text(p), "get" | "set" | "async" | "*")
                        && p > 0
                        && (t.is(p - 1, "{") || t.is(p - 1, ","))
                });
                if (after_separator || after_modifier) && (t.is(i + 1, ":") || t.is(i + 1, "(")) {
                    return None;
                }
                if after_separator && (t.is(i + 1, ",") || t.is(i + 1, "}")) {
                    return Some(true);
                }
                if after_separator && t.is(i + 1, "=") {
                    return None;
                }
            }
            Some(Brace::Class) if self.member_start(i) => return None,
            Some(Brace::Class) => {}
            _ => {
                let statement_start = prev.is_none() || prev_is(";") || prev_is("{") || prev_is("}");
                if statement_start && t.is(i + 1, ":") {
                    return None;
                }
            }
        }
        Some(false)
    }
}
