//! ES module syntax analysis.
//!
//! Finds top-level `import`/`export` statements and `import("literal")` calls
//! and records what each one binds, with byte spans so the bundler can rewrite
//! them. Declarations themselves are left alone: for `export const x = 1` only
//! the `export` keyword span is recorded.

use std::ops::Range;

use super::lexer::{LexError, SourceTokens, TokenKind};

/// A name bound by an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportBinding {
    /// `import local from "m"`
    Default(String),
    /// `import * as local from "m"`
    Namespace(String),
    /// `import { imported as local } from "m"`
    Named { imported: String, local: String },
}

/// One top-level module statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleStatement {
    /// `import ... from "m"` or `import "m"`; `bindings` is empty for the latter.
    Import {
        span: Range<usize>,
        specifier: String,
        bindings: Vec<ImportBinding>,
    },
    /// `export const|let|var|function|class ...`; `keyword` covers `export `.
    Declaration {
        keyword: Range<usize>,
        names: Vec<String>,
    },
    /// `export default function name` / `export default class Name`.
    DefaultDeclaration { keyword: Range<usize>, name: String },
    /// `export default <expression>` (including anonymous functions and classes).
    DefaultExpression { keyword: Range<usize> },
    /// `export { local as exported }`
    Named {
        span: Range<usize>,
        specifiers: Vec<(String, String)>,
    },
    /// `export { imported as exported } from "m"`
    NamedFrom {
        span: Range<usize>,
        specifier: String,
        specifiers: Vec<(String, String)>,
    },
    /// `export * from "m"` or `export * as alias from "m"`
    All {
        span: Range<usize>,
        specifier: String,
        alias: Option<String>,
    },
}

impl ModuleStatement {
    /// The module this statement loads, if any.
    #[must_use]
    pub fn specifier(&self) -> Option<&str> {
        match self {
            Self::Import { specifier, .. }
            | Self::NamedFrom { specifier, .. }
            | Self::All { specifier, .. } => Some(specifier),
            _ => None,
        }
    }
}

/// `import("literal")`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicImport {
    /// From `import` through the closing parenthesis.
    pub span: Range<usize>,
    pub specifier: String,
}

/// Everything the bundler needs to know about a module's imports and exports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSyntax {
    pub statements: Vec<ModuleStatement>,
    pub dynamic_imports: Vec<DynamicImport>,
}

impl ModuleSyntax {
    /// Whether the module uses ES module syntax at all.
    #[must_use]
    pub fn is_esm(&self) -> bool {
        !self.statements.is_empty()
    }

    /// Static dependency specifiers in source order, without duplicates.
    #[must_use]
    pub fn static_specifiers(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for spec in self.statements.iter().filter_map(ModuleStatement::specifier) {
            if !seen.contains(&spec) {
                seen.push(spec);
            }
        }
        seen
    }

    /// Names this module exports itself, excluding `export *`.
    #[must_use]
    pub fn exported_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for stmt in &self.statements {
            match stmt {
                ModuleStatement::Declaration { names: n, .. } => names.extend(n.iter().cloned()),
                ModuleStatement::DefaultDeclaration { .. }
                | ModuleStatement::DefaultExpression { .. } => names.push("default".to_string()),
                ModuleStatement::Named { specifiers, .. }
                | ModuleStatement::NamedFrom { specifiers, .. } => {
                    names.extend(specifiers.iter().map(|(_, exported)| exported.clone()));
                }
                ModuleStatement::All {
                    alias: Some(alias), ..
                } => names.push(alias.clone()),
                _ => {}
            }
        }
        names
    }
}

/// Keywords that start a new statement after a line break.
const STATEMENT_KEYWORDS: &[&str] = &[
    "export", "import", "const", "let", "var", "function", "class", "if", "for", "while", "do",
    "return", "throw", "try", "switch", "async",
];

/// Analyze `source`.
pub fn analyze(source: &str) -> Result<ModuleSyntax, LexError> {
    let t = SourceTokens::new(source)?;
    let mut syntax = ModuleSyntax::default();
    let mut depth: usize = 0;
    let mut i = 0;

    while i < t.len() {
        let after_dot = i > 0 && (t.is(i - 1, ".") || t.is(i - 1, "?."));
        if t.is(i, "import") && !after_dot {
            if t.is(i + 1, "(") {
                if let Some(dynamic) = dynamic_import(&t, i) {
                    syntax.dynamic_imports.push(dynamic);
                }
            } else if depth == 0 && !t.is(i + 1, ".") {
                if let Some((stmt, next)) = import_statement(&t, i) {
                    syntax.statements.push(stmt);
                    i = next;
                    continue;
                }
            }
        } else if t.is(i, "export") && depth == 0 && !after_dot {
            if let Some((stmt, next)) = export_statement(&t, i) {
                syntax.statements.push(stmt);
                i = next;
                continue;
            }
        }

        match t.kind(i) {
            Some(TokenKind::Punct) => match t.text(i) {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                _ => {}
            },
            Some(TokenKind::TemplateHead) => depth += 1,
            Some(TokenKind::TemplateTail) => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
    Ok(syntax)
}

fn dynamic_import(t: &SourceTokens<'_>, i: usize) -> Option<DynamicImport> {
    let close = t.matching(i + 1)?;
    let specifier = t.string_value(i + 2)?;
    // Only a lone literal argument, optionally followed by an options object.
    if close != i + 3 && !t.is(i + 3, ",") {
        return None;
    }
    Some(DynamicImport {
        span: t.start(i)..t.end(close),
        specifier,
    })
}

/// Name token: identifiers, and string literals in `as "name"` positions.
fn name_at(t: &SourceTokens<'_>, i: usize) -> Option<String> {
    match t.kind(i)? {
        TokenKind::Ident => Some(t.text(i).to_string()),
        TokenKind::String => t.string_value(i),
        _ => None,
    }
}

/// Parse `{ a, b as c }` starting at `open`. Returns `(name, alias)` pairs
/// and the index after `}`.
fn specifier_list(t: &SourceTokens<'_>, open: usize) -> Option<(Vec<(String, String)>, usize)> {
    let close = t.matching(open)?;
    let mut out = Vec::new();
    let mut k = open + 1;
    while k < close {
        let name = name_at(t, k)?;
        k += 1;
        let alias = if t.is(k, "as") {
            k += 1;
            let alias = name_at(t, k)?;
            k += 1;
            alias
        } else {
            name.clone()
        };
        out.push((name, alias));
        if t.is(k, ",") {
            k += 1;
        }
    }
    Some((out, close + 1))
}

/// Index after the optional import attributes and semicolon following a source string.
fn finish_source(t: &SourceTokens<'_>, mut k: usize) -> usize {
    if (t.is(k, "with") || t.is(k, "assert")) && t.is(k + 1, "{") && !t.newline_before(k) {
        k = t.matching(k + 1).map_or(k + 2, |c| c + 1);
    }
    if t.is(k, ";") {
        k += 1;
    }
    k
}

fn span_to(t: &SourceTokens<'_>, first: usize, next: usize) -> Range<usize> {
    t.start(first)..t.end(next - 1)
}

fn import_statement(t: &SourceTokens<'_>, i: usize) -> Option<(ModuleStatement, usize)> {
    let mut k = i + 1;
    let mut bindings = Vec::new();

    if !t.is_string(k) {
        if t.is_ident(k) && !(t.is(k, "from") && t.is_string(k + 1)) {
            bindings.push(ImportBinding::Default(t.text(k).to_string()));
            k += 1;
            if t.is(k, ",") {
                k += 1;
            }
        }
        if t.is(k, "*") && t.is(k + 1, "as") {
            bindings.push(ImportBinding::Namespace(t.text(k + 2).to_string()));
            k += 3;
        } else if t.is(k, "{") {
            let (list, next) = specifier_list(t, k)?;
            bindings.extend(
                list.into_iter()
                    .map(|(imported, local)| ImportBinding::Named { imported, local }),
            );
            k = next;
        }
        if !t.is(k, "from") {
            return None;
        }
        k += 1;
    }

    let specifier = t.string_value(k)?;
    let next = finish_source(t, k + 1);
    Some((
        ModuleStatement::Import {
            span: span_to(t, i, next),
            specifier,
            bindings,
        },
        next,
    ))
}

fn export_statement(t: &SourceTokens<'_>, i: usize) -> Option<(ModuleStatement, usize)> {
    let k = i + 1;
    match t.text(k) {
        "{" => {
            let (specifiers, mut next) = specifier_list(t, k)?;
            if t.is(next, "from") && t.is_string(next + 1) {
                let specifier = t.string_value(next + 1)?;
                next = finish_source(t, next + 2);
                return Some((
                    ModuleStatement::NamedFrom {
                        span: span_to(t, i, next),
                        specifier,
                        specifiers,
                    },
                    next,
                ));
            }
            if t.is(next, ";") {
                next += 1;
            }
            Some((
                ModuleStatement::Named {
                    span: span_to(t, i, next),
                    specifiers,
                },
                next,
            ))
        }
        "*" => {
            let mut j = k + 1;
            let mut alias = None;
            if t.is(j, "as") {
                alias = Some(name_at(t, j + 1)?);
                j += 2;
            }
            if !t.is(j, "from") {
                return None;
            }
            let specifier = t.string_value(j + 1)?;
            let next = finish_source(t, j + 2);
            Some((
                ModuleStatement::All {
                    span: span_to(t, i, next),
                    specifier,
                    alias,
                },
                next,
            ))
        }
        "default" => {
            let body = k + 1;
            let keyword = t.start(i)..t.start(body);
            let mut j = body;
            if t.is(j, "async") && t.is(j + 1, "function") && !t.newline_before(j + 1) {
                j += 1;
            }
            let named = if t.is(j, "function") {
                let name = if t.is(j + 1, "*") { j + 2 } else { j + 1 };
                t.is_ident(name).then(|| t.text(name).to_string())
            } else if t.is(j, "class") {
                (t.is_ident(j + 1) && !t.is(j + 1, "extends")).then(|| t.text(j + 1).to_string())
            } else {
                None
            };
            let stmt = match named {
                Some(name) => ModuleStatement::DefaultDeclaration { keyword, name },
                None => ModuleStatement::DefaultExpression { keyword },
            };
            Some((stmt, body))
        }
        _ => {
            let keyword = t.start(i)..t.start(k);
            let mut j = k;
            if t.is(j, "async") {
                j += 1;
            }
            let names = match t.text(j) {
                "function" => {
                    let name = if t.is(j + 1, "*") { j + 2 } else { j + 1 };
                    vec![t.text(name).to_string()]
                }
                "class" => vec![t.text(j + 1).to_string()],
                "const" | "let" | "var" => declarator_names(t, j + 1),
                _ => return None,
            };
            Some((ModuleStatement::Declaration { keyword, names }, k))
        }
    }
}

/// Binding names declared by `a = 1, { b, c: [d] } = o` starting at `first`.
pub(crate) fn declarator_names(t: &SourceTokens<'_>, first: usize) -> Vec<String> {
    let mut names = Vec::new();
    let mut k = first;
    loop {
        k = pattern_names(t, k, &mut names);
        if t.is(k, "=") {
            k = skip_initializer(t, k + 1);
        }
        if t.is(k, ",") {
            k += 1;
            continue;
        }
        return names;
    }
}

/// Index of the `,` or statement end that terminates an initializer.
pub(crate) fn skip_initializer(t: &SourceTokens<'_>, first: usize) -> usize {
    let mut k = first;
    while k < t.len() {
        if t.is(k, ",") || t.is(k, ";") || t.is(k, ")") || t.is(k, "]") || t.is(k, "}") {
            return k;
        }
        if k > first && t.newline_before(k) {
            let keyword = t.is_ident(k) && STATEMENT_KEYWORDS.contains(&t.text(k));
            let juxtaposed = matches!(
                (t.kind(k - 1), t.kind(k)),
                (
                    Some(
                        TokenKind::Ident
                            | TokenKind::Number
                            | TokenKind::String
                            | TokenKind::Template
                            | TokenKind::TemplateTail
                    ),
                    Some(TokenKind::Ident | TokenKind::Number | TokenKind::String)
                )
            );
            if keyword || juxtaposed {
                return k;
            }
        }
        k = match t.matching(k) {
            Some(close) if close > k => {
                let mut end = close;
                while t.kind(end) == Some(TokenKind::TemplateMiddle) {
                    end = t.matching(end).unwrap_or(end);
                }
                end + 1
            }
            _ => k + 1,
        };
    }
    k
}

/// Collect the names bound by the pattern at `i`; returns the index after it.
pub(crate) fn pattern_names(t: &SourceTokens<'_>, i: usize, names: &mut Vec<String>) -> usize {
    match t.kind(i) {
        Some(TokenKind::Ident) => {
            names.push(t.text(i).to_string());
            i + 1
        }
        Some(TokenKind::Punct) if t.is(i, "{") => {
            let Some(close) = t.matching(i) else {
                return i + 1;
            };
            let mut k = i + 1;
            while k < close {
                if t.is(k, "...") {
                    k = pattern_names(t, k + 1, names);
                } else {
                    let key_end = if t.is(k, "[") {
                        t.matching(k).map_or(k + 1, |c| c + 1)
                    } else {
                        k + 1
                    };
                    if t.is(key_end, ":") {
                        k = pattern_names(t, key_end + 1, names);
                    } else {
                        names.push(t.text(k).to_string());
                        k = key_end;
                    }
                }
                if t.is(k, "=") {
                    k = skip_initializer(t, k + 1);
                }
                if t.is(k, ",") {
                    k += 1;
                }
                if k < close && !t.is_ident(k) && !t.is(k, "[") && !t.is(k, "...") && !t.is_string(k) {
                    k += 1;
                }
            }
            close + 1
        }
        Some(TokenKind::Punct) if t.is(i, "[") => {
            let Some(close) = t.matching(i) else {
                return i + 1;
            };
            let mut k = i + 1;
            while k < close {
                if t.is(k, ",") {
                    k += 1;
                    continue;
                }
                if t.is(k, "...") {
                    k += 1;
                }
                k = pattern_names(t, k, names);
                if t.is(k, "=") {
                    k = skip_initializer(t, k + 1);
                }
                if t.is(k, ",") {
                    k += 1;
                } else if k < close {
                    k += 1;
                }
            }
            close + 1
        }
        _ => i + 1,
    }
}
