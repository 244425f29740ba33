//! Source compilers used by the stage chain.
//!
//! - [`strip`]: TypeScript type erasure
//! - [`esm`]: ES module import/export analysis
//! - [`sfc`]: built-in single-file-component splitter
//! - [`process`]: external component compiler over newline-delimited JSON
//!
//! Everything here works on text: a compiler takes source plus the module id
//! and returns source, or a [`CompilerError`] with a code-frame diagnostic.

pub mod esm;
pub mod lexer;
pub mod process;
pub mod sfc;
pub mod strip;

pub use process::ProcessCompiler;
pub use sfc::SfcCompiler;
pub use strip::{strip_types, StripOptions};

use serde::Serialize;
use std::fmt::{self, Write as _};

/// A located compiler message with a rendered code frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, in characters).
    pub column: u32,
    /// Source excerpt with a caret under the column.
    pub frame: String,
}

impl Diagnostic {
    /// Diagnostic pointing at byte `offset` of `source`.
    #[must_use]
    pub fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let mut offset = offset.min(source.len());
        while !source.is_char_boundary(offset) {
            offset -= 1;
        }
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = source[line_start..offset].chars().count() + 1;

        Self {
            message: message.into(),
            file: None,
            line: u32::try_from(line).unwrap_or(u32::MAX),
            column: u32::try_from(column).unwrap_or(u32::MAX),
            frame: code_frame(source, line, column),
        }
    }

    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// `file:line:column: message` followed by the code frame.
    #[must_use]
    pub fn render(&self) -> String {
        let location = match &self.file {
            Some(file) => format!("{file}:{}:{}", self.line, self.column),
            None => format!("{}:{}", self.line, self.column),
        };
        format!("{location}: {}\n{}", self.message, self.frame)
    }
}

/// Render the line before `line` (if any), `line` itself, and a caret line.
fn code_frame(source: &str, line: usize, column: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let first = line.saturating_sub(1).max(1);
    let width = line.to_string().len();
    let mut out = String::new();
    for n in first..=line {
        let text = lines.get(n - 1).copied().unwrap_or("");
        let _ = writeln!(out, "{n:>width$} | {text}");
    }
    let _ = write!(out, "{:>width$} | {}^", "", " ".repeat(column.saturating_sub(1)));
    out
}

/// Error during compilation.
#[derive(Debug, Clone)]
pub struct CompilerError {
    /// Error code.
    pub code: &'static str,
    /// Human-readable error message.
    pub message: String,
    /// Located diagnostics, if any.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompilerError {
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }

    /// Source could not be tokenized.
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new("SYNTAX_ERROR", message)
    }

    /// Valid syntax this pipeline cannot lower.
    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new("UNSUPPORTED_SYNTAX", message)
    }

    /// The component compiler rejected its input.
    #[must_use]
    pub fn component_error(message: impl Into<String>) -> Self {
        Self::new("COMPONENT_ERROR", message)
    }

    /// The component compiler could not be run.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new("COMPILER_UNAVAILABLE", message)
    }

    /// First diagnostic rendered with its code frame.
    #[must_use]
    pub fn rendered_diagnostic(&self) -> Option<String> {
        self.diagnostics.first().map(Diagnostic::render)
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        for diag in &self.diagnostics {
            write!(f, "\n  - {}", diag.message)?;
            if let Some(file) = &diag.file {
                write!(f, " at {file}:{}:{}", diag.line, diag.column)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for CompilerError {}

/// Output of a component compiler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledComponent {
    /// JavaScript module code.
    pub code: String,
    /// Extracted style text; empty when the component has none.
    pub css: String,
}

/// Compiler for the component language.
///
/// The trait is `Send + Sync` so one compiler can serve a whole build,
/// including modules transformed in parallel.
pub trait ComponentCompiler: Send + Sync {
    /// Compiler name (e.g. "sfc", "process").
    fn name(&self) -> &'static str;

    /// Compile one component file.
    fn compile(&self, source: &str, id: &str) -> Result<CompiledComponent, CompilerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_position_and_frame() {
        let src = "let a = 1;\nlet b = @;\n";
        let offset = src.find('@').unwrap();
        let diag = Diagnostic::at(src, offset, "unexpected `@`").with_file("/x.ts");

        assert_eq!(diag.line, 2);
        assert_eq!(diag.column, 9);
        assert_eq!(diag.frame, "1 | let a = 1;\n2 | let b = @;\n  |         ^");
        assert!(diag.render().starts_with("/x.ts:2:9: unexpected `@`\n"));
    }

    #[test]
    fn test_diagnostic_first_line() {
        let diag = Diagnostic::at("oops", 0, "bad");
        assert_eq!((diag.line, diag.column), (1, 1));
        assert_eq!(diag.frame, "1 | oops\n  | ^");
    }

    #[test]
    fn test_compiler_error_display() {
        let error = CompilerError::parse_error("Unexpected token")
            .with_diagnostic(Diagnostic::at("x", 0, "here").with_file("/App.ts"));
        let display = error.to_string();
        assert!(display.starts_with("SYNTAX_ERROR: Unexpected token"));
        assert!(display.contains("here at /App.ts:1:1"));
    }
}
