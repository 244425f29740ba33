//! Built-in single-file-component compiler.
//!
//! Splits a component file into its `<script>` body (the module code) and its
//! `<style>` blocks (the extracted style text). A `lang="ts"` script is run
//! through type erasure. Anything else outside those blocks, apart from HTML
//! comments and whitespace, is rejected: rendering templates needs the real
//! component compiler (see [`super::ProcessCompiler`]).

use regex_lite::Regex;

use super::strip::{strip_types, StripOptions};
use super::{CompiledComponent, ComponentCompiler, CompilerError, Diagnostic};

/// `<script>`/`<style>` splitter.
#[derive(Debug)]
pub struct SfcCompiler {
    blocks: Regex,
    lang_ts: Regex,
}

impl SfcCompiler {
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn new() -> Self {
        Self {
            blocks: Regex::new(
                r"(?s)<!--.*?-->|<script(\s[^>]*)?>(.*?)</script\s*>|<style(\s[^>]*)?>(.*?)</style\s*>",
            )
            .expect("valid block pattern"),
            lang_ts: Regex::new(r#"\blang\s*=\s*["']?(ts|typescript)\b"#).expect("valid lang pattern"),
        }
    }
}

impl Default for SfcCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentCompiler for SfcCompiler {
    fn name(&self) -> &'static str {
        "sfc"
    }

    fn compile(&self, source: &str, id: &str) -> Result<CompiledComponent, CompilerError> {
        let mut script: Option<(String, bool)> = None;
        let mut styles: Vec<&str> = Vec::new();
        let mut cursor = 0;

        for caps in self.blocks.captures_iter(source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            check_gap(source, cursor, whole.start(), id)?;
            cursor = whole.end();

            if let Some(body) = caps.get(2) {
                if script.is_some() {
                    return Err(error_at(
                        source,
                        whole.start(),
                        id,
                        "a component may contain only one <script> block",
                    ));
                }
                let is_ts = caps
                    .get(1)
                    .is_some_and(|attrs| self.lang_ts.is_match(attrs.as_str()));
                script = Some((body.as_str().to_string(), is_ts));
            } else if let Some(body) = caps.get(4) {
                styles.push(body.as_str().trim());
            }
        }
        check_gap(source, cursor, source.len(), id)?;

        let code = match script {
            Some((body, true)) => strip_types(&body, id, &StripOptions::default())?,
            Some((body, false)) => body,
            None => String::new(),
        };

        Ok(CompiledComponent {
            code,
            css: styles
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        })
    }
}

/// Text between blocks must be whitespace.
fn check_gap(source: &str, start: usize, end: usize, id: &str) -> Result<(), CompilerError> {
    let gap = &source[start..end];
    match gap.find(|c: char| !c.is_whitespace()) {
        None => Ok(()),
        Some(offset) => Err(error_at(
            source,
            start + offset,
            id,
            "markup outside <script> and <style> needs the component compiler; set component.compiler in playbox.json",
        )),
    }
}

fn error_at(source: &str, offset: usize, id: &str, message: &str) -> CompilerError {
    CompilerError::component_error(message)
        .with_diagnostic(Diagnostic::at(source, offset, message).with_file(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_and_styles_are_split() {
        let src = "<!-- counter -->\n<script>\nexport default function Counter() {}\n</script>\n<style>\n.a { color: red; }\n</style>\n<style scoped>.b{}</style>\n";
        let out = SfcCompiler::new().compile(src, "/Counter.ripple").unwrap();
        assert_eq!(out.code.trim(), "export default function Counter() {}");
        assert_eq!(out.css, ".a { color: red; }\n.b{}");
    }

    #[test]
    fn test_typescript_script_is_erased() {
        let src = "<script lang=\"ts\">let n: number = 1; export default n;</script>";
        let out = SfcCompiler::new().compile(src, "/N.ripple").unwrap();
        assert_eq!(out.code, "let n = 1; export default n;");
        assert!(out.css.is_empty());
    }

    #[test]
    fn test_markup_is_rejected_with_diagnostic() {
        let src = "<script>export default 1</script>\n<div>hi</div>\n";
        let err = SfcCompiler::new().compile(src, "/M.ripple").unwrap_err();
        assert_eq!(err.code, "COMPONENT_ERROR");
        let diag = &err.diagnostics[0];
        assert_eq!((diag.line, diag.column), (2, 1));
        assert_eq!(diag.file.as_deref(), Some("/M.ripple"));
    }

    #[test]
    fn test_two_scripts_rejected() {
        let src = "<script>a</script><script>b</script>";
        assert!(SfcCompiler::new().compile(src, "/x.ripple").is_err());
    }

    #[test]
    fn test_style_only_component() {
        let out = SfcCompiler::new()
            .compile("<style>p{margin:0}</style>", "/S.ripple")
            .unwrap();
        assert!(out.code.is_empty());
        assert_eq!(out.css, "p{margin:0}");
    }
}
