//! Preview assembly: injecting a bundle into an HTML shell.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex_lite::Regex;
use thiserror::Error;

use crate::vfs::{path, Vfs};

/// The injection point in a template. Must appear exactly once.
pub const SCRIPT_MARKER: &str = "<!-- __script__ -->";

/// Built-in shell: a `#root` element and the marker in `<body>`.
pub const DEFAULT_TEMPLATE: &str = include_str!("template.html");

/// Workspace file that overrides the built-in shell when it contains the marker.
pub const PROJECT_TEMPLATE: &str = "/index.html";

/// Template failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template has no `<!-- __script__ -->` marker")]
    MissingMarker,

    #[error("template has {count} `<!-- __script__ -->` markers, expected exactly one")]
    DuplicateMarker { count: usize },
}

/// Replace the marker in `template` with `<script type="module">code</script>`.
pub fn assemble(template: &str, code: &str) -> Result<String, TemplateError> {
    match template.matches(SCRIPT_MARKER).count() {
        0 => Err(TemplateError::MissingMarker),
        1 => {
            let script = format!("<script type=\"module\">{}</script>", escape_script(code));
            Ok(template.replacen(SCRIPT_MARKER, &script, 1))
        }
        count => Err(TemplateError::DuplicateMarker { count }),
    }
}

/// Escape `</script` (any case) so inline code cannot close its element.
#[must_use]
pub fn escape_script(code: &str) -> String {
    let lower = code.to_ascii_lowercase();
    let mut out = String::with_capacity(code.len());
    let mut last = 0;
    for (i, _) in lower.match_indices("</script") {
        out.push_str(&code[last..i]);
        out.push_str("<\\/");
        last = i + 2;
    }
    out.push_str(&code[last..]);
    out
}

/// A document as a `data:` URI, for hosts that render from a URL.
#[must_use]
pub fn data_uri(document: &str) -> String {
    format!("data:text/html;charset=utf-8;base64,{}", STANDARD.encode(document))
}

/// Where a build's HTML shell comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TemplateSource {
    /// `/index.html` when it contains the marker, the built-in shell otherwise.
    #[default]
    Auto,
    /// A workspace file.
    Workspace(String),
    /// Fixed template text.
    Inline(String),
}

impl TemplateSource {
    /// Template text for a build over `fs`.
    pub fn load(&self, fs: &Vfs) -> Result<String, crate::vfs::VfsError> {
        match self {
            Self::Auto => Ok(fs
                .read_text(PROJECT_TEMPLATE)
                .ok()
                .filter(|html| html.contains(SCRIPT_MARKER))
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string())),
            Self::Workspace(p) => fs.read_text(p),
            Self::Inline(html) => Ok(html.clone()),
        }
    }
}

/// An HTML file used as the build entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlEntry {
    /// Workspace path of the first local `<script src>`.
    pub script: String,
    /// The page with that script tag taken out and the marker in place.
    pub template: String,
}

impl HtmlEntry {
    /// Find the script entry of `html`, located at `html_path`.
    ///
    /// The script tag is removed; when the page has no marker the tag's
    /// position becomes the marker.
    #[must_use]
    pub fn parse(html: &str, html_path: &str) -> Option<Self> {
        let tag = Regex::new(r#"(?is)<script\b[^>]*?\bsrc\s*=\s*["']([^"']+)["'][^>]*>\s*</script\s*>"#)
            .ok()?;
        let dir = path::parent(html_path).unwrap_or("/");

        let caps = tag
            .captures_iter(html)
            .find(|c| c.get(1).is_some_and(|src| !path::is_remote(src.as_str())))?;
        let whole = caps.get(0)?;
        let src = caps.get(1)?.as_str();

        let replacement = if html.contains(SCRIPT_MARKER) {
            ""
        } else {
            SCRIPT_MARKER
        };
        let mut template = String::with_capacity(html.len());
        template.push_str(&html[..whole.start()]);
        template.push_str(replacement);
        template.push_str(&html[whole.end()..]);

        Some(Self {
            script: path::join(dir, src),
            template,
        })
    }
}
