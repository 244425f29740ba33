//! Style extraction stage.
//!
//! Turns a stylesheet into a side-effect module that appends a `<style>`
//! element to `document.head` when it runs.

use std::sync::Arc;
use url::Url;

use crate::bundler::{HookResult, LoadResult, Plugin, PluginContext, PluginError, PluginErrorKind};
use crate::fetch::FetchCache;
use crate::vfs::path;

/// Style extraction stage.
pub struct StyleExtractionStage {
    fetch: Arc<FetchCache>,
}

impl StyleExtractionStage {
    pub const NAME: &'static str = "playbox:css";

    #[must_use]
    pub fn new(fetch: Arc<FetchCache>) -> Self {
        Self { fetch }
    }
}

/// Whether `id` names a stylesheet. For URLs only the path counts.
#[must_use]
pub fn is_style(id: &str) -> bool {
    if path::is_remote(id) {
        return Url::parse(id).is_ok_and(|url| url.path().ends_with(".css"));
    }
    id.ends_with(".css")
}

/// Escape style text for a template literal.
#[must_use]
pub fn escape_css(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut chars = css.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '`' => out.push_str("\\`"),
            '\n' => out.push_str("\\n"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out
}

/// The module that injects `css` for the stylesheet `id`.
#[must_use]
pub fn style_module(id: &str, css: &str) -> String {
    let id = serde_json::to_string(id).unwrap_or_default();
    let css = escape_css(css);
    format!(
        "(() => {{\n  if (typeof document !== 'undefined') {{\n    const style = document.createElement('style');\n    style.setAttribute('data-playbox-id', {id});\n    style.textContent = `{css}`;\n    document.head.appendChild(style);\n  }}\n}})();\n"
    )
}

impl Plugin for StyleExtractionStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn load(&self, id: &str, ctx: &PluginContext) -> HookResult<Option<LoadResult>> {
        if !is_style(id) {
            return Ok(None);
        }
        let css = if path::is_remote(id) {
            self.fetch
                .get(id)
                .map_err(|e| PluginError::new(Self::NAME, "load", PluginErrorKind::Network(e)))?
                .body
                .clone()
        } else {
            ctx.fs
                .read_text(id)
                .map_err(|e| PluginError::new(Self::NAME, "load", PluginErrorKind::Fs(e)))?
        };
        Ok(Some(LoadResult::code(style_module(id, &css))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, Fetched, RemoteFetcher};
    use crate::vfs::Vfs;

    struct Static;

    impl RemoteFetcher for Static {
        fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
            Ok(Fetched {
                url: url.to_string(),
                body: "a{b:c}".to_string(),
                content_type: Some("text/css".to_string()),
            })
        }
    }

    fn stage() -> StyleExtractionStage {
        StyleExtractionStage::new(Arc::new(FetchCache::new(Static)))
    }

    #[test]
    fn test_is_style() {
        assert!(is_style("/a.css"));
        assert!(is_style("/App.ripple?ripple&type=style&lang.css"));
        assert!(is_style("https://cdn.test/x.css?v=1"));
        assert!(!is_style("https://cdn.test/x.js?f=.css"));
        assert!(!is_style("/a.ts"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape_css("a\\b`c\nd${e}$f"), "a\\\\b\\`c\\nd\\${e}$f");
    }

    #[test]
    fn test_local_stylesheet_becomes_injector() {
        let fs = Vfs::new();
        fs.write("/a.css", "body{color:red}").unwrap();
        let ctx = PluginContext::new(fs, "/main.ts");
        let out = stage().load("/a.css", &ctx).unwrap().unwrap();
        assert!(out.code.contains("if (typeof document !== 'undefined')"));
        assert!(out.code.contains("style.textContent = `body{color:red}`;"));
        assert!(out.code.contains("document.head.appendChild(style);"));
    }

    #[test]
    fn test_remote_stylesheet_is_fetched() {
        let ctx = PluginContext::default();
        let out = stage()
            .load("https://cdn.test/x.css", &ctx)
            .unwrap()
            .unwrap();
        assert!(out.code.contains("`a{b:c}`"));
    }

    #[test]
    fn test_missing_local_stylesheet_fails() {
        let err = stage()
            .load("/nope.css", &PluginContext::default())
            .unwrap_err();
        assert!(matches!(err.kind, PluginErrorKind::Fs(_)));
    }

    #[test]
    fn test_scripts_are_ignored() {
        assert!(stage()
            .load("/a.ts", &PluginContext::default())
            .unwrap()
            .is_none());
    }
}
