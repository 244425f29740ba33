//! Component-language compilation stage.
//!
//! Compiles ids ending in the component extension with a
//! [`ComponentCompiler`]. Extracted style text is written into the build's
//! filesystem under a synthetic id and imported from the compiled module, so
//! the style stage picks it up like any other stylesheet.

use std::sync::Arc;

use crate::bundler::{
    HookResult, Plugin, PluginContext, PluginError, PluginErrorKind, TransformResult,
};
use crate::compiler::ComponentCompiler;

/// Source compiler stage.
pub struct SourceCompilerStage {
    compiler: Arc<dyn ComponentCompiler>,
    suffix: String,
    extension: String,
}

impl SourceCompilerStage {
    pub const NAME: &'static str = "playbox:component";

    /// Stage for files ending in `.{extension}`.
    pub fn new(compiler: Arc<dyn ComponentCompiler>, extension: &str) -> Self {
        Self {
            compiler,
            suffix: format!(".{extension}"),
            extension: extension.to_string(),
        }
    }

    /// Synthetic module id holding the style text extracted from `id`.
    #[must_use]
    pub fn style_id(&self, id: &str) -> String {
        format!("{id}?{}&type=style&lang.css", self.extension)
    }

    fn is_component(&self, id: &str) -> bool {
        id.ends_with(&self.suffix)
    }
}

impl Plugin for SourceCompilerStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn transform(
        &self,
        code: &str,
        id: &str,
        ctx: &PluginContext,
    ) -> HookResult<Option<TransformResult>> {
        if !self.is_component(id) {
            return Ok(None);
        }

        let compiled = self.compiler.compile(code, id).map_err(|e| {
            PluginError::new(Self::NAME, "transform", PluginErrorKind::Compile(e))
        })?;
        tracing::debug!(
            id,
            compiler = self.compiler.name(),
            css = !compiled.css.is_empty(),
            "Compiled component"
        );

        let mut code = compiled.code;
        if !compiled.css.is_empty() {
            let style_id = self.style_id(id);
            ctx.fs
                .write(&style_id, compiled.css.as_bytes())
                .map_err(|e| PluginError::new(Self::NAME, "transform", PluginErrorKind::Fs(e)))?;
            if !code.is_empty() && !code.ends_with('\n') {
                code.push('\n');
            }
            code.push_str("import ");
            code.push_str(&serde_json::to_string(&style_id).unwrap_or_default());
            code.push_str(";\n");
        }
        Ok(Some(TransformResult::code(code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompiledComponent, CompilerError, SfcCompiler};
    use crate::vfs::Vfs;

    fn stage() -> SourceCompilerStage {
        SourceCompilerStage::new(Arc::new(SfcCompiler::new()), "ripple")
    }

    #[test]
    fn test_style_is_written_and_imported() {
        let ctx = PluginContext::new(Vfs::new(), "/main.ts");
        let src = "<script>export default 1;</script><style>p{color:red}</style>";
        let out = stage()
            .transform(src, "/App.ripple", &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(
            out.code,
            "export default 1;\nimport \"/App.ripple?ripple&type=style&lang.css\";\n"
        );
        assert_eq!(
            ctx.fs.read_text("/App.ripple?ripple&type=style&lang.css").unwrap(),
            "p{color:red}"
        );
    }

    #[test]
    fn test_no_style_no_import() {
        let ctx = PluginContext::default();
        let out = stage()
            .transform("<script>export default 1;</script>", "/A.ripple", &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(out.code, "export default 1;");
        assert!(!ctx.fs.exists("/A.ripple?ripple&type=style&lang.css"));
    }

    #[test]
    fn test_other_ids_pass_through() {
        let ctx = PluginContext::default();
        assert!(stage().transform("x", "/a.ts", &ctx).unwrap().is_none());
        assert!(stage()
            .transform("x", "/A.ripple?ripple&type=style&lang.css", &ctx)
            .unwrap()
            .is_none());
    }

    struct Failing;

    impl ComponentCompiler for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn compile(&self, _source: &str, _id: &str) -> Result<CompiledComponent, CompilerError> {
            Err(CompilerError::component_error("unexpected token"))
        }
    }

    #[test]
    fn test_compiler_errors_are_compile_errors() {
        let stage = SourceCompilerStage::new(Arc::new(Failing), "ripple");
        let err = stage
            .transform("x", "/B.ripple", &PluginContext::default())
            .unwrap_err();
        assert!(matches!(err.kind, PluginErrorKind::Compile(ref e) if e.message == "unexpected token"));
    }
}
