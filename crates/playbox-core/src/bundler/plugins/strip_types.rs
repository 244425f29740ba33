//! Type erasure stage for `.ts`, `.mts`, `.cts` and `.tsx` modules.
//!
//! Declaration files hold no runtime code and become empty modules.

use crate::bundler::{
    HookResult, Plugin, PluginContext, PluginError, PluginErrorKind, TransformResult,
};
use crate::compiler::strip::{is_declaration, is_typed, strip_types, StripOptions};

/// Type erasure stage.
#[derive(Debug, Default)]
pub struct TypeErasureStage;

impl TypeErasureStage {
    pub const NAME: &'static str = "playbox:strip-types";

    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for TypeErasureStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn transform(
        &self,
        code: &str,
        id: &str,
        _ctx: &PluginContext,
    ) -> HookResult<Option<TransformResult>> {
        if is_declaration(id) {
            return Ok(Some(TransformResult::code("export {};\n")));
        }
        if !is_typed(id) {
            return Ok(None);
        }
        let path = id.split(['?', '#']).next().unwrap_or(id);
        strip_types(code, id, &StripOptions::for_id(path))
            .map(|code| Some(TransformResult::code(code)))
            .map_err(|e| PluginError::new(Self::NAME, "transform", PluginErrorKind::Compile(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(code: &str, id: &str) -> HookResult<Option<TransformResult>> {
        TypeErasureStage::new().transform(code, id, &PluginContext::default())
    }

    #[test]
    fn test_typed_ids_are_erased() {
        let out = run("let x: number = 1; console.log(x)", "/main.ts")
            .unwrap()
            .unwrap();
        assert_eq!(out.code, "let x = 1; console.log(x)");
    }

    #[test]
    fn test_type_only_specifiers_are_dropped() {
        let out = run(r#"import {type A, B} from "m"; console.log(B);"#, "/a.mts")
            .unwrap()
            .unwrap();
        assert!(out.code.contains("B"));
        assert!(!out.code.contains("A"));
    }

    #[test]
    fn test_untyped_ids_pass_through() {
        assert!(run("let x: number", "/a.js").unwrap().is_none());
    }

    #[test]
    fn test_declaration_files_become_empty_modules() {
        let out = run("declare const x: number;\nexport interface T { a: string }", "/types.d.ts")
            .unwrap()
            .unwrap();
        assert_eq!(out.code, "export {};\n");
    }

    #[test]
    fn test_namespaces_are_compile_errors() {
        let err = run("namespace N { }", "/n.ts").unwrap_err();
        match err.kind {
            PluginErrorKind::Compile(e) => assert!(e.rendered_diagnostic().is_some()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
