//! Remote module stage.
//!
//! Resolves bare package specifiers against a CDN-style registry and loads
//! HTTP(S) modules through the shared [`FetchCache`].
//!
//! Resolution, first rule that applies:
//!
//! 1. a specifier naming an existing workspace file (relative to a local importer)
//! 2. `/path` from a remote importer is joined onto the importer's URL;
//!    from a local importer it is an error
//! 3. a URL on the registry host gets `external=*` so the registry leaves
//!    its own dependencies as imports
//! 4. `./x` from a remote importer is joined onto its URL; other relative
//!    specifiers, other URLs and the entry pass through
//! 5. a bare specifier becomes `<registry><specifier>?external=*`

use std::sync::Arc;
use url::Url;

use crate::bundler::resolve::resolve_local;
use crate::bundler::{
    HookResult, LoadResult, Plugin, PluginContext, PluginError, PluginErrorKind, ResolveIdResult,
};
use crate::fetch::FetchCache;
use crate::vfs::path;

/// Remote module stage.
pub struct RemoteModuleStage {
    registry: Url,
    fetch: Arc<FetchCache>,
}

impl RemoteModuleStage {
    pub const NAME: &'static str = "playbox:cdn";

    #[must_use]
    pub fn new(registry: Url, fetch: Arc<FetchCache>) -> Self {
        Self { registry, fetch }
    }

    #[must_use]
    pub fn registry(&self) -> &Url {
        &self.registry
    }

    fn resolution_error(specifier: &str, message: impl Into<String>) -> PluginError {
        PluginError::new(
            Self::NAME,
            "resolve_id",
            PluginErrorKind::Resolution {
                specifier: specifier.to_string(),
                message: message.into(),
            },
        )
    }

    /// Base URL for the imports of a remote module: where it was finally served from.
    fn base_url(&self, importer: &str) -> Result<Url, PluginError> {
        let base = self
            .fetch
            .final_url(importer)
            .unwrap_or_else(|| importer.to_string());
        Url::parse(&base).map_err(|e| Self::resolution_error(importer, e.to_string()))
    }

    fn join(&self, specifier: &str, importer: &str) -> Result<String, PluginError> {
        self.base_url(importer)?
            .join(specifier)
            .map(String::from)
            .map_err(|e| Self::resolution_error(specifier, e.to_string()))
    }

    fn on_registry(&self, url: &Url) -> bool {
        url.host_str() == self.registry.host_str()
            && url.port_or_known_default() == self.registry.port_or_known_default()
    }
}

/// Set `external=*`, replacing any existing value. Other parameters are kept verbatim.
fn with_external(mut url: Url) -> String {
    let mut query: Vec<String> = url
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty() && pair.split('=').next() != Some("external"))
        .map(str::to_string)
        .collect();
    query.push("external=*".to_string());
    url.set_query(Some(&query.join("&")));
    url.into()
}

fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." || specifier == ".."
}

impl Plugin for RemoteModuleStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
        ctx: &PluginContext,
    ) -> HookResult<Option<ResolveIdResult>> {
        let remote_importer = importer.filter(|i| path::is_remote(i));

        if remote_importer.is_none() {
            if let Some(local) = resolve_local(&ctx.fs, specifier, importer) {
                return Ok(Some(ResolveIdResult::resolved(local)));
            }
        }

        if specifier.starts_with("//") {
            return match remote_importer {
                Some(importer) => self
                    .join(specifier, importer)
                    .map(|id| Some(ResolveIdResult::resolved(id))),
                None => Ok(Some(ResolveIdResult::resolved(format!("https:{specifier}")))),
            };
        }

        if specifier.starts_with('/') {
            return match (importer, remote_importer) {
                (_, Some(importer)) => self
                    .join(specifier, importer)
                    .map(|id| Some(ResolveIdResult::resolved(id))),
                (Some(importer), None) => Err(Self::resolution_error(
                    specifier,
                    format!("no such file in the workspace (imported from {importer})"),
                )),
                (None, None) => Ok(Some(ResolveIdResult::resolved(specifier))),
            };
        }

        if path::is_remote(specifier) {
            let url = Url::parse(specifier)
                .map_err(|e| Self::resolution_error(specifier, e.to_string()))?;
            if self.on_registry(&url) {
                return Ok(Some(ResolveIdResult::resolved(with_external(url))));
            }
            return Ok(Some(ResolveIdResult::resolved(specifier)));
        }

        if is_relative(specifier) {
            return match remote_importer {
                Some(importer) => self
                    .join(specifier, importer)
                    .map(|id| Some(ResolveIdResult::resolved(id))),
                None => Ok(None),
            };
        }

        if importer.is_none() {
            return Ok(Some(ResolveIdResult::resolved(specifier)));
        }

        let url = self
            .registry
            .join(specifier)
            .map_err(|e| Self::resolution_error(specifier, e.to_string()))?;
        Ok(Some(ResolveIdResult::resolved(with_external(url))))
    }

    fn load(&self, id: &str, ctx: &PluginContext) -> HookResult<Option<LoadResult>> {
        if ctx.fs.is_file(id) || !path::is_remote(id) {
            return Ok(None);
        }
        let fetched = self
            .fetch
            .get(id)
            .map_err(|e| PluginError::new(Self::NAME, "load", PluginErrorKind::Network(e)))?;
        Ok(Some(LoadResult::code(fetched.body.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, Fetched, RemoteFetcher};
    use crate::vfs::Vfs;

    /// Serves `// <url>`; `/react` redirects to a pinned path.
    struct Cdn;

    impl RemoteFetcher for Cdn {
        fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
            if url.contains("/missing") {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                });
            }
            let final_url = url.replace("/react?", "/v1/react@18.3.1?");
            Ok(Fetched {
                body: format!("// {final_url}"),
                url: final_url,
                content_type: None,
            })
        }
    }

    fn stage() -> RemoteModuleStage {
        RemoteModuleStage::new(
            Url::parse("https://esm.sh/").unwrap(),
            Arc::new(FetchCache::new(Cdn)),
        )
    }

    fn resolve(
        stage: &RemoteModuleStage,
        spec: &str,
        importer: Option<&str>,
        ctx: &PluginContext,
    ) -> Option<String> {
        stage.resolve_id(spec, importer, ctx).unwrap().map(|r| r.id)
    }

    fn ctx() -> PluginContext {
        let fs = Vfs::new();
        fs.write("/main.ts", "").unwrap();
        fs.write("/lib/util.ts", "").unwrap();
        PluginContext::new(fs, "/main.ts")
    }

    #[test]
    fn test_local_files_win() {
        let (stage, ctx) = (stage(), ctx());
        assert_eq!(
            resolve(&stage, "./lib/util.js", Some("/main.ts"), &ctx).as_deref(),
            Some("/lib/util.ts")
        );
        assert_eq!(resolve(&stage, "/main.ts", None, &ctx).as_deref(), Some("/main.ts"));
    }

    #[test]
    fn test_bare_specifiers_go_to_registry() {
        let (stage, ctx) = (stage(), ctx());
        assert_eq!(
            resolve(&stage, "react", Some("/main.ts"), &ctx).as_deref(),
            Some("https://esm.sh/react?external=*")
        );
        assert_eq!(
            resolve(&stage, "@scope/pkg@1.2/sub", Some("/main.ts"), &ctx).as_deref(),
            Some("https://esm.sh/@scope/pkg@1.2/sub?external=*")
        );
    }

    #[test]
    fn test_registry_urls_get_external() {
        let (stage, ctx) = (stage(), ctx());
        assert_eq!(
            resolve(&stage, "https://esm.sh/preact?dev", Some("/main.ts"), &ctx).as_deref(),
            Some("https://esm.sh/preact?dev&external=*")
        );
        assert_eq!(
            resolve(&stage, "https://esm.sh/x?external=react", None, &ctx).as_deref(),
            Some("https://esm.sh/x?external=*")
        );
        assert_eq!(
            resolve(&stage, "https://other.test/y.js", Some("/main.ts"), &ctx).as_deref(),
            Some("https://other.test/y.js")
        );
    }

    #[test]
    fn test_paths_from_remote_importers_are_joined() {
        let (stage, ctx) = (stage(), ctx());
        let importer = "https://esm.sh/v1/preact@10/es2022/preact.mjs";
        assert_eq!(
            resolve(&stage, "/v1/hooks.mjs", Some(importer), &ctx).as_deref(),
            Some("https://esm.sh/v1/hooks.mjs")
        );
        assert_eq!(
            resolve(&stage, "./jsx.mjs", Some(importer), &ctx).as_deref(),
            Some("https://esm.sh/v1/preact@10/es2022/jsx.mjs")
        );
    }

    #[test]
    fn test_redirected_importer_is_the_base() {
        let (stage, ctx) = (stage(), ctx());
        stage.fetch.get("https://esm.sh/react?external=*").unwrap();
        assert_eq!(
            resolve(&stage, "./index.mjs", Some("https://esm.sh/react?external=*"), &ctx).as_deref(),
            Some("https://esm.sh/v1/index.mjs")
        );
    }

    #[test]
    fn test_absolute_path_from_local_importer_is_an_error() {
        let (stage, ctx) = (stage(), ctx());
        let err = stage.resolve_id("/nope.ts", Some("/main.ts"), &ctx).unwrap_err();
        assert!(matches!(err.kind, PluginErrorKind::Resolution { .. }));
    }

    #[test]
    fn test_relative_from_local_falls_through() {
        let (stage, ctx) = (stage(), ctx());
        assert_eq!(resolve(&stage, "./missing.ts", Some("/main.ts"), &ctx), None);
    }

    #[test]
    fn test_entry_passes_through() {
        let (stage, ctx) = (stage(), ctx());
        assert_eq!(resolve(&stage, "/absent.ts", None, &ctx).as_deref(), Some("/absent.ts"));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let (stage, ctx) = (stage(), ctx());
        let once = resolve(&stage, "react", Some("/main.ts"), &ctx).unwrap();
        let twice = resolve(&stage, &once, Some("/main.ts"), &ctx).unwrap();
        assert_eq!(once, twice);
        assert_eq!(resolve(&stage, "react", Some("/main.ts"), &ctx).unwrap(), once);
    }

    #[test]
    fn test_load_policy() {
        let (stage, ctx) = (stage(), ctx());
        assert!(stage.load("/main.ts", &ctx).unwrap().is_none());
        assert!(stage.load("/virtual", &ctx).unwrap().is_none());
        let loaded = stage.load("https://esm.sh/a.mjs", &ctx).unwrap().unwrap();
        assert_eq!(loaded.code, "// https://esm.sh/a.mjs");

        let err = stage.load("https://esm.sh/missing", &ctx).unwrap_err();
        assert!(matches!(err.kind, PluginErrorKind::Network(FetchError::Status { status: 404, .. })));
    }
}
