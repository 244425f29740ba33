//! Stage interface for the bundler.
//!
//! A stage implements up to three hooks against a candidate module id:
//! `resolve_id` maps a specifier to a canonical id, `load` produces raw
//! content for an id, `transform` rewrites loaded content. Resolve and load
//! are first-match-wins across the chain; transform is applied by every stage
//! in order, each seeing the previous stage's output.
//!
//! ## Example
//!
//! ```ignore
//! use playbox_core::bundler::{HookResult, Plugin, PluginContext, TransformResult};
//!
//! struct TextPlugin;
//!
//! impl Plugin for TextPlugin {
//!     fn name(&self) -> &str { "text" }
//!
//!     fn transform(&self, code: &str, id: &str, _ctx: &PluginContext) -> HookResult<Option<TransformResult>> {
//!         if id.ends_with(".txt") {
//!             return Ok(Some(TransformResult::code(format!("export default {code:?};"))));
//!         }
//!         Ok(None)
//!     }
//! }
//! ```

use std::fmt;
use thiserror::Error;

use crate::compiler::CompilerError;
use crate::fetch::FetchError;
use crate::vfs::{Vfs, VfsError};

/// Result type for stage hooks.
pub type HookResult<T> = Result<T, PluginError>;

/// What went wrong inside a stage hook.
#[derive(Debug, Clone, Error)]
pub enum PluginErrorKind {
    #[error("{0}")]
    Compile(CompilerError),

    #[error("cannot resolve {specifier:?}: {message}")]
    Resolution { specifier: String, message: String },

    #[error(transparent)]
    Network(FetchError),

    #[error(transparent)]
    Fs(VfsError),

    #[error("{0}")]
    Other(String),
}

/// Error from a stage.
#[derive(Debug, Clone)]
pub struct PluginError {
    /// Stage name that caused the error.
    pub plugin: String,
    /// Hook that failed.
    pub hook: &'static str,
    pub kind: PluginErrorKind,
}

impl PluginError {
    pub fn new(plugin: impl Into<String>, hook: &'static str, kind: PluginErrorKind) -> Self {
        Self {
            plugin: plugin.into(),
            hook,
            kind,
        }
    }

    pub fn other(plugin: impl Into<String>, hook: &'static str, message: impl Into<String>) -> Self {
        Self::new(plugin, hook, PluginErrorKind::Other(message.into()))
    }
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.plugin, self.hook, self.kind)
    }
}

impl std::error::Error for PluginError {}

/// Context passed to stage hooks for one build.
#[derive(Debug, Clone, Default)]
pub struct PluginContext {
    /// The build's filesystem. Stages may write synthetic modules into it.
    pub fs: Vfs,
    /// Entry id of the build.
    pub entry: String,
}

impl PluginContext {
    #[must_use]
    pub fn new(fs: Vfs, entry: impl Into<String>) -> Self {
        Self {
            fs,
            entry: entry.into(),
        }
    }
}

/// Result of the resolve hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveIdResult {
    /// Resolved module id (a workspace path or a URL).
    pub id: String,
    /// Whether the module is left out of the bundle and loaded at runtime.
    pub external: bool,
}

impl ResolveIdResult {
    pub fn resolved(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: false,
        }
    }

    pub fn external(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: true,
        }
    }
}

/// Result of the load hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub code: String,
}

impl LoadResult {
    pub fn code(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// Result of the transform hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    pub code: String,
}

impl TransformResult {
    pub fn code(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// A bundler stage.
///
/// Hooks are called from several build threads at once.
pub trait Plugin: Send + Sync {
    /// Stage name for logs and error messages.
    fn name(&self) -> &str;

    /// Called at the start of every build.
    fn build_start(&self, _ctx: &PluginContext) -> HookResult<()> {
        Ok(())
    }

    /// Resolve a module specifier to an id.
    ///
    /// Return `Some(result)` to handle this resolution, or `None` to let the
    /// next stage or the default resolver handle it.
    fn resolve_id(
        &self,
        _specifier: &str,
        _importer: Option<&str>,
        _ctx: &PluginContext,
    ) -> HookResult<Option<ResolveIdResult>> {
        Ok(None)
    }

    /// Load a module by id.
    ///
    /// Return `Some(result)` to provide the source, or `None` to let the next
    /// stage or the filesystem handle it.
    fn load(&self, _id: &str, _ctx: &PluginContext) -> HookResult<Option<LoadResult>> {
        Ok(None)
    }

    /// Transform module source. Return `None` to pass it through unchanged.
    fn transform(
        &self,
        _code: &str,
        _id: &str,
        _ctx: &PluginContext,
    ) -> HookResult<Option<TransformResult>> {
        Ok(None)
    }

    /// Called after a build, whether it succeeded or not.
    fn build_end(&self, _ctx: &PluginContext) -> HookResult<()> {
        Ok(())
    }
}

/// Ordered stage chain.
#[derive(Default)]
pub struct PluginContainer {
    plugins: Vec<Box<dyn Plugin>>,
}

impl fmt::Debug for PluginContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|p| p.name()))
            .finish()
    }
}

impl PluginContainer {
    #[must_use]
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    /// Append a stage to the end of the chain.
    pub fn add(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Stage names in chain order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|p| p.name())
    }

    #[must_use]
    pub fn has_plugins(&self) -> bool {
        !self.plugins.is_empty()
    }

    pub fn build_start(&self, ctx: &PluginContext) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin.build_start(ctx)?;
        }
        Ok(())
    }

    /// First stage that resolves the specifier wins.
    pub fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
        ctx: &PluginContext,
    ) -> HookResult<Option<ResolveIdResult>> {
        for plugin in &self.plugins {
            if let Some(result) = plugin.resolve_id(specifier, importer, ctx)? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// First stage that loads the id wins.
    pub fn load(&self, id: &str, ctx: &PluginContext) -> HookResult<Option<LoadResult>> {
        for plugin in &self.plugins {
            if let Some(result) = plugin.load(id, ctx)? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Run every stage's transform in order.
    pub fn transform(&self, code: &str, id: &str, ctx: &PluginContext) -> HookResult<String> {
        let mut current = code.to_string();
        for plugin in &self.plugins {
            if let Some(result) = plugin.transform(&current, id, ctx)? {
                current = result.code;
            }
        }
        Ok(current)
    }

    /// Call every stage's `build_end`, reporting the first failure.
    pub fn build_end(&self, ctx: &PluginContext) -> HookResult<()> {
        let mut first = None;
        for plugin in &self.plugins {
            if let Err(e) = plugin.build_end(ctx) {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}
