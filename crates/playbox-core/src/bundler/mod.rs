//! Module bundler.
//!
//! Bundles the modules reachable from an entry into one script.
//!
//! ## Usage
//!
//! ```ignore
//! use playbox_core::bundler::{BundleEngine, BundleOptions, Bundler};
//!
//! let bundler = Bundler::new(plugins);
//! let chunk = bundler.build("/main.ts", &fs, &BundleOptions::default())?;
//! ```
//!
//! ## Architecture
//!
//! 1. **Resolution** - stages map specifiers to ids, then the default resolver
//! 2. **Graph** - breadth-first from the entry; each frontier is loaded and
//!    transformed in parallel, in discovery order
//! 3. **Order** - dependencies before dependents, cycles tolerated
//! 4. **Emit** - one module registry with the entry executed last

mod emit;
mod graph;
mod plugin;
pub mod plugins;
pub mod resolve;
mod scope;
mod treeshake;

pub use emit::emit_bundle;
pub use graph::{Module, ModuleGraph, ModuleId};
pub use plugin::{
    HookResult, LoadResult, Plugin, PluginContainer, PluginContext, PluginError, PluginErrorKind,
    ResolveIdResult, TransformResult,
};
pub use treeshake::UsedExports;

use rayon::prelude::*;
use rustc_hash::FxHashMap as HashMap;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use crate::compiler::esm::{analyze, ModuleSyntax};
use crate::compiler::{CompilerError, Diagnostic};
use crate::fetch::FetchError;
use crate::preview::{HtmlEntry, TemplateError};
use crate::vfs::{path, Vfs, VfsError};
use playbox_proto::{codes, ErrorInfo};

/// Bundle options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleOptions {
    /// Only expose the exports some importer uses.
    pub treeshake: bool,
}

/// The single output chunk of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub code: String,
    /// Resolved entry id.
    pub entry: String,
    /// Bundled module ids in output order.
    pub modules: Vec<String>,
    /// Page template supplied by an HTML entry.
    pub template: Option<String>,
}

/// A failed build. Carries the offending module id where there is one.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error("module not found: {id}{}", imported_from(.importer.as_deref()))]
    NotFound { id: String, importer: Option<String> },

    #[error("cannot resolve {specifier:?} from {importer}: {message}")]
    Resolution {
        specifier: String,
        importer: String,
        message: String,
    },

    #[error("failed to compile {id}: {error}")]
    Compile { id: String, error: CompilerError },

    #[error("failed to fetch {id}: {error}")]
    Network { id: String, error: FetchError },

    #[error("{id}: {error}")]
    Fs { id: String, error: VfsError },

    #[error("{error}")]
    Plugin {
        id: Option<String>,
        error: PluginError,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BuildError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => codes::NOT_FOUND,
            Self::Resolution { .. } => codes::RESOLUTION_ERROR,
            Self::Compile { .. } => codes::COMPILE_ERROR,
            Self::Network { .. } => codes::NETWORK_ERROR,
            Self::Fs { error, .. } => error.code(),
            Self::Plugin { .. } => codes::PLUGIN_ERROR,
            Self::Template(_) => codes::TEMPLATE_ERROR,
            Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// The module the error is about.
    #[must_use]
    pub fn module_id(&self) -> Option<&str> {
        match self {
            Self::NotFound { id, .. }
            | Self::Compile { id, .. }
            | Self::Network { id, .. }
            | Self::Fs { id, .. } => Some(id),
            Self::Resolution { importer, .. } => Some(importer),
            Self::Plugin { id, .. } => id.as_deref(),
            Self::Template(_) | Self::Internal(_) => None,
        }
    }

    /// Code frame for compile errors.
    #[must_use]
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Self::Compile { error, .. } => error.rendered_diagnostic(),
            _ => None,
        }
    }

    /// Wire form for the worker boundary.
    #[must_use]
    pub fn to_error_info(&self) -> ErrorInfo {
        let message = match self {
            Self::Compile { error, .. } => error.message.clone(),
            other => other.to_string(),
        };
        ErrorInfo {
            code: self.code().to_string(),
            message,
            module_id: self.module_id().map(str::to_string),
            diagnostic: self.diagnostic(),
        }
    }

    /// Map a stage failure, attributing it to module `id`.
    fn from_stage(id: Option<&str>, error: PluginError) -> Self {
        let module = id.unwrap_or_default().to_string();
        match error.kind {
            PluginErrorKind::Compile(error) => Self::Compile { id: module, error },
            PluginErrorKind::Resolution { specifier, message } => Self::Resolution {
                specifier,
                importer: module,
                message,
            },
            PluginErrorKind::Network(error) => Self::Network { id: module, error },
            PluginErrorKind::Fs(VfsError::NotFound { path }) => Self::NotFound {
                id: path,
                importer: id.filter(|i| !i.is_empty()).map(str::to_string),
            },
            PluginErrorKind::Fs(error) => Self::Fs { id: module, error },
            PluginErrorKind::Other(_) => Self::Plugin {
                id: id.map(str::to_string),
                error,
            },
        }
    }
}

/// A bundling engine: entry + filesystem in, one chunk out.
pub trait BundleEngine: Send + Sync {
    fn build(
        &self,
        entry: &str,
        fs: &Vfs,
        options: &BundleOptions,
    ) -> Result<OutputChunk, BuildError>;
}

/// A module after load and transform.
struct Loaded {
    code: String,
    syntax: ModuleSyntax,
}

/// The built-in engine.
pub struct Bundler {
    plugins: PluginContainer,
}

impl std::fmt::Debug for Bundler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundler").field("plugins", &self.plugins).finish()
    }
}

impl Bundler {
    #[must_use]
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self {
            plugins: PluginContainer::new(plugins),
        }
    }

    /// Add a stage to the end of the chain.
    #[must_use]
    pub fn plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.plugins.add(plugin);
        self
    }

    #[must_use]
    pub fn plugins(&self) -> &PluginContainer {
        &self.plugins
    }

    fn resolve(
        &self,
        specifier: &str,
        importer: Option<&str>,
        ctx: &PluginContext,
    ) -> Result<ResolveIdResult, BuildError> {
        if let Some(result) = self
            .plugins
            .resolve_id(specifier, importer, ctx)
            .map_err(|e| BuildError::from_stage(importer, e))?
        {
            return Ok(result);
        }
        if let Some(local) = resolve::resolve_local(&ctx.fs, specifier, importer) {
            return Ok(ResolveIdResult::resolved(local));
        }
        match importer {
            Some(importer) => Err(BuildError::Resolution {
                specifier: specifier.to_string(),
                importer: importer.to_string(),
                message: "no such module in the workspace".to_string(),
            }),
            None => Ok(ResolveIdResult::resolved(specifier)),
        }
    }

    fn load_module(
        &self,
        id: &str,
        importer: Option<&str>,
        ctx: &PluginContext,
    ) -> Result<Loaded, BuildError> {
        let started = Instant::now();
        let code = match self
            .plugins
            .load(id, ctx)
            .map_err(|e| BuildError::from_stage(Some(id), e))?
        {
            Some(loaded) => loaded.code,
            None => ctx.fs.read_text(id).map_err(|error| match error {
                VfsError::NotFound { .. } | VfsError::IsADirectory { .. } => BuildError::NotFound {
                    id: id.to_string(),
                    importer: importer.map(str::to_string),
                },
                error => BuildError::Fs {
                    id: id.to_string(),
                    error,
                },
            })?,
        };

        let code = if is_json(id) {
            json_module(id, &code)?
        } else {
            code
        };

        let code = self
            .plugins
            .transform(&code, id, ctx)
            .map_err(|e| BuildError::from_stage(Some(id), e))?;

        let syntax = analyze(&code).map_err(|e| BuildError::Compile {
            id: id.to_string(),
            error: CompilerError::parse_error(e.message.clone())
                .with_diagnostic(Diagnostic::at(&code, e.offset, &e.message).with_file(id)),
        })?;

        debug!(
            id,
            bytes = code.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Module ready"
        );
        Ok(Loaded { code, syntax })
    }

    fn build_graph(
        &self,
        entry: &str,
        ctx: &PluginContext,
    ) -> Result<ModuleGraph, BuildError> {
        let mut graph = ModuleGraph::new();
        let mut resolved: HashMap<(String, String), ResolveIdResult> = HashMap::default();

        let root = self.resolve(entry, None, ctx)?;
        let (root_index, _) = graph.add(&root.id, root.external);
        let mut frontier: Vec<(ModuleId, String, Option<String>)> = Vec::new();
        if !root.external {
            frontier.push((root_index, root.id, None));
        }

        while !frontier.is_empty() {
            let loaded: Vec<Result<Loaded, BuildError>> = frontier
                .par_iter()
                .map(|(_, id, importer)| self.load_module(id, importer.as_deref(), ctx))
                .collect();

            let mut next = Vec::new();
            for ((index, id, _), result) in frontier.into_iter().zip(loaded) {
                let module = result?;
                let mut specifiers: Vec<(String, bool)> = module
                    .syntax
                    .static_specifiers()
                    .into_iter()
                    .map(|s| (s.to_string(), false))
                    .collect();
                specifiers.extend(
                    module
                        .syntax
                        .dynamic_imports
                        .iter()
                        .map(|d| (d.specifier.clone(), true)),
                );

                for (specifier, dynamic) in specifiers {
                    let key = (id.clone(), specifier.clone());
                    let target = match resolved.get(&key) {
                        Some(target) => target.clone(),
                        None => {
                            let target = self.resolve(&specifier, Some(&id), ctx)?;
                            resolved.insert(key, target.clone());
                            target
                        }
                    };
                    let (target_index, new) = graph.add(&target.id, target.external);
                    graph.link(index, &specifier, target_index, dynamic);
                    if new && !target.external {
                        next.push((target_index, target.id, Some(id.clone())));
                    }
                }

                if let Some(record) = graph.get_mut(index) {
                    record.code = module.code;
                    record.syntax = module.syntax;
                }
            }
            frontier = next;
        }
        Ok(graph)
    }
}

impl BundleEngine for Bundler {
    fn build(
        &self,
        entry: &str,
        fs: &Vfs,
        options: &BundleOptions,
    ) -> Result<OutputChunk, BuildError> {
        let started = Instant::now();
        let entry = if path::is_remote(entry) {
            entry.to_string()
        } else {
            path::normalize(entry)
        };

        let (entry, template) = if entry.ends_with(".html") {
            let html = fs.read_text(&entry).map_err(|error| match error {
                VfsError::NotFound { .. } => BuildError::NotFound {
                    id: entry.clone(),
                    importer: None,
                },
                error => BuildError::Fs {
                    id: entry.clone(),
                    error,
                },
            })?;
            let page = HtmlEntry::parse(&html, &entry).ok_or_else(|| BuildError::Resolution {
                specifier: entry.clone(),
                importer: entry.clone(),
                message: "the page has no local <script src> entry".to_string(),
            })?;
            (page.script, Some(page.template))
        } else {
            (entry, None)
        };

        info!(entry = %entry, "Build started");
        let ctx = PluginContext::new(fs.clone(), entry.as_str());
        self.plugins
            .build_start(&ctx)
            .map_err(|e| BuildError::from_stage(None, e))?;
        let graph = self.build_graph(&entry, &ctx);
        let ended = self.plugins.build_end(&ctx);
        let graph = graph?;
        ended.map_err(|e| BuildError::from_stage(None, e))?;

        let order = graph.toposort();
        let used = options.treeshake.then(|| UsedExports::analyze(&graph, 0));
        let code = emit_bundle(&graph, &order, 0, used.as_ref())?;

        let modules: Vec<String> = order
            .iter()
            .filter_map(|&index| graph.get(index).map(|m| m.id.clone()))
            .collect();
        info!(
            entry = %entry,
            modules = modules.len(),
            bytes = code.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Build finished"
        );

        let entry = graph.get(0).map_or(entry, |m| m.id.clone());
        Ok(OutputChunk {
            code,
            entry,
            modules,
            template,
        })
    }
}

fn imported_from(importer: Option<&str>) -> String {
    importer
        .map(|i| format!(" (imported from {i})"))
        .unwrap_or_default()
}

fn is_json(id: &str) -> bool {
    let path = if path::is_remote(id) {
        url::Url::parse(id).map(|u| u.path().to_string()).unwrap_or_default()
    } else {
        id.to_string()
    };
    path.ends_with(".json")
}

/// `export default <json>`, after checking the text is JSON.
fn json_module(id: &str, text: &str) -> Result<String, BuildError> {
    if let Err(e) = serde_json::from_str::<serde_json::Value>(text) {
        let offset = offset_of(text, e.line(), e.column());
        let message = format!("invalid JSON: {e}");
        return Err(BuildError::Compile {
            id: id.to_string(),
            error: CompilerError::parse_error(message.clone())
                .with_diagnostic(Diagnostic::at(text, offset, message).with_file(id)),
        });
    }
    Ok(format!("export default {};\n", text.trim()))
}

/// Byte offset of a 1-based line and column.
fn offset_of(text: &str, line: usize, column: usize) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    let rest = &text[line_start.min(text.len())..];
    let col = rest
        .char_indices()
        .nth(column.saturating_sub(1))
        .map_or(rest.len(), |(i, _)| i);
    line_start + col
}
