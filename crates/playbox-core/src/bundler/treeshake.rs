//! Used-export analysis.
//!
//! With tree shaking on, a module only exposes the exports some importer
//! uses; the entry keeps all of them. Declarations are never removed.
//!
//! ## How it works
//!
//! 1. The entry's exports are all used (it is the public API)
//! 2. Default and named imports mark the corresponding export
//! 3. Namespace imports and `import()` mark every export
//! 4. Re-exports forward the names used on the re-exporting module to the
//!    source module, repeated until nothing changes

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use super::graph::{ModuleGraph, ModuleId};
use crate::compiler::esm::{ImportBinding, ModuleStatement};

/// Names used from one module.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Usage {
    All,
    Some(HashSet<String>),
}

/// Which exports of each module are used.
#[derive(Debug, Default)]
pub struct UsedExports {
    used: HashMap<ModuleId, Usage>,
}

impl UsedExports {
    /// Analyze the graph starting from `entry`.
    #[must_use]
    pub fn analyze(graph: &ModuleGraph, entry: ModuleId) -> Self {
        let mut used = Self::default();
        used.mark_all(entry);

        // Direct imports do not depend on anything already marked.
        for (index, module) in graph.iter() {
            for stmt in &module.syntax.statements {
                let ModuleStatement::Import {
                    specifier,
                    bindings,
                    ..
                } = stmt
                else {
                    continue;
                };
                let Some(target) = graph.resolve_specifier(index, specifier) else {
                    continue;
                };
                for binding in bindings {
                    match binding {
                        ImportBinding::Default(_) => {
                            used.mark(target, "default");
                        }
                        ImportBinding::Named { imported, .. } => {
                            used.mark(target, imported);
                        }
                        ImportBinding::Namespace(_) => {
                            used.mark_all(target);
                        }
                    }
                }
            }
            for dynamic in &module.syntax.dynamic_imports {
                if let Some(target) = graph.resolve_specifier(index, &dynamic.specifier) {
                    used.mark_all(target);
                }
            }
        }

        // Re-exports propagate until a fixed point.
        let mut changed = true;
        while changed {
            changed = false;
            for (index, module) in graph.iter() {
                let Some(usage) = used.used.get(&index).cloned() else {
                    continue;
                };
                let local: HashSet<String> = module.syntax.exported_names().into_iter().collect();
                for stmt in &module.syntax.statements {
                    let Some(target) = stmt
                        .specifier()
                        .and_then(|spec| graph.resolve_specifier(index, spec))
                    else {
                        continue;
                    };
                    match stmt {
                        ModuleStatement::NamedFrom { specifiers, .. } => {
                            for (imported, exported) in specifiers {
                                if usage.contains(exported) {
                                    changed |= used.mark(target, imported);
                                }
                            }
                        }
                        ModuleStatement::All {
                            alias: Some(alias), ..
                        } => {
                            if usage.contains(alias) {
                                changed |= used.mark_all(target);
                            }
                        }
                        ModuleStatement::All { alias: None, .. } => match &usage {
                            Usage::All => changed |= used.mark_all(target),
                            Usage::Some(names) => {
                                for name in names.iter().filter(|n| !local.contains(*n)) {
                                    changed |= used.mark(target, name);
                                }
                            }
                        },
                        _ => {}
                    }
                }
            }
        }
        used
    }

    /// Whether `name` is used from `module`.
    #[must_use]
    pub fn is_used(&self, module: ModuleId, name: &str) -> bool {
        self.used.get(&module).is_some_and(|usage| usage.contains(name))
    }

    /// Whether every export of `module` is used.
    #[must_use]
    pub fn all_used(&self, module: ModuleId) -> bool {
        matches!(self.used.get(&module), Some(Usage::All))
    }

    /// Returns true if the usage grew.
    fn mark(&mut self, module: ModuleId, name: &str) -> bool {
        match self
            .used
            .entry(module)
            .or_insert_with(|| Usage::Some(HashSet::default()))
        {
            Usage::All => false,
            Usage::Some(names) => names.insert(name.to_string()),
        }
    }

    fn mark_all(&mut self, module: ModuleId) -> bool {
        !matches!(self.used.insert(module, Usage::All), Some(Usage::All))
    }
}

impl Usage {
    fn contains(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Some(names) => names.contains(name),
        }
    }
}
