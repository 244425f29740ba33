//! Module dependency graph for one build.
//!
//! Module ids are assigned in discovery order; the entry is always 0.

use rustc_hash::FxHashMap as HashMap;

use crate::compiler::esm::ModuleSyntax;

/// Index of a module in the graph.
pub type ModuleId = usize;

/// A module record, owned by one build.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Resolved id: a workspace path or a URL.
    pub id: String,
    /// Transformed code.
    pub code: String,
    pub syntax: ModuleSyntax,
    /// Loaded at runtime instead of bundled.
    pub external: bool,
    /// Static dependencies in source order.
    pub dependencies: Vec<ModuleId>,
    /// Targets of `import("literal")`.
    pub dynamic_dependencies: Vec<ModuleId>,
    /// Modules that import this one.
    pub dependents: Vec<ModuleId>,
}

/// The module dependency graph.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    id_to_index: HashMap<String, ModuleId>,
    /// (importer, specifier) -> target.
    specifier_map: HashMap<(ModuleId, String), ModuleId>,
}

impl ModuleGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module unless it is already present. Returns its index and whether it is new.
    pub fn add(&mut self, id: &str, external: bool) -> (ModuleId, bool) {
        if let Some(&index) = self.id_to_index.get(id) {
            return (index, false);
        }
        let index = self.modules.len();
        self.id_to_index.insert(id.to_string(), index);
        self.modules.push(Module {
            id: id.to_string(),
            external,
            ..Module::default()
        });
        (index, true)
    }

    #[must_use]
    pub fn get(&self, index: ModuleId) -> Option<&Module> {
        self.modules.get(index)
    }

    pub fn get_mut(&mut self, index: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(index)
    }

    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<ModuleId> {
        self.id_to_index.get(id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Record that `from` imports `to` through `specifier`.
    pub fn link(&mut self, from: ModuleId, specifier: &str, to: ModuleId, dynamic: bool) {
        self.specifier_map.insert((from, specifier.to_string()), to);
        let Some(module) = self.modules.get_mut(from) else {
            return;
        };
        let deps = if dynamic {
            &mut module.dynamic_dependencies
        } else {
            &mut module.dependencies
        };
        if !deps.contains(&to) {
            deps.push(to);
        }
        if let Some(target) = self.modules.get_mut(to) {
            if !target.dependents.contains(&from) {
                target.dependents.push(from);
            }
        }
    }

    /// The module `specifier` refers to from `from`.
    #[must_use]
    pub fn resolve_specifier(&self, from: ModuleId, specifier: &str) -> Option<ModuleId> {
        self.specifier_map
            .get(&(from, specifier.to_string()))
            .copied()
    }

    /// Modules in topological order: static dependencies before dependents,
    /// ties broken by discovery order.
    ///
    /// Depth-first post-order from the entry, following dependencies in
    /// source order. A back edge of a cycle is ignored, so the module that
    /// closes the cycle comes first.
    #[must_use]
    pub fn toposort(&self) -> Vec<ModuleId> {
        let n = self.modules.len();
        let mut visited = vec![false; n];
        let mut order = Vec::with_capacity(n);
        let mut stack: Vec<(ModuleId, usize)> = Vec::new();

        for root in 0..n {
            if visited[root] {
                continue;
            }
            visited[root] = true;
            stack.push((root, 0));
            while let Some((index, next)) = stack.last_mut() {
                let deps = &self.modules[*index].dependencies;
                if let Some(&dep) = deps.get(*next) {
                    *next += 1;
                    if !visited[dep] {
                        visited[dep] = true;
                        stack.push((dep, 0));
                    }
                } else {
                    order.push(*index);
                    stack.pop();
                }
            }
        }
        order
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(ids: &[&str], edges: &[(usize, usize)]) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        for id in ids {
            graph.add(id, false);
        }
        for &(from, to) in edges {
            graph.link(from, ids[to], to, false);
        }
        graph
    }

    #[test]
    fn test_add_deduplicates() {
        let mut graph = ModuleGraph::new();
        assert_eq!(graph.add("/a.ts", false), (0, true));
        assert_eq!(graph.add("/b.ts", false), (1, true));
        assert_eq!(graph.add("/a.ts", false), (0, false));
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.index_of("/b.ts"), Some(1));
    }

    #[test]
    fn test_toposort_linear() {
        // main -> b -> c
        let graph = graph(&["/main.ts", "/b.ts", "/c.ts"], &[(0, 1), (1, 2)]);
        assert_eq!(graph.toposort(), vec![2, 1, 0]);
    }

    #[test]
    fn test_toposort_ties_follow_discovery_order() {
        // main imports a, b, c; none depend on each other
        let graph = graph(&["/main", "/a", "/b", "/c"], &[(0, 1), (0, 2), (0, 3)]);
        assert_eq!(graph.toposort(), vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_toposort_tolerates_cycles() {
        // main -> a <-> b
        let graph = graph(&["/main", "/a", "/b"], &[(0, 1), (1, 2), (2, 1)]);
        let order = graph.toposort();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_link_records_dependents_and_specifiers() {
        let mut graph = graph(&["/main", "/a"], &[(0, 1)]);
        graph.link(0, "./lazy", 1, true);
        let a = graph.get(1).unwrap();
        assert_eq!(a.dependents, vec![0]);
        assert_eq!(graph.get(0).unwrap().dynamic_dependencies, vec![1]);
        assert_eq!(graph.resolve_specifier(0, "/a"), Some(1));
        assert_eq!(graph.resolve_specifier(0, "./lazy"), Some(1));
        assert_eq!(graph.resolve_specifier(1, "/a"), None);
    }
}
