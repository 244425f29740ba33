//! Bundle output emission.
//!
//! Every module becomes a function in a module registry and runs with its
//! own scope:
//!
//! ```text
//! __modules[1] = function (module, exports, require) {
//! __export(exports, { "greet": () => greet });
//! const __ns2 = __esm(require(2));
//! export-free module body, reading `React` as `__ns2.default`
//! };
//! ```
//!
//! Import statements are hoisted to the top of the function as `require`
//! calls, exports become getters on `exports`, and execution starts with
//! `__require(<entry>)`. Every read of an imported binding is rewritten to
//! a member access on the dependency's exports object, so imports stay live:
//! a later assignment in the exporting module is visible, and a cycle reads
//! the value once the other module has initialized it.

use std::fmt::Write as _;
use std::ops::Range;

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use super::graph::{Module, ModuleGraph, ModuleId};
use super::scope;
use super::treeshake::UsedExports;
use super::BuildError;
use crate::compiler::esm::{ImportBinding, ModuleStatement};
use crate::compiler::lexer::SourceTokens;

/// Registry runtime shared by every bundle.
const RUNTIME: &str = r#"const __modules = [];
const __cache = [];
function __require(id) {
  const cached = __cache[id];
  if (cached) return cached.exports;
  const module = { exports: {} };
  __cache[id] = module;
  __modules[id](module, module.exports, __require);
  return module.exports;
}
function __export(target, getters) {
  Object.defineProperty(target, Symbol.toStringTag, { value: "Module" });
  for (const name in getters) {
    Object.defineProperty(target, name, { enumerable: true, get: getters[name] });
  }
}
function __reexport(target, source) {
  for (const name of Object.keys(source)) {
    if (name !== "default" && !Object.prototype.hasOwnProperty.call(target, name)) {
      Object.defineProperty(target, name, { enumerable: true, get: () => source[name] });
    }
  }
}
function __esm(m) {
  return m && m[Symbol.toStringTag] === "Module" ? m : Object.assign({ default: m }, m);
}
function __import(id) {
  return Promise.resolve().then(() => __esm(__require(id)));
}
"#;

/// Local name an anonymous default export is bound to.
const DEFAULT_LOCAL: &str = "__default";

/// Emit the bundle for `order`, starting execution at `entry`.
pub fn emit_bundle(
    graph: &ModuleGraph,
    order: &[ModuleId],
    entry: ModuleId,
    used: Option<&UsedExports>,
) -> Result<String, BuildError> {
    let mut output = String::new();

    // External modules are loaded by the browser as real ES modules.
    for &index in order {
        let module = module_at(graph, index)?;
        if module.external {
            let _ = writeln!(
                output,
                "import * as __external{index} from {};",
                quote(&module.id)
            );
        }
    }

    output.push_str("(() => {\n");
    output.push_str(RUNTIME);

    for &index in order {
        let module = module_at(graph, index)?;
        let _ = writeln!(output, "\n// {}", module.id);
        if module.external {
            let _ = writeln!(
                output,
                "__modules[{index}] = function (module) {{\nmodule.exports = __external{index};\n}};"
            );
            continue;
        }
        let body = rewrite_module(graph, index, module, used)?;
        let _ = writeln!(
            output,
            "__modules[{index}] = function (module, exports, require) {{\n{body}\n}};"
        );
    }

    let _ = writeln!(output, "\n__require({entry});");
    output.push_str("})();\n");
    Ok(output)
}

fn module_at(graph: &ModuleGraph, index: ModuleId) -> Result<&Module, BuildError> {
    graph
        .get(index)
        .ok_or_else(|| BuildError::Internal(format!("module {index} missing from graph")))
}

fn target(graph: &ModuleGraph, from: ModuleId, specifier: &str) -> Result<ModuleId, BuildError> {
    graph.resolve_specifier(from, specifier).ok_or_else(|| {
        BuildError::Internal(format!(
            "specifier {specifier:?} of module {from} was never resolved"
        ))
    })
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

/// Same number of line breaks as the removed text, so line numbers survive.
fn blank(code: &str, span: &Range<usize>) -> String {
    "\n".repeat(code[span.clone()].matches('\n').count())
}

/// Rewrite one module's code into a registry function body.
fn rewrite_module(
    graph: &ModuleGraph,
    index: ModuleId,
    module: &Module,
    used: Option<&UsedExports>,
) -> Result<String, BuildError> {
    let code = module.code.as_str();
    let mut header = String::new();
    let mut getters: Vec<(String, String)> = Vec::new();
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    let mut reexports = 0usize;
    // Imported local name -> expression reading it through the namespace.
    let mut imports: HashMap<String, String> = HashMap::default();
    let mut namespaces: HashSet<ModuleId> = HashSet::default();
    let mut statements: Vec<Range<usize>> = Vec::new();

    for stmt in &module.syntax.statements {
        match stmt {
            ModuleStatement::Import {
                span,
                specifier,
                bindings,
            } => {
                let dep = target(graph, index, specifier)?;
                write_import(&mut header, &mut namespaces, &mut imports, dep, bindings);
                statements.push(span.clone());
                edits.push((span.clone(), blank(code, span)));
            }
            ModuleStatement::Declaration { keyword, names } => {
                getters.extend(names.iter().map(|n| (n.clone(), n.clone())));
                edits.push((keyword.clone(), String::new()));
            }
            ModuleStatement::DefaultDeclaration { keyword, name } => {
                getters.push(("default".to_string(), name.clone()));
                edits.push((keyword.clone(), String::new()));
            }
            ModuleStatement::DefaultExpression { keyword } => {
                getters.push(("default".to_string(), DEFAULT_LOCAL.to_string()));
                edits.push((keyword.clone(), format!("var {DEFAULT_LOCAL} = ")));
            }
            ModuleStatement::Named { span, specifiers } => {
                getters.extend(
                    specifiers
                        .iter()
                        .map(|(local, exported)| (exported.clone(), local.clone())),
                );
                statements.push(span.clone());
                edits.push((span.clone(), blank(code, span)));
            }
            ModuleStatement::NamedFrom {
                span,
                specifier,
                specifiers,
            } => {
                let dep = target(graph, index, specifier)?;
                let local = format!("__reexport{reexports}");
                reexports += 1;
                let _ = writeln!(header, "const {local} = __esm(require({dep}));");
                getters.extend(specifiers.iter().map(|(imported, exported)| {
                    (exported.clone(), format!("{local}[{}]", quote(imported)))
                }));
                statements.push(span.clone());
                edits.push((span.clone(), blank(code, span)));
            }
            ModuleStatement::All {
                span,
                specifier,
                alias: Some(alias),
            } => {
                let dep = target(graph, index, specifier)?;
                let local = format!("__reexport{reexports}");
                reexports += 1;
                let _ = writeln!(header, "const {local} = __esm(require({dep}));");
                getters.push((alias.clone(), local));
                statements.push(span.clone());
                edits.push((span.clone(), blank(code, span)));
            }
            ModuleStatement::All {
                span,
                specifier,
                alias: None,
            } => {
                let dep = target(graph, index, specifier)?;
                let _ = writeln!(header, "__reexport(exports, require({dep}));");
                statements.push(span.clone());
                edits.push((span.clone(), blank(code, span)));
            }
        }
    }

    for dynamic in &module.syntax.dynamic_imports {
        let dep = target(graph, index, &dynamic.specifier)?;
        edits.push((dynamic.span.clone(), format!("__import({dep})")));
    }

    if !imports.is_empty() {
        let tokens = SourceTokens::new(code).map_err(|e| {
            BuildError::Internal(format!(
                "module {} failed to re-tokenize at byte {}: {}",
                module.id, e.offset, e.message
            ))
        })?;
        let names: HashSet<&str> = imports.keys().map(String::as_str).collect();
        for reference in scope::references(&tokens, &names, &statements) {
            let Some(access) = imports.get(&reference.name) else {
                continue;
            };
            let text = if reference.shorthand {
                format!("{}: {access}", reference.name)
            } else {
                access.clone()
            };
            edits.push((reference.span, text));
        }
        for (_, local) in &mut getters {
            if let Some(access) = imports.get(local.as_str()) {
                local.clone_from(access);
            }
        }
    }

    let mut prologue = String::new();
    if module.syntax.is_esm() {
        if let Some(used) = used {
            if !used.all_used(index) {
                getters.retain(|(exported, _)| used.is_used(index, exported));
            }
        }
        let list = getters
            .iter()
            .map(|(exported, local)| format!("{}: () => {local}", quote(exported)))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(prologue, "__export(exports, {{ {list} }});");
    }
    prologue.push_str(&header);
    prologue.push_str(&apply_edits(code, edits));
    Ok(prologue)
}

fn write_import(
    header: &mut String,
    namespaces: &mut HashSet<ModuleId>,
    imports: &mut HashMap<String, String>,
    dep: ModuleId,
    bindings: &[ImportBinding],
) {
    if bindings.is_empty() {
        let _ = writeln!(header, "require({dep});");
        return;
    }

    let ns = format!("__ns{dep}");
    for binding in bindings {
        match binding {
            ImportBinding::Namespace(local) => {
                let _ = writeln!(header, "const {local} = __esm(require({dep}));");
            }
            ImportBinding::Default(local) => {
                imports.insert(local.clone(), member(&ns, "default"));
            }
            ImportBinding::Named { imported, local } => {
                imports.insert(local.clone(), member(&ns, imported));
            }
        }
    }
    let named = bindings
        .iter()
        .any(|b| !matches!(b, ImportBinding::Namespace(_)));
    if named && namespaces.insert(dep) {
        let _ = writeln!(header, "const {ns} = __esm(require({dep}));");
    }
}

/// `ns.name`, or `ns["name"]` for names that are not identifiers.
fn member(ns: &str, name: &str) -> String {
    let identifier = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if identifier {
        format!("{ns}.{name}")
    } else {
        format!("{ns}[{}]", quote(name))
    }
}

fn apply_edits(code: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(span, _)| span.start);
    let mut out = String::with_capacity(code.len());
    let mut cursor = 0;
    for (span, text) in edits {
        if span.start < cursor {
            continue;
        }
        out.push_str(&code[cursor..span.start]);
        out.push_str(&text);
        cursor = span.end;
    }
    out.push_str(&code[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::esm::analyze;

    fn graph(modules: &[(&str, &str)]) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        for (id, _) in modules {
            graph.add(id, false);
        }
        for (index, (_, code)) in modules.iter().enumerate() {
            let syntax = analyze(code).unwrap();
            let mut specs: Vec<String> =
                syntax.static_specifiers().into_iter().map(str::to_string).collect();
            specs.extend(syntax.dynamic_imports.iter().map(|d| d.specifier.clone()));
            let module = graph.get_mut(index).unwrap();
            module.code = (*code).to_string();
            module.syntax = syntax;
            for spec in specs {
                let target = graph.index_of(&spec).unwrap();
                graph.link(index, &spec, target, false);
            }
        }
        graph
    }

    fn body(graph: &ModuleGraph, index: ModuleId, used: Option<&UsedExports>) -> String {
        rewrite_module(graph, index, graph.get(index).unwrap(), used).unwrap()
    }

    #[test]
    fn test_imports_are_hoisted_requires() {
        let g = graph(&[
            (
                "/main",
                "import D, { a, b as c } from \"/lib\";\nimport * as ns from \"/lib\";\nimport \"/side\";\nconsole.log(D, a, c, ns);",
            ),
            ("/lib", "export default 1; export const a = 2, b = 3;"),
            ("/side", "console.log('side');"),
        ]);
        let out = body(&g, 0, None);
        assert!(out.starts_with("__export(exports, {  });\n"));
        assert!(out.contains("const __ns1 = __esm(require(1));"));
        assert!(out.contains("const ns = __esm(require(1));"));
        assert!(out.contains("require(2);\n"));
        assert!(out.contains("console.log(__ns1.default, __ns1.a, __ns1.b, ns);"));
        assert!(!out.contains("import "));
    }

    #[test]
    fn test_imported_bindings_stay_live() {
        let g = graph(&[
            (
                "/main",
                "import { count, inc } from \"/c\";\ninc();\nconsole.log('LIVE', count);",
            ),
            ("/c", "export let count = 0; export function inc() { count++; }"),
        ]);
        let out = body(&g, 0, None);
        assert_eq!(out.matches("__esm(require(1))").count(), 1);
        assert!(out.contains("\n__ns1.inc();\nconsole.log('LIVE', __ns1.count);"));
    }

    #[test]
    fn test_shadowed_and_shorthand_references() {
        let g = graph(&[
            (
                "/main",
                "import { a, \"b-c\" as bc } from \"/lib\";\nconst o = { a, bc };\nfunction f(a) { return a; }\nexport { a as again };",
            ),
            ("/lib", "export const a = 1; const x = 2; export { x as \"b-c\" };"),
        ]);
        let out = body(&g, 0, None);
        assert!(out.contains("const o = { a: __ns1.a, bc: __ns1[\"b-c\"] };"));
        assert!(out.contains("function f(a) { return a; }"));
        assert!(out.contains(r#""again": () => __ns1.a"#));
    }

    #[test]
    fn test_exports_become_getters() {
        let g = graph(&[(
            "/lib",
            "export const a = 1;\nexport function f() {}\nlet x = 2;\nexport { x as y };\nexport default a + 1;",
        )]);
        let out = body(&g, 0, None);
        assert!(out.contains(
            r#"__export(exports, { "a": () => a, "f": () => f, "y": () => x, "default": () => __default });"#
        ));
        assert!(out.contains("const a = 1;\nfunction f() {}\nlet x = 2;\n\nvar __default = a + 1;"));
    }

    #[test]
    fn test_default_declaration_keeps_its_name() {
        let g = graph(&[("/App", "export default function App() { return 1 }")]);
        let out = body(&g, 0, None);
        assert!(out.contains(r#""default": () => App"#));
        assert!(out.contains("\nfunction App() { return 1 }"));
    }

    #[test]
    fn test_reexports() {
        let g = graph(&[
            (
                "/barrel",
                "export { a as b, default as d } from \"/a\";\nexport * from \"/c\";\nexport * as all from \"/c\";",
            ),
            ("/a", "export const a = 1; export default 2;"),
            ("/c", "export const c = 3;"),
        ]);
        let out = body(&g, 0, None);
        assert!(out.contains("const __reexport0 = __esm(require(1));"));
        assert!(out.contains("__reexport(exports, require(2));"));
        assert!(out.contains("const __reexport1 = __esm(require(2));"));
        assert!(out.contains(
            r#""b": () => __reexport0["a"], "d": () => __reexport0["default"], "all": () => __reexport1"#
        ));
    }

    #[test]
    fn test_dynamic_import_uses_registry() {
        let g = graph(&[
            ("/main", "const lazy = () => import(\"/page\");"),
            ("/page", "export const x = 1;"),
        ]);
        let out = body(&g, 0, None);
        assert_eq!(out, "const lazy = () => __import(1);");
    }

    #[test]
    fn test_treeshake_filters_getters_only() {
        let g = graph(&[
            ("/main", "import { a } from \"/lib\"; console.log(a);"),
            ("/lib", "export const a = 1; export const b = 2;"),
        ]);
        let used = UsedExports::analyze(&g, 0);
        let out = body(&g, 1, Some(&used));
        assert!(out.contains(r#"__export(exports, { "a": () => a });"#));
        assert!(out.contains("const b = 2;"));
    }

    #[test]
    fn test_bundle_layout() {
        let g = graph(&[
            ("/main", "import { a } from \"/lib\"; console.log(a);"),
            ("/lib", "export const a = 1;"),
        ]);
        let order = g.toposort();
        let out = emit_bundle(&g, &order, 0, None).unwrap();
        let lib = out.find("// /lib").unwrap();
        let main = out.find("// /main").unwrap();
        assert!(lib < main);
        assert!(out.starts_with("(() => {\n"));
        assert!(out.contains("__modules[1] = function (module, exports, require) {"));
        assert!(out.trim_end().ends_with("__require(0);\n})();"));
    }

    #[test]
    fn test_external_modules_are_native_imports() {
        let mut g = graph(&[
            ("/main", "import x from \"https://x.test/m.js\"; x();"),
            ("https://x.test/m.js", ""),
        ]);
        g.get_mut(1).unwrap().external = true;
        let out = emit_bundle(&g, &g.toposort(), 0, None).unwrap();
        assert!(out.starts_with("import * as __external1 from \"https://x.test/m.js\";\n"));
        assert!(out.contains("module.exports = __external1;"));
    }
}
