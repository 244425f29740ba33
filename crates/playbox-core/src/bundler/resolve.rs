//! Default resolver for workspace modules.
//!
//! Relative and absolute specifiers are resolved against the importer's
//! directory and probed in order: the exact path, the typed counterparts of
//! an erased extension, each of [`EXTENSIONS`] appended, then `index` files.

use crate::vfs::{path, Vfs};

/// Extensions tried when a specifier has none that exists.
pub const EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".mjs", ".jsx", ".json"];

/// Typed sources an erased extension may stand for.
const TYPED_COUNTERPARTS: &[(&str, &[&str])] = &[
    (".js", &[".ts", ".tsx"]),
    (".jsx", &[".tsx"]),
    (".mjs", &[".mts"]),
    (".cjs", &[".cts"]),
];

/// Whether a specifier names a workspace path rather than a package or URL.
#[must_use]
pub fn is_path_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || (specifier.starts_with('/') && !specifier.starts_with("//"))
}

/// Resolve a path specifier to an existing workspace file.
///
/// Returns `None` for bare and URL specifiers, for remote importers, and when
/// nothing matches.
#[must_use]
pub fn resolve_local(fs: &Vfs, specifier: &str, importer: Option<&str>) -> Option<String> {
    if !is_path_specifier(specifier) {
        return None;
    }
    let dir = match importer {
        Some(importer) if path::is_remote(importer) => return None,
        Some(importer) => path::parent(&path::normalize(importer))
            .unwrap_or("/")
            .to_string(),
        None => "/".to_string(),
    };
    probe(fs, &path::join(&dir, specifier))
}

/// Find the file a module path refers to.
#[must_use]
pub fn probe(fs: &Vfs, candidate: &str) -> Option<String> {
    if fs.is_file(candidate) {
        return Some(candidate.to_string());
    }

    for (erased, typed) in TYPED_COUNTERPARTS {
        if let Some(stem) = candidate.strip_suffix(erased) {
            for ext in *typed {
                let path = format!("{stem}{ext}");
                if fs.is_file(&path) {
                    return Some(path);
                }
            }
        }
    }

    for ext in EXTENSIONS {
        let path = format!("{candidate}{ext}");
        if fs.is_file(&path) {
            return Some(path);
        }
    }

    let base = path::child_prefix(candidate);
    EXTENSIONS
        .iter()
        .map(|ext| format!("{base}index{ext}"))
        .find(|path| fs.is_file(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs(paths: &[&str]) -> Vfs {
        let fs = Vfs::new();
        for p in paths {
            fs.write(p, "").unwrap();
        }
        fs
    }

    #[test]
    fn test_exact_and_relative() {
        let fs = fs(&["/src/a.js", "/src/lib/b.js"]);
        assert_eq!(
            resolve_local(&fs, "./lib/b.js", Some("/src/a.js")).as_deref(),
            Some("/src/lib/b.js")
        );
        assert_eq!(
            resolve_local(&fs, "../a.js", Some("/src/lib/b.js")).as_deref(),
            Some("/src/a.js")
        );
        assert_eq!(
            resolve_local(&fs, "/src/a.js", None).as_deref(),
            Some("/src/a.js")
        );
    }

    #[test]
    fn test_erased_extension_finds_typed_source() {
        let fs = fs(&["/util.ts", "/view.tsx", "/m.mts"]);
        assert_eq!(resolve_local(&fs, "./util.js", Some("/main.ts")).as_deref(), Some("/util.ts"));
        assert_eq!(resolve_local(&fs, "./view.js", Some("/main.ts")).as_deref(), Some("/view.tsx"));
        assert_eq!(resolve_local(&fs, "./m.mjs", Some("/main.ts")).as_deref(), Some("/m.mts"));
    }

    #[test]
    fn test_extension_and_index_probing() {
        let fs = fs(&["/data.json", "/components/index.tsx", "/a.ts", "/a.js"]);
        assert_eq!(resolve_local(&fs, "./data", None).as_deref(), Some("/data.json"));
        assert_eq!(
            resolve_local(&fs, "./components", None).as_deref(),
            Some("/components/index.tsx")
        );
        // `.ts` is probed before `.js`
        assert_eq!(resolve_local(&fs, "./a", None).as_deref(), Some("/a.ts"));
    }

    #[test]
    fn test_non_local_specifiers() {
        let fs = fs(&["/react"]);
        assert_eq!(resolve_local(&fs, "react", None), None);
        assert_eq!(resolve_local(&fs, "https://x.test/a.js", None), None);
        assert_eq!(resolve_local(&fs, "./a.js", Some("https://x.test/b.js")), None);
        assert_eq!(resolve_local(&fs, "./missing", Some("/main.ts")), None);
    }
}
