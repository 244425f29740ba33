//! Path helpers for rooted, `/`-separated workspace paths.
//!
//! Workspace paths are plain strings. `?` and `&` are ordinary characters so
//! synthetic ids such as `/App.ripple?ripple&type=style&lang.css` are valid paths.

/// Normalize a path: root it at `/`, drop `.` and empty segments, resolve `..`
/// without escaping the root.
#[must_use]
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for s in segments {
        out.push('/');
        out.push_str(s);
    }
    out
}

/// Parent directory of a normalized path. The root has none.
#[must_use]
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a normalized path.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Resolve `rel` against the directory `dir`. Absolute `rel` ignores `dir`.
#[must_use]
pub fn join(dir: &str, rel: &str) -> String {
    if rel.starts_with('/') {
        normalize(rel)
    } else {
        normalize(&format!("{dir}/{rel}"))
    }
}

/// Extension of the last segment, without the dot.
#[must_use]
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}

/// Prefix that every descendant of `dir` starts with.
#[must_use]
pub fn child_prefix(dir: &str) -> String {
    if dir == "/" {
        "/".to_string()
    } else {
        format!("{dir}/")
    }
}

/// Whether `path` is `ancestor` itself or lies below it.
#[must_use]
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor || path.starts_with(&child_prefix(ancestor))
}

/// Whether an id names a remote (`http:` or `https:`) resource.
#[must_use]
pub fn is_remote(id: &str) -> bool {
    id.starts_with("https://") || id.starts_with("http://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("main.ts"), "/main.ts");
        assert_eq!(normalize("/a/./b//c/"), "/a/b/c");
        assert_eq!(normalize("/a/b/../c"), "/a/c");
        assert_eq!(normalize("/../../x"), "/x");
        assert_eq!(
            normalize("/App.ripple?ripple&type=style&lang.css"),
            "/App.ripple?ripple&type=style&lang.css"
        );
    }

    #[test]
    fn test_parent_and_file_name() {
        assert_eq!(parent("/"), None);
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/a/b.ts"), Some("/a"));
        assert_eq!(file_name("/a/b.ts"), "b.ts");
        assert_eq!(file_name("/"), "");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/src", "./a.ts"), "/src/a.ts");
        assert_eq!(join("/src/lib", "../a.ts"), "/src/a.ts");
        assert_eq!(join("/src", "/abs.ts"), "/abs.ts");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("/a/b.ts"), Some("ts"));
        assert_eq!(extension("/a/b.d.ts"), Some("ts"));
        assert_eq!(extension("/a/.env"), None);
        assert_eq!(extension("/a/Makefile"), None);
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/a/b", "/a"));
        assert!(is_within("/a", "/a"));
        assert!(!is_within("/ab", "/a"));
        assert!(is_within("/anything", "/"));
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://esm.sh/react"));
        assert!(is_remote("http://localhost/x.js"));
        assert!(!is_remote("/https.ts"));
    }
}
