use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path};
use std::sync::atomic::{AtomicU32, Ordering};

use walkdir::WalkDir;

/// Directory names never mirrored into a workspace.
pub const IGNORED_DIRS: &[&str] = &["node_modules", "target", "dist", ".git"];

/// A file collected from a project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    /// Rooted, `/`-separated path relative to the project directory (`/src/main.ts`).
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Read a file to string, replacing invalid UTF-8 sequences with the replacement character.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_to_string_lossy(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

static TEMP_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Write bytes next to `path` under a temporary name, then rename over `path`.
///
/// Readers see either the old or the new content. Missing parent directories are created.
///
/// # Errors
/// Returns an error if the parent cannot be created, or the write or rename fails.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output");
    let temp = parent.join(format!(
        ".{name}.{}.{}.tmp",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let written = File::create(&temp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp, path) {
        if cfg!(windows) && path.exists() {
            fs::copy(&temp, path)?;
            let _ = fs::remove_file(&temp);
            return Ok(());
        }
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    Ok(())
}

/// Convert a path below `root` into a rooted workspace path (`/a/b.ts`).
///
/// Returns `None` if `path` is not below `root` or crosses an ignored directory.
#[must_use]
pub fn workspace_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str()?;
                if IGNORED_DIRS.contains(&part) {
                    return None;
                }
                out.push('/');
                out.push_str(part);
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Collect every regular file below `root`, skipping [`IGNORED_DIRS`].
///
/// Files are returned sorted by workspace path.
///
/// # Errors
/// Returns an error if the directory cannot be walked or a file cannot be read.
pub fn collect_project_files(root: &Path) -> io::Result<Vec<ProjectFile>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| {
        e.depth() == 0
            || !e
                .file_name()
                .to_str()
                .is_some_and(|name| IGNORED_DIRS.contains(&name))
    }) {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(path) = workspace_path(root, entry.path()) else {
            continue;
        };
        files.push(ProjectFile {
            path,
            bytes: fs::read(entry.path())?,
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}
