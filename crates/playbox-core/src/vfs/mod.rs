//! In-memory virtual filesystem.
//!
//! Files live in an ordered index keyed by normalized path. Directories are
//! derived from path prefixes; only directories created explicitly while empty
//! get a marker entry. `Vfs` is a cheap, cloneable handle, and every clone
//! sees every mutation immediately.

pub mod path;
mod snapshot;
mod watch;

pub use snapshot::BuildSnapshot;
pub use watch::{FileChange, WatchHandle, WatchOptions};

use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use playbox_proto::codes;
use watch::{RawChange, Watchers};

/// Filesystem error. Every variant names the offending path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VfsError {
    #[error("no such file or directory: {path}")]
    NotFound { path: String },

    #[error("file already exists: {path}")]
    AlreadyExists { path: String },

    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    #[error("is a directory: {path}")]
    IsADirectory { path: String },

    #[error("directory not empty: {path}")]
    NotEmpty { path: String },

    #[error("file is not valid UTF-8: {path}")]
    InvalidData { path: String },

    #[error("invalid operation on {path}: {message}")]
    InvalidInput { path: String, message: String },
}

impl VfsError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => codes::NOT_FOUND,
            Self::AlreadyExists { .. } => codes::ALREADY_EXISTS,
            Self::NotADirectory { .. } => codes::NOT_A_DIRECTORY,
            Self::IsADirectory { .. } => codes::IS_A_DIRECTORY,
            Self::NotEmpty { .. } => codes::NOT_EMPTY,
            Self::InvalidData { .. } | Self::InvalidInput { .. } => codes::INVALID_DATA,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::NotFound { path }
            | Self::AlreadyExists { path }
            | Self::NotADirectory { path }
            | Self::IsADirectory { path }
            | Self::NotEmpty { path }
            | Self::InvalidData { path }
            | Self::InvalidInput { path, .. } => path,
        }
    }

    fn not_found(path: &str) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }
}

pub type VfsResult<T> = Result<T, VfsError>;

/// Entry type, with the numeric codes editors expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Unknown,
    File,
    Directory,
    SymbolicLink,
}

impl FileType {
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::File => 1,
            Self::Directory => 2,
            Self::SymbolicLink => 64,
        }
    }
}

/// Metadata derived on demand from the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStat {
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub size: u64,
    /// Creation time, milliseconds since the Unix epoch.
    pub ctime: u64,
    /// Modification time, milliseconds since the Unix epoch.
    pub mtime: u64,
    /// Write counter for files, `0` for directories.
    pub version: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    pub recursive: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenameOptions {
    pub overwrite: bool,
}

#[derive(Debug, Clone)]
enum Node {
    File {
        data: Arc<[u8]>,
        ctime: u64,
        mtime: u64,
        version: u64,
    },
    Dir {
        ctime: u64,
    },
}

#[derive(Debug, Default)]
struct Index {
    nodes: BTreeMap<String, Node>,
}

impl Index {
    /// Every entry strictly below `dir`.
    fn descendants<'a>(&'a self, dir: &str) -> impl Iterator<Item = (&'a String, &'a Node)> {
        let prefix = path::child_prefix(dir);
        self.nodes
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(&prefix))
    }

    fn is_file(&self, p: &str) -> bool {
        matches!(self.nodes.get(p), Some(Node::File { .. }))
    }

    fn is_dir(&self, p: &str) -> bool {
        p == "/"
            || matches!(self.nodes.get(p), Some(Node::Dir { .. }))
            || self.descendants(p).next().is_some()
    }

    fn exists(&self, p: &str) -> bool {
        self.is_file(p) || self.is_dir(p)
    }

    /// Fails if any ancestor of `p` is a file.
    fn check_ancestors(&self, p: &str) -> VfsResult<()> {
        let mut cur = path::parent(p);
        while let Some(dir) = cur {
            if self.is_file(dir) {
                return Err(VfsError::NotADirectory {
                    path: dir.to_string(),
                });
            }
            cur = path::parent(dir);
        }
        Ok(())
    }

    fn subtree_keys(&self, p: &str) -> Vec<String> {
        let mut keys: Vec<String> = self.descendants(p).map(|(k, _)| k.clone()).collect();
        if self.nodes.contains_key(p) {
            keys.push(p.to_string());
        }
        keys
    }
}

/// Handle to an in-memory filesystem.
#[derive(Clone, Default)]
pub struct Vfs {
    index: Arc<RwLock<Index>>,
    watchers: Arc<Watchers>,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("files", &self.read_index().nodes.len())
            .finish_non_exhaustive()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Vfs {
    /// Create an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_index(&self) -> RwLockReadGuard<'_, Index> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, Index> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read a file's bytes.
    pub fn read(&self, p: &str) -> VfsResult<Vec<u8>> {
        let p = path::normalize(p);
        let index = self.read_index();
        match index.nodes.get(&p) {
            Some(Node::File { data, .. }) => Ok(data.to_vec()),
            _ if index.is_dir(&p) => Err(VfsError::IsADirectory { path: p }),
            _ => Err(VfsError::NotFound { path: p }),
        }
    }

    /// Read a file as UTF-8 text.
    pub fn read_text(&self, p: &str) -> VfsResult<String> {
        let bytes = self.read(p)?;
        String::from_utf8(bytes).map_err(|_| VfsError::InvalidData {
            path: path::normalize(p),
        })
    }

    /// Create or replace a file, creating parent directories implicitly.
    pub fn write(&self, p: &str, content: impl AsRef<[u8]>) -> VfsResult<()> {
        let p = path::normalize(p);
        let change = {
            let mut index = self.write_index();
            if index.is_dir(&p) {
                return Err(VfsError::IsADirectory { path: p });
            }
            index.check_ancestors(&p)?;

            let now = now_ms();
            let data: Arc<[u8]> = Arc::from(content.as_ref());
            let (ctime, version, existed) = match index.nodes.get(&p) {
                Some(Node::File { ctime, version, .. }) => (*ctime, version + 1, true),
                _ => (now, 1, false),
            };
            index.nodes.insert(
                p.clone(),
                Node::File {
                    data,
                    ctime,
                    mtime: now,
                    version,
                },
            );
            if existed {
                RawChange::Change(p)
            } else {
                RawChange::Rename(p)
            }
        };
        self.watchers.publish(&[change]);
        Ok(())
    }

    /// Whether a file or directory exists at `p`.
    #[must_use]
    pub fn exists(&self, p: &str) -> bool {
        self.read_index().exists(&path::normalize(p))
    }

    /// Whether `p` is a file.
    #[must_use]
    pub fn is_file(&self, p: &str) -> bool {
        self.read_index().is_file(&path::normalize(p))
    }

    /// Metadata for a file or directory.
    pub fn stat(&self, p: &str) -> VfsResult<FileStat> {
        let p = path::normalize(p);
        let index = self.read_index();
        if let Some(Node::File {
            data,
            ctime,
            mtime,
            version,
        }) = index.nodes.get(&p)
        {
            return Ok(FileStat {
                file_type: FileType::File,
                size: data.len() as u64,
                ctime: *ctime,
                mtime: *mtime,
                version: *version,
            });
        }
        if !index.is_dir(&p) {
            return Err(VfsError::NotFound { path: p });
        }

        let mut ctime = match index.nodes.get(&p) {
            Some(Node::Dir { ctime }) => *ctime,
            _ => u64::MAX,
        };
        let mut mtime = 0;
        for (_, node) in index.descendants(&p) {
            match node {
                Node::File {
                    ctime: c, mtime: m, ..
                } => {
                    ctime = ctime.min(*c);
                    mtime = mtime.max(*m);
                }
                Node::Dir { ctime: c } => {
                    ctime = ctime.min(*c);
                    mtime = mtime.max(*c);
                }
            }
        }
        if ctime == u64::MAX {
            ctime = 0;
        }
        Ok(FileStat {
            file_type: FileType::Directory,
            size: 0,
            ctime,
            mtime: mtime.max(ctime),
            version: 0,
        })
    }

    /// Immediate children of a directory as `(name, type)`, sorted by name.
    pub fn list(&self, dir: &str) -> VfsResult<Vec<(String, FileType)>> {
        let dir = path::normalize(dir);
        let index = self.read_index();
        if index.is_file(&dir) {
            return Err(VfsError::NotADirectory { path: dir });
        }
        if !index.is_dir(&dir) {
            return Err(VfsError::NotFound { path: dir });
        }

        let prefix_len = path::child_prefix(&dir).len();
        let mut children: BTreeMap<String, FileType> = BTreeMap::new();
        for (key, node) in index.descendants(&dir) {
            let rest = &key[prefix_len..];
            let (name, nested) = match rest.find('/') {
                Some(idx) => (&rest[..idx], true),
                None => (rest, false),
            };
            let kind = match node {
                Node::File { .. } if !nested => FileType::File,
                _ => FileType::Directory,
            };
            children.entry(name.to_string()).or_insert(kind);
        }
        Ok(children.into_iter().collect())
    }

    /// Create a directory and any missing parents. Existing directories are left alone.
    pub fn create_dir(&self, p: &str) -> VfsResult<()> {
        let p = path::normalize(p);
        let created = {
            let mut index = self.write_index();
            if index.is_file(&p) {
                return Err(VfsError::AlreadyExists { path: p });
            }
            index.check_ancestors(&p)?;
            if index.is_dir(&p) {
                false
            } else {
                index.nodes.insert(p.clone(), Node::Dir { ctime: now_ms() });
                true
            }
        };
        if created {
            self.watchers.publish(&[RawChange::Rename(p)]);
        }
        Ok(())
    }

    /// Remove a file, or a directory (non-empty ones only with `recursive`).
    pub fn remove(&self, p: &str, options: RemoveOptions) -> VfsResult<()> {
        let p = path::normalize(p);
        let removed = {
            let mut index = self.write_index();
            if index.is_file(&p) {
                index.nodes.remove(&p);
                vec![p]
            } else if index.is_dir(&p) {
                let has_children = index.descendants(&p).next().is_some();
                if has_children && !options.recursive {
                    return Err(VfsError::NotEmpty { path: p });
                }
                let keys = index.subtree_keys(&p);
                for key in &keys {
                    index.nodes.remove(key);
                }
                let mut removed: Vec<String> = keys
                    .into_iter()
                    .filter(|k| k != &p)
                    .collect();
                removed.push(p);
                removed
            } else {
                return Err(VfsError::NotFound { path: p });
            }
        };
        let changes: Vec<RawChange> = removed.into_iter().map(RawChange::Rename).collect();
        self.watchers.publish(&changes);
        Ok(())
    }

    /// Move a file or a whole directory subtree.
    ///
    /// An existing target is replaced only with `overwrite`.
    pub fn rename(&self, from: &str, to: &str, options: RenameOptions) -> VfsResult<()> {
        let from = path::normalize(from);
        let to = path::normalize(to);
        if from == to {
            return if self.exists(&from) {
                Ok(())
            } else {
                Err(VfsError::not_found(&from))
            };
        }

        let mut changes = Vec::new();
        {
            let mut index = self.write_index();
            if !index.exists(&from) {
                return Err(VfsError::NotFound { path: from });
            }
            if from == "/" || path::is_within(&to, &from) {
                return Err(VfsError::InvalidInput {
                    path: to,
                    message: format!("cannot move {from} into itself"),
                });
            }
            if path::is_within(&from, &to) {
                return Err(VfsError::InvalidInput {
                    path: to,
                    message: format!("cannot move {from} onto its own ancestor"),
                });
            }
            if index.exists(&to) {
                if !options.overwrite {
                    return Err(VfsError::AlreadyExists { path: to });
                }
                for key in index.subtree_keys(&to) {
                    index.nodes.remove(&key);
                    changes.push(RawChange::Rename(key));
                }
            }
            index.check_ancestors(&to)?;

            let moved: Vec<(String, Node)> = index
                .subtree_keys(&from)
                .into_iter()
                .filter_map(|key| index.nodes.remove(&key).map(|node| (key, node)))
                .collect();
            for (key, node) in moved {
                let target = format!("{to}{}", &key[from.len()..]);
                changes.push(RawChange::Rename(key));
                changes.push(RawChange::Rename(target.clone()));
                index.nodes.insert(target, node);
            }
        }
        self.watchers.publish(&changes);
        Ok(())
    }

    /// Copy a file. An existing target is replaced only with `overwrite`.
    pub fn copy(&self, from: &str, to: &str, options: RenameOptions) -> VfsResult<()> {
        let from = path::normalize(from);
        let to = path::normalize(to);
        let data = {
            let index = self.read_index();
            match index.nodes.get(&from) {
                Some(Node::File { data, .. }) => Arc::clone(data),
                _ if index.is_dir(&from) => return Err(VfsError::IsADirectory { path: from }),
                _ => return Err(VfsError::NotFound { path: from }),
            }
        };
        if from != to && self.exists(&to) && !options.overwrite {
            return Err(VfsError::AlreadyExists { path: to });
        }
        self.write(&to, data)
    }

    /// Flat copy of every file, taken under a single read lock.
    #[must_use]
    pub fn snapshot(&self) -> BuildSnapshot {
        let index = self.read_index();
        index
            .nodes
            .iter()
            .filter_map(|(k, node)| match node {
                Node::File { data, .. } => Some((k.clone(), Arc::clone(data))),
                Node::Dir { .. } => None,
            })
            .collect()
    }

    /// A fresh filesystem populated from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &BuildSnapshot) -> Self {
        let now = now_ms();
        let nodes = snapshot
            .iter()
            .map(|(p, data)| {
                (
                    path::normalize(p),
                    Node::File {
                        data: Arc::clone(data),
                        ctime: now,
                        mtime: now,
                        version: 1,
                    },
                )
            })
            .collect();
        Self {
            index: Arc::new(RwLock::new(Index { nodes })),
            watchers: Arc::default(),
        }
    }

    /// Subscribe to changes at or below `p`.
    ///
    /// The handler runs on a dedicated thread. Raw change notifications are
    /// classified into [`FileChange`] by probing existence after the fact, so
    /// delivery is best-effort: a path created and removed in quick succession
    /// may be reported twice as deleted.
    pub fn watch<F>(&self, p: &str, options: WatchOptions, handler: F) -> VfsResult<WatchHandle>
    where
        F: FnMut(FileChange) + Send + 'static,
    {
        let p = path::normalize(p);
        watch::subscribe(
            &self.watchers,
            Arc::downgrade(&self.index),
            p,
            options,
            handler,
        )
        .map_err(|e| VfsError::InvalidInput {
            path: "/".to_string(),
            message: format!("failed to start watcher thread: {e}"),
        })
    }
}
