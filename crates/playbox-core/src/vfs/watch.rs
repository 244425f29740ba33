use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::thread::{self, JoinHandle};

use super::{path, Index};

/// Raw notification published by mutations, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum RawChange {
    /// A path appeared or disappeared.
    Rename(String),
    /// A file's content changed in place.
    Change(String),
}

impl RawChange {
    fn path(&self) -> &str {
        match self {
            Self::Rename(p) | Self::Change(p) => p,
        }
    }
}

/// A classified change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Created(String),
    Changed(String),
    Deleted(String),
}

impl FileChange {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Created(p) | Self::Changed(p) | Self::Deleted(p) => p,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Also report changes in nested directories, not just direct children.
    pub recursive: bool,
}

struct Subscription {
    id: u64,
    root: String,
    recursive: bool,
    tx: Sender<RawChange>,
}

impl Subscription {
    fn matches(&self, p: &str) -> bool {
        if p == self.root {
            return true;
        }
        if self.recursive {
            path::is_within(p, &self.root)
        } else {
            path::parent(p) == Some(self.root.as_str())
        }
    }
}

#[derive(Default)]
pub(super) struct Watchers {
    next_id: AtomicU64,
    subs: Mutex<Vec<Subscription>>,
}

impl Watchers {
    pub(super) fn publish(&self, changes: &[RawChange]) {
        let mut subs = self.subs.lock().unwrap_or_else(PoisonError::into_inner);
        if subs.is_empty() {
            return;
        }
        subs.retain(|sub| {
            changes
                .iter()
                .filter(|c| sub.matches(c.path()))
                .all(|c| sub.tx.send(c.clone()).is_ok())
        });
    }

    fn unsubscribe(&self, id: u64) {
        self.subs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|sub| sub.id != id);
    }
}

/// Cancellable watch subscription. Dropping it cancels too.
pub struct WatchHandle {
    id: u64,
    watchers: Weak<Watchers>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Stop delivering events and wait for the delivery thread to exit.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(watchers) = self.watchers.upgrade() {
            watchers.unsubscribe(self.id);
        }
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Classify a raw notification by probing whether the path exists now.
fn classify(raw: RawChange, index: &RwLock<Index>) -> FileChange {
    match raw {
        RawChange::Change(p) => FileChange::Changed(p),
        RawChange::Rename(p) => {
            let exists = index
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .exists(&p);
            if exists {
                FileChange::Created(p)
            } else {
                FileChange::Deleted(p)
            }
        }
    }
}

fn deliver<F>(rx: Receiver<RawChange>, index: Weak<RwLock<Index>>, mut handler: F)
where
    F: FnMut(FileChange),
{
    while let Ok(raw) = rx.recv() {
        let Some(index) = index.upgrade() else {
            break;
        };
        handler(classify(raw, &index));
    }
}

pub(super) fn subscribe<F>(
    watchers: &Arc<Watchers>,
    index: Weak<RwLock<Index>>,
    root: String,
    options: WatchOptions,
    handler: F,
) -> std::io::Result<WatchHandle>
where
    F: FnMut(FileChange) + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let id = watchers.next_id.fetch_add(1, Ordering::Relaxed);
    let thread = thread::Builder::new()
        .name(format!("vfs-watch-{id}"))
        .spawn(move || deliver(rx, index, handler))?;

    watchers
        .subs
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(Subscription {
            id,
            root,
            recursive: options.recursive,
            tx,
        });

    Ok(WatchHandle {
        id,
        watchers: Arc::downgrade(watchers),
        thread: Some(thread),
    })
}
