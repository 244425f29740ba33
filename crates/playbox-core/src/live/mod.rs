//! Debounced edit → rebuild → preview loop.
//!
//! The loop is either idle or has a rebuild pending. Each edit (re)starts the
//! debounce timer; when it fires the live filesystem is snapshotted and sent
//! to a [`PreviewBuilder`]. Builds never overlap: a timer that fires while a
//! build runs queues one more build for when it settles.
//!
//! Builds are numbered. A preview replaces the current one only if its number
//! is higher, so a late result can never roll the page back. Failures leave
//! the last good preview in place and are published as [`LoopEvent`]s.

use futures::future::{BoxFuture, FutureExt, OptionFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::vfs::{BuildSnapshot, Vfs, VfsResult, WatchHandle, WatchOptions};
use crate::worker::{BridgeError, WorkerBridge};
use playbox_proto::ErrorInfo;

/// Capacity of the loop event channel.
const EVENT_CAPACITY: usize = 64;

/// Something that turns a snapshot into a preview document.
pub trait PreviewBuilder: Send + Sync + 'static {
    fn build(&self, snapshot: BuildSnapshot) -> BoxFuture<'static, Result<String, BridgeError>>;
}

impl PreviewBuilder for Arc<WorkerBridge> {
    fn build(&self, snapshot: BuildSnapshot) -> BoxFuture<'static, Result<String, BridgeError>> {
        let bridge = Arc::clone(self);
        async move { bridge.bundle(&snapshot).await }.boxed()
    }
}

/// A rendered preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    /// Build sequence number.
    pub seq: u64,
    pub document: String,
}

/// Something that happened to a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// A build started.
    Started { seq: u64 },
    /// A build succeeded and its preview was applied.
    Applied { seq: u64, duration_ms: u64 },
    /// A build failed; the previous preview stays.
    Failed { seq: u64, error: ErrorInfo },
}

/// Loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Pending,
}

/// The current preview, replaced only by newer builds.
#[derive(Debug)]
pub struct PreviewSlot {
    tx: watch::Sender<Option<Arc<Preview>>>,
}

impl Default for PreviewSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewSlot {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tx: watch::channel(None).0,
        }
    }

    /// Apply `preview` if it is newer than the current one.
    pub fn offer(&self, preview: Preview) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|current| {
            if current.as_ref().is_some_and(|c| c.seq >= preview.seq) {
                return false;
            }
            *current = Some(Arc::new(preview));
            applied = true;
            true
        });
        applied
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<Preview>> {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Preview>>> {
        self.tx.subscribe()
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    /// Restart the debounce timer.
    Edit,
    /// Rebuild without waiting.
    Flush,
}

type Outcome = (u64, String, Instant, Result<String, BridgeError>);

/// Builder for the edit loop task.
pub struct EditLoop {
    fs: Vfs,
    builder: Arc<dyn PreviewBuilder>,
    debounce: Duration,
}

impl EditLoop {
    #[must_use]
    pub fn new(fs: Vfs, builder: impl PreviewBuilder, debounce: Duration) -> Self {
        Self {
            fs,
            builder: Arc::new(builder),
            debounce,
        }
    }

    /// Start the loop on the current tokio runtime.
    #[must_use]
    pub fn spawn(self) -> EditLoopHandle {
        let (commands, rx) = mpsc::unbounded_channel();
        let slot = Arc::new(PreviewSlot::new());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state_tx, state) = watch::channel(LoopState::Idle);

        let task = tokio::spawn(
            Runner {
                fs: self.fs,
                builder: self.builder,
                debounce: self.debounce,
                slot: Arc::clone(&slot),
                events: events.clone(),
                state: state_tx,
                next_seq: 0,
                last_fingerprint: None,
            }
            .run(rx),
        );

        EditLoopHandle {
            commands,
            slot,
            events,
            state,
            task,
        }
    }
}

struct Runner {
    fs: Vfs,
    builder: Arc<dyn PreviewBuilder>,
    debounce: Duration,
    slot: Arc<PreviewSlot>,
    events: broadcast::Sender<LoopEvent>,
    state: watch::Sender<LoopState>,
    next_seq: u64,
    /// Fingerprint of the files behind the current preview.
    last_fingerprint: Option<String>,
}

impl Runner {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut deadline: Option<Instant> = None;
        let mut in_flight: Option<BoxFuture<'static, Outcome>> = None;
        let mut queued = false;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Edit) => deadline = Some(Instant::now() + self.debounce),
                    Some(Command::Flush) => deadline = Some(Instant::now()),
                    None => break,
                },
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    if in_flight.is_some() {
                        queued = true;
                    } else {
                        in_flight = self.launch();
                    }
                },
                Some(outcome) = OptionFuture::from(in_flight.as_mut()), if in_flight.is_some() => {
                    in_flight = None;
                    self.settle(outcome);
                    if std::mem::take(&mut queued) {
                        in_flight = self.launch();
                    }
                },
            }
            let state = if deadline.is_some() || queued {
                LoopState::Pending
            } else {
                LoopState::Idle
            };
            self.state.send_if_modified(|current| std::mem::replace(current, state) != state);
        }

        // Let a running build land before the loop goes away.
        if let Some(build) = in_flight {
            self.settle(build.await);
        }
        debug!("Edit loop stopped");
    }

    fn launch(&mut self) -> Option<BoxFuture<'static, Outcome>> {
        let snapshot = self.fs.snapshot();
        let fingerprint = snapshot.fingerprint();
        if self.last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            debug!("Workspace unchanged, skipping rebuild");
            return None;
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        debug!(seq, files = snapshot.len(), "Rebuilding preview");
        let _ = self.events.send(LoopEvent::Started { seq });

        let build = self.builder.build(snapshot);
        let started = Instant::now();
        Some(async move { (seq, fingerprint, started, build.await) }.boxed())
    }

    fn settle(&mut self, (seq, fingerprint, started, result): Outcome) {
        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(document) => {
                if self.slot.offer(Preview { seq, document }) {
                    self.last_fingerprint = Some(fingerprint);
                    info!(seq, duration_ms, "Preview updated");
                    let _ = self.events.send(LoopEvent::Applied { seq, duration_ms });
                } else {
                    debug!(seq, "Discarded stale preview");
                }
            }
            Err(e) => {
                let error = e.info();
                warn!(seq, code = %error.code, module = ?error.module_id, "Rebuild failed: {}", error.message);
                let _ = self.events.send(LoopEvent::Failed { seq, error });
            }
        }
    }
}

/// Handle to a running edit loop.
#[derive(Debug)]
pub struct EditLoopHandle {
    commands: mpsc::UnboundedSender<Command>,
    slot: Arc<PreviewSlot>,
    events: broadcast::Sender<LoopEvent>,
    state: watch::Receiver<LoopState>,
    task: JoinHandle<()>,
}

impl EditLoopHandle {
    /// Record an edit: restart the debounce timer.
    pub fn edit(&self) {
        let _ = self.commands.send(Command::Edit);
    }

    /// Rebuild as soon as no build is running.
    pub fn flush(&self) {
        let _ = self.commands.send(Command::Flush);
    }

    /// Feed every change under `/` of `fs` into the loop as an edit.
    pub fn follow(&self, fs: &Vfs) -> VfsResult<WatchHandle> {
        let commands = self.commands.clone();
        fs.watch("/", WatchOptions { recursive: true }, move |change| {
            debug!(path = change.path(), "Workspace changed");
            let _ = commands.send(Command::Edit);
        })
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<Preview>> {
        self.slot.current()
    }

    #[must_use]
    pub fn previews(&self) -> watch::Receiver<Option<Arc<Preview>>> {
        self.slot.subscribe()
    }

    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<LoopEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Stop taking edits and wait for the loop (and any running build) to finish.
    pub async fn shutdown(self) {
        drop(self.commands);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records the snapshots it sees; each build takes `delay`.
    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
        delay: Duration,
        fail: bool,
    }

    impl Recorder {
        fn builds(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl PreviewBuilder for Recorder {
        fn build(&self, snapshot: BuildSnapshot) -> BoxFuture<'static, Result<String, BridgeError>> {
            let text = snapshot
                .get("/main.ts")
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            self.seen.lock().unwrap().push(text.clone());
            let delay = self.delay;
            let fail = self.fail;
            async move {
                tokio::time::sleep(delay).await;
                if fail {
                    Err(BridgeError::Build(ErrorInfo::new("COMPILE_ERROR", "bad")))
                } else {
                    Ok(format!("<doc>{text}</doc>"))
                }
            }
            .boxed()
        }
    }

    const DEBOUNCE: Duration = Duration::from_millis(300);

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_inside_window_build_once() {
        let fs = Vfs::new();
        let recorder = Recorder::default();
        let handle = EditLoop::new(fs.clone(), recorder.clone(), DEBOUNCE).spawn();

        for i in 0..5 {
            fs.write("/main.ts", format!("v{i}")).unwrap();
            handle.edit();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        settle().await;

        assert_eq!(recorder.builds(), vec!["v4"]);
        let preview = handle.current().unwrap();
        assert_eq!(preview.seq, 1);
        assert_eq!(preview.document, "<doc>v4</doc>");
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_moves_between_idle_and_pending() {
        let handle = EditLoop::new(Vfs::new(), Recorder::default(), DEBOUNCE).spawn();
        assert_eq!(handle.state(), LoopState::Idle);
        handle.edit();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.state(), LoopState::Pending);
        settle().await;
        assert_eq!(handle.state(), LoopState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_build_separately() {
        let fs = Vfs::new();
        let recorder = Recorder::default();
        let handle = EditLoop::new(fs.clone(), recorder.clone(), DEBOUNCE).spawn();

        fs.write("/main.ts", "a").unwrap();
        handle.edit();
        settle().await;
        fs.write("/main.ts", "b").unwrap();
        handle.edit();
        settle().await;

        assert_eq!(recorder.builds(), vec!["a", "b"]);
        assert_eq!(handle.current().unwrap().seq, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_builds_do_not_overlap() {
        let fs = Vfs::new();
        let recorder = Recorder {
            delay: Duration::from_secs(2),
            ..Recorder::default()
        };
        let handle = EditLoop::new(fs.clone(), recorder.clone(), DEBOUNCE).spawn();

        fs.write("/main.ts", "first").unwrap();
        handle.edit();
        tokio::time::sleep(Duration::from_millis(500)).await;
        // First build is running; this edit's timer fires before it settles.
        fs.write("/main.ts", "second").unwrap();
        handle.edit();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(recorder.builds(), vec!["first"]);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(recorder.builds(), vec!["first", "second"]);
        let preview = handle.current().unwrap();
        assert_eq!(preview.seq, 2);
        assert_eq!(preview.document, "<doc>second</doc>");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_keep_previous_preview() {
        let fs = Vfs::new();
        fs.write("/main.ts", "ok").unwrap();
        let ok = EditLoop::new(fs.clone(), Recorder::default(), DEBOUNCE).spawn();
        ok.flush();
        settle().await;
        assert_eq!(ok.current().unwrap().document, "<doc>ok</doc>");

        let failing = EditLoop::new(
            fs.clone(),
            Recorder {
                fail: true,
                ..Recorder::default()
            },
            DEBOUNCE,
        )
        .spawn();
        let mut events = failing.events();
        failing.flush();
        settle().await;
        assert!(failing.current().is_none());
        assert_eq!(events.recv().await.unwrap(), LoopEvent::Started { seq: 1 });
        match events.recv().await.unwrap() {
            LoopEvent::Failed { seq, error } => {
                assert_eq!(seq, 1);
                assert_eq!(error.code, "COMPILE_ERROR");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_workspace_is_not_rebuilt() {
        let fs = Vfs::new();
        fs.write("/main.ts", "same").unwrap();
        let recorder = Recorder::default();
        let handle = EditLoop::new(fs.clone(), recorder.clone(), DEBOUNCE).spawn();
        handle.flush();
        settle().await;
        handle.edit();
        settle().await;
        assert_eq!(recorder.builds(), vec!["same"]);
    }

    #[test]
    fn test_stale_preview_never_replaces_newer() {
        let slot = PreviewSlot::new();
        assert!(slot.offer(Preview {
            seq: 2,
            document: "new".into()
        }));
        assert!(!slot.offer(Preview {
            seq: 1,
            document: "old".into()
        }));
        assert!(!slot.offer(Preview {
            seq: 2,
            document: "again".into()
        }));
        assert_eq!(slot.current().unwrap().document, "new");
    }

    #[tokio::test]
    async fn test_follow_turns_writes_into_builds() {
        let fs = Vfs::new();
        let recorder = Recorder::default();
        let handle = EditLoop::new(fs.clone(), recorder.clone(), Duration::from_millis(20)).spawn();
        let mut previews = handle.previews();
        let _watch = handle.follow(&fs).unwrap();

        fs.write("/main.ts", "watched").unwrap();
        tokio::time::timeout(Duration::from_secs(5), previews.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.current().unwrap().document, "<doc>watched</doc>");
        handle.shutdown().await;
    }
}
