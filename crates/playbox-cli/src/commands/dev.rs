//! `playbox dev` command implementation.
//!
//! ```text
//! disk change (notify)
//!   → host workspace (Vfs)
//!   → edit loop (debounce, snapshot)
//!   → worker bridge (build + assemble)
//!   → preview swap → /__reload tells the shell page to point its iframe at /preview/<seq>.html
//! ```

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path as AxumPath, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use miette::{IntoDiagnostic, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use playbox_core::live::{EditLoop, EditLoopHandle, LoopEvent};
use playbox_core::preview::data_uri;
use playbox_core::vfs::{RemoveOptions, Vfs};
use playbox_core::WorkerBridge;
use playbox_util::fs::workspace_path;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::project::{self, Overrides};

/// The page served at `/`: an iframe plus the reload socket client.
const SHELL_HTML: &str = include_str!("dev_shell.html");

/// Dev server action.
#[derive(Debug, Clone)]
pub struct DevAction {
    /// Project directory.
    pub dir: PathBuf,
    pub overrides: Overrides,
}

/// Message pushed to the shell page over `/__reload`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ReloadMessage {
    /// A new preview is available at `/preview/<seq>.html`.
    Preview { seq: u64 },
    /// A rebuild failed; the previous preview stays up.
    Error {
        seq: u64,
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        module_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        diagnostic: Option<String>,
    },
}

impl ReloadMessage {
    fn from_event(event: LoopEvent) -> Option<Self> {
        match event {
            LoopEvent::Failed { seq, error } => Some(Self::Error {
                seq,
                code: error.code,
                message: error.message,
                module_id: error.module_id,
                diagnostic: error.diagnostic,
            }),
            LoopEvent::Started { .. } | LoopEvent::Applied { .. } => None,
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

type AppState = Arc<EditLoopHandle>;

/// Run the dev server.
pub async fn run(action: DevAction) -> Result<()> {
    let dir = action.dir.canonicalize().into_diagnostic()?;
    let config = project::load_config(&dir, &action.overrides)?;
    let fs = project::mirror(&dir)?;
    let bind = format!("{}:{}", config.server.host, config.server.port);
    let debounce = config.debounce();

    let bridge = Arc::new(WorkerBridge::spawn(config, Some(dir.clone())).into_diagnostic()?);
    let live = Arc::new(EditLoop::new(fs.clone(), bridge, debounce).spawn());
    let _follow = live.follow(&fs).into_diagnostic()?;
    let _watcher = watch_disk(dir.clone(), fs)?;
    live.flush();

    let app = router(Arc::clone(&live));
    let listener = tokio::net::TcpListener::bind(&bind).await.into_diagnostic()?;
    let addr = listener.local_addr().into_diagnostic()?;
    info!(dir = %dir.display(), addr = %addr, "Dev server listening");

    println!();
    println!("  Preview running at http://{addr}");
    println!("  Watching {}", dir.display());
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .into_diagnostic()?;

    info!("Dev server stopped");
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_shell))
        .route("/preview/:file", get(serve_preview))
        .route("/preview.datauri", get(serve_data_uri))
        .route("/__reload", get(reload_websocket))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn serve_shell() -> Html<&'static str> {
    Html(SHELL_HTML)
}

/// `12.html` → `12`.
fn parse_seq(file: &str) -> Option<u64> {
    file.strip_suffix(".html")?.parse().ok()
}

/// Serve the current preview under its per-build URL.
async fn serve_preview(State(live): State<AppState>, AxumPath(file): AxumPath<String>) -> Response {
    let Some(seq) = parse_seq(&file) else {
        return (StatusCode::NOT_FOUND, "not a preview").into_response();
    };
    match live.current() {
        Some(preview) if preview.seq == seq => (
            [
                (header::CONTENT_TYPE, "text/html; charset=utf-8"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            preview.document.clone(),
        )
            .into_response(),
        Some(preview) => (
            StatusCode::GONE,
            format!("preview {seq} was replaced by {}", preview.seq),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no preview yet").into_response(),
    }
}

/// Serve the current preview as a `data:` URI.
async fn serve_data_uri(State(live): State<AppState>) -> Response {
    match live.current() {
        Some(preview) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            data_uri(&preview.document),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no preview yet").into_response(),
    }
}

async fn reload_websocket(ws: WebSocketUpgrade, State(live): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_reload_socket(socket, live))
}

/// Push preview swaps and build failures to one shell page.
async fn handle_reload_socket(mut socket: WebSocket, live: AppState) {
    let mut previews = live.previews();
    let mut events = live.events();

    let current = live.current().map(|p| p.seq);
    if let Some(seq) = current {
        let msg = ReloadMessage::Preview { seq }.to_json();
        if socket.send(Message::Text(msg)).await.is_err() {
            return;
        }
    }

    loop {
        let outgoing = tokio::select! {
            changed = previews.changed() => {
                if changed.is_err() {
                    break;
                }
                let seq = previews.borrow_and_update().as_ref().map(|p| p.seq);
                seq.map(|seq| ReloadMessage::Preview { seq })
            }
            event = events.recv() => match event {
                Ok(event) => ReloadMessage::from_event(event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Reload socket lagged");
                    None
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => None,
            },
        };
        if let Some(msg) = outgoing {
            if socket.send(Message::Text(msg.to_json())).await.is_err() {
                break;
            }
        }
    }
}

// ============================================================================
// Disk Watching
// ============================================================================

/// Mirror changes under `root` into the host workspace.
///
/// The returned watcher must be kept alive; dropping it stops the mirror.
fn watch_disk(root: PathBuf, fs: Vfs) -> Result<RecommendedWatcher> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = RecommendedWatcher::new(tx, notify::Config::default()).into_diagnostic()?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .into_diagnostic()?;
    info!(root = %root.display(), "Watching directory");

    std::thread::Builder::new()
        .name("playbox-disk-watch".into())
        .spawn(move || {
            for result in rx {
                match result {
                    Ok(event) => {
                        for path in &event.paths {
                            sync_path(&root, &fs, path);
                        }
                    }
                    Err(e) => warn!(error = %e, "Watch error"),
                }
            }
            debug!("Disk watcher stopped");
        })
        .into_diagnostic()?;

    Ok(watcher)
}

/// Bring one workspace path in line with the disk.
fn sync_path(root: &Path, fs: &Vfs, disk: &Path) {
    let Some(path) = workspace_path(root, disk) else {
        return;
    };
    match std::fs::metadata(disk) {
        Ok(meta) if meta.is_file() => {
            let Ok(bytes) = std::fs::read(disk) else {
                return;
            };
            if fs.read(&path).is_ok_and(|current| current == bytes) {
                return;
            }
            debug!(path = %path, "Mirroring write");
            if let Err(e) = fs.write(&path, bytes) {
                warn!(path = %path, error = %e, "Failed to mirror write");
            }
        }
        Ok(_) => {}
        Err(_) => {
            if fs.exists(&path) {
                debug!(path = %path, "Mirroring delete");
                if let Err(e) = fs.remove(&path, RemoveOptions { recursive: true }) {
                    warn!(path = %path, error = %e, "Failed to mirror delete");
                }
            }
        }
    }
}
