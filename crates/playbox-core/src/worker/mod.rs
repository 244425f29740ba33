//! Bundler worker thread and the bridge that talks to it.
//!
//! The worker owns the stage chain, the fetch cache, the template and the
//! build options. It exposes one call: a serialized file-map snapshot in, a
//! JSON [`BundleResponse`] out. Nothing but strings crosses the boundary; each
//! request gets a fresh [`Vfs`] rebuilt from its snapshot.
//!
//! The worker is a dedicated OS thread so blocking work (remote fetches,
//! component compiler processes, rayon frontiers) never runs on the host
//! runtime. Requests are served one at a time in arrival order.

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::bundler::plugins::default_plugins;
use crate::bundler::{BuildError, BundleEngine, BundleOptions, Bundler};
use crate::compiler::{ComponentCompiler, ProcessCompiler, SfcCompiler};
use crate::config::{CompilerConfig, PlayboxConfig};
use crate::fetch::FetchCache;
use crate::preview::{assemble, TemplateSource};
use crate::vfs::{path, BuildSnapshot, Vfs};
use playbox_proto::{codes, decode_response, encode_response, BundleResponse, ErrorInfo};

/// Thread name of the bundler worker.
pub const WORKER_THREAD: &str = "playbox-bundler";

/// Failure of a bridged `bundle` call.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// The worker could not start or has gone away.
    #[error("bundler worker unavailable: {0}")]
    Unavailable(String),

    /// The worker answered with something that is not a response envelope.
    #[error("malformed worker response: {0}")]
    Decode(String),

    /// The build failed inside the worker.
    #[error("{}: {}", .0.code, .0.message)]
    Build(ErrorInfo),
}

impl BridgeError {
    /// The structured build error, for every kind of failure.
    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        match self {
            Self::Build(info) => info.clone(),
            Self::Unavailable(_) => ErrorInfo::new(codes::WORKER_UNAVAILABLE, self.to_string()),
            Self::Decode(_) => ErrorInfo::new(codes::INTERNAL_ERROR, self.to_string()),
        }
    }
}

/// Everything a build needs besides the files.
pub struct Worker {
    engine: Box<dyn BundleEngine>,
    entry: String,
    template: TemplateSource,
    options: BundleOptions,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("entry", &self.entry)
            .field("template", &self.template)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Worker {
    #[must_use]
    pub fn new(engine: impl BundleEngine + 'static, entry: impl Into<String>) -> Self {
        Self {
            engine: Box::new(engine),
            entry: entry.into(),
            template: TemplateSource::Auto,
            options: BundleOptions::default(),
        }
    }

    #[must_use]
    pub fn with_template(mut self, template: TemplateSource) -> Self {
        self.template = template;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: BundleOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the default stage chain described by `config`.
    ///
    /// Creates the HTTP fetch cache, so call this on the worker thread.
    /// `project_dir` is where an external component compiler runs.
    pub fn from_config(config: &PlayboxConfig, project_dir: Option<&Path>) -> Result<Self, BridgeError> {
        let registry = config
            .registry_url()
            .map_err(|e| BridgeError::Unavailable(e.to_string()))?;
        let fetch = Arc::new(
            FetchCache::http().map_err(|e| BridgeError::Unavailable(e.to_string()))?,
        );
        let compiler = component_compiler(&config.component.compiler, project_dir)?;
        debug!(compiler = compiler.name(), registry = %registry, "Configured stage chain");

        let bundler = Bundler::new(default_plugins(
            compiler,
            &config.component.extension,
            registry,
            &fetch,
        ));
        let template = config
            .template
            .as_deref()
            .map_or(TemplateSource::Auto, |p| TemplateSource::Workspace(path::normalize(p)));

        Ok(Self::new(bundler, config.entry.clone())
            .with_template(template)
            .with_options(BundleOptions {
                treeshake: config.treeshake,
            }))
    }

    /// Serve one request: snapshot JSON in, response envelope JSON out.
    #[must_use]
    pub fn handle(&self, payload: &str) -> String {
        let started = Instant::now();
        let response = match self.bundle(payload) {
            Ok(document) => {
                info!(
                    bytes = document.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Bundled preview"
                );
                BundleResponse::success(document)
            }
            Err(error) => {
                warn!(code = %error.code, module = ?error.module_id, "Bundle failed: {}", error.message);
                BundleResponse::failure(error)
            }
        };
        encode_response(&response).unwrap_or_default()
    }

    fn bundle(&self, payload: &str) -> Result<String, ErrorInfo> {
        let snapshot = BuildSnapshot::decode(payload)
            .map_err(|e| ErrorInfo::new(codes::INVALID_REQUEST, format!("invalid snapshot: {e}")))?;
        let fs = Vfs::from_snapshot(&snapshot);

        let chunk = self
            .engine
            .build(&self.entry, &fs, &self.options)
            .map_err(|e| e.to_error_info())?;

        let template = match chunk.template {
            Some(template) => template,
            None => self.template.load(&fs).map_err(|e| ErrorInfo {
                code: codes::TEMPLATE_ERROR.to_string(),
                message: format!("cannot load template: {e}"),
                module_id: Some(e.path().to_string()),
                diagnostic: None,
            })?,
        };

        assemble(&template, &chunk.code).map_err(|e| BuildError::from(e).to_error_info())
    }
}

fn component_compiler(
    config: &CompilerConfig,
    project_dir: Option<&Path>,
) -> Result<Arc<dyn ComponentCompiler>, BridgeError> {
    let with_cwd = |compiler: ProcessCompiler| match project_dir {
        Some(dir) => compiler.with_cwd(dir),
        None => compiler,
    };
    let compiler: Arc<dyn ComponentCompiler> = match config {
        CompilerConfig::Builtin => Arc::new(SfcCompiler::new()),
        CompilerConfig::Ripple { node } => Arc::new(with_cwd(
            ProcessCompiler::ripple(node)
                .map_err(|e| BridgeError::Unavailable(format!("cannot prepare ripple compiler: {e}")))?,
        )),
        CompilerConfig::Process { program, args } => {
            Arc::new(with_cwd(ProcessCompiler::new(program, args.clone())))
        }
    };
    Ok(compiler)
}

struct Request {
    payload: String,
    reply: oneshot::Sender<String>,
}

/// Handle to the worker thread.
///
/// Dropping the bridge closes the request channel and joins the thread.
pub struct WorkerBridge {
    sender: Option<mpsc::Sender<Request>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerBridge")
            .field("running", &self.sender.is_some())
            .finish()
    }
}

impl WorkerBridge {
    /// Start a worker for a project configuration.
    pub fn spawn(config: PlayboxConfig, project_dir: Option<PathBuf>) -> Result<Self, BridgeError> {
        Self::spawn_with(move || Worker::from_config(&config, project_dir.as_deref()))
    }

    /// Start a worker built by `factory` on the worker thread.
    ///
    /// Returns once the worker is ready, or with the factory's error.
    pub fn spawn_with<F>(factory: F) -> Result<Self, BridgeError>
    where
        F: FnOnce() -> Result<Worker, BridgeError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), BridgeError>>(1);

        let handle = thread::Builder::new()
            .name(WORKER_THREAD.into())
            .spawn(move || {
                let worker = match factory() {
                    Ok(worker) => {
                        let _ = ready_tx.send(Ok(()));
                        worker
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                debug!(entry = %worker.entry, "Bundler worker ready");
                while let Ok(request) = rx.recv() {
                    let response = worker.handle(&request.payload);
                    let _ = request.reply.send(response);
                }
                debug!("Bundler worker stopped");
            })
            .map_err(|e| BridgeError::Unavailable(format!("failed to spawn worker thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                sender: Some(tx),
                thread: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(BridgeError::Unavailable(
                "worker thread exited during startup".to_string(),
            )),
        }
    }

    /// The raw boundary call: snapshot JSON in, response envelope JSON out.
    pub async fn bundle_serialized(&self, payload: String) -> Result<String, BridgeError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| BridgeError::Unavailable("worker stopped".to_string()))?;
        let (reply, response) = oneshot::channel();
        sender
            .send(Request { payload, reply })
            .map_err(|_| BridgeError::Unavailable("worker thread died".to_string()))?;
        response
            .await
            .map_err(|_| BridgeError::Unavailable("worker dropped the request".to_string()))
    }

    /// Bundle a snapshot into a preview document.
    pub async fn bundle(&self, snapshot: &BuildSnapshot) -> Result<String, BridgeError> {
        let payload = snapshot
            .encode()
            .map_err(|e| BridgeError::Decode(e.to_string()))?;
        let response = self.bundle_serialized(payload).await?;
        decode_response(&response)
            .map_err(|e| BridgeError::Decode(e.to_string()))?
            .into_result()
            .map_err(BridgeError::Build)
    }
}

impl Drop for WorkerBridge {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Bundler worker panicked");
            }
        }
    }
}
