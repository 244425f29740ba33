#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod bundler;
pub mod compiler;
pub mod config;
pub mod error;
pub mod fetch;
pub mod live;
pub mod preview;
pub mod vfs;
pub mod version;
pub mod worker;

pub use bundler::{BuildError, BundleEngine, BundleOptions, Bundler, OutputChunk};
pub use config::PlayboxConfig;
pub use error::Error;
pub use live::{EditLoop, EditLoopHandle, LoopEvent, Preview};
pub use preview::{assemble, TemplateError, TemplateSource, SCRIPT_MARKER};
pub use vfs::{BuildSnapshot, FileChange, Vfs, VfsError};
pub use version::VERSION;
pub use worker::{BridgeError, Worker, WorkerBridge};
