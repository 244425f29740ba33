//! `playbox bundle` command implementation.
//!
//! One-shot build of a project directory through the worker bridge, the same
//! path the dev server uses for every rebuild.

use miette::{miette, IntoDiagnostic, Result};
use playbox_core::preview::data_uri;
use playbox_core::WorkerBridge;
use playbox_proto::{ErrorInfo, BUNDLE_RESULT_SCHEMA_VERSION};
use playbox_util::fs::atomic_write;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

use crate::project::{self, Overrides};

/// Bundle command action.
#[derive(Debug, Clone)]
pub struct BundleAction {
    /// Project directory.
    pub dir: PathBuf,
    pub overrides: Overrides,
    /// Output file (if None, prints to stdout).
    pub outfile: Option<PathBuf>,
    /// Print a `data:` URI instead of the document.
    pub data_uri: bool,
}

/// JSON output for the bundle command.
#[derive(Serialize)]
struct BundleResultJson {
    schema_version: u32,
    ok: bool,
    entry: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    outfile: Option<String>,
    files: usize,
    size_bytes: usize,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

/// Run the bundle command.
pub async fn run(action: BundleAction, json: bool) -> Result<()> {
    let start = Instant::now();
    let config = project::load_config(&action.dir, &action.overrides)?;
    let snapshot = project::snapshot(&action.dir)?;
    let entry = config.entry.clone();

    let bridge = WorkerBridge::spawn(config, Some(action.dir.clone())).into_diagnostic()?;
    let result = bridge.bundle(&snapshot).await;
    drop(bridge);
    let duration_ms = start.elapsed().as_millis() as u64;

    let mut summary = BundleResultJson {
        schema_version: BUNDLE_RESULT_SCHEMA_VERSION,
        ok: false,
        entry,
        outfile: action.outfile.as_ref().map(|p| p.display().to_string()),
        files: snapshot.len(),
        size_bytes: 0,
        duration_ms,
        document: None,
        error: None,
    };

    match result {
        Ok(document) => {
            let output = if action.data_uri {
                data_uri(&document)
            } else {
                document
            };
            summary.ok = true;
            summary.size_bytes = output.len();

            if let Some(outfile) = &action.outfile {
                atomic_write(outfile, output.as_bytes()).into_diagnostic()?;
                if !json {
                    println!(
                        "  {} -> {} ({} files, {:.1}KB, {}ms)",
                        summary.entry,
                        outfile.display(),
                        summary.files,
                        output.len() as f64 / 1024.0,
                        duration_ms
                    );
                }
            } else if !json {
                print!("{output}");
                if !output.ends_with('\n') {
                    println!();
                }
            } else {
                summary.document = Some(output);
            }

            if json {
                println!("{}", serde_json::to_string(&summary).into_diagnostic()?);
            }
            Ok(())
        }
        Err(e) => {
            let info = e.info();
            if json {
                summary.error = Some(info.clone());
                println!("{}", serde_json::to_string(&summary).into_diagnostic()?);
            } else if let Some(frame) = &info.diagnostic {
                eprintln!("{frame}");
            }
            Err(miette!("{}: {}", info.code, info.message))
        }
    }
}
