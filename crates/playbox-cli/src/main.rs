#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::cast_precision_loss)]

mod commands;
mod logging;
mod project;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

use project::Overrides;

#[derive(Parser, Debug)]
#[command(name = "playbox")]
#[command(author, version, about = "Bundle a project into a live preview page", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Build a project once and print the preview document
    Bundle {
        /// Project directory (defaults to the working directory)
        dir: Option<PathBuf>,

        /// Entry module or HTML page, as a workspace path (e.g. /src/main.ts)
        #[arg(long)]
        entry: Option<String>,

        /// HTML template, as a workspace path
        #[arg(long)]
        template: Option<String>,

        /// Write the document to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Only expose exports that some importer uses
        #[arg(long)]
        treeshake: bool,

        /// Print the document as a base64 data URI
        #[arg(long)]
        data_uri: bool,
    },

    /// Serve a live preview that rebuilds on every edit
    Dev {
        /// Project directory (defaults to the working directory)
        dir: Option<PathBuf>,

        /// Entry module or HTML page, as a workspace path
        #[arg(long)]
        entry: Option<String>,

        /// HTML template, as a workspace path
        #[arg(long)]
        template: Option<String>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Delay between the last edit and the rebuild, in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Only expose exports that some importer uses
        #[arg(long)]
        treeshake: bool,
    },
}

fn project_dir(cwd: &Path, dir: Option<PathBuf>) -> PathBuf {
    match dir {
        Some(dir) if dir.is_absolute() => dir,
        Some(dir) => cwd.join(dir),
        None => cwd.to_path_buf(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Commands::Version => commands::version::run(cli.json),
        Commands::Bundle {
            dir,
            entry,
            template,
            out,
            treeshake,
            data_uri,
        } => {
            logging::init(cli.verbose, cli.json);
            let action = commands::bundle::BundleAction {
                dir: project_dir(&cwd, dir),
                overrides: Overrides {
                    entry,
                    template,
                    treeshake,
                    ..Overrides::default()
                },
                outfile: out.map(|p| if p.is_absolute() { p } else { cwd.join(p) }),
                data_uri,
            };
            let rt = tokio::runtime::Runtime::new().into_diagnostic()?;
            rt.block_on(commands::bundle::run(action, cli.json))
        }
        Commands::Dev {
            dir,
            entry,
            template,
            host,
            port,
            debounce_ms,
            treeshake,
        } => {
            logging::init(cli.verbose, cli.json);
            let action = commands::dev::DevAction {
                dir: project_dir(&cwd, dir),
                overrides: Overrides {
                    entry,
                    template,
                    treeshake,
                    debounce_ms,
                    host,
                    port,
                },
            };
            let rt = tokio::runtime::Runtime::new().into_diagnostic()?;
            rt.block_on(commands::dev::run(action))
        }
    }
}
