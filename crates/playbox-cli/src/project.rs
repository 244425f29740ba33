//! Project directory → configuration and workspace.

use miette::{IntoDiagnostic, Result};
use playbox_core::vfs::{BuildSnapshot, Vfs};
use playbox_core::PlayboxConfig;
use playbox_util::fs::collect_project_files;
use std::path::Path;
use tracing::debug;

/// Command-line values that take precedence over `playbox.json`.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub entry: Option<String>,
    pub template: Option<String>,
    pub treeshake: bool,
    pub debounce_ms: Option<u64>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Overrides {
    fn apply(&self, mut config: PlayboxConfig) -> PlayboxConfig {
        if let Some(entry) = &self.entry {
            config = config.with_entry(entry.as_str());
        }
        if let Some(template) = &self.template {
            config = config.with_template(template.as_str());
        }
        if self.treeshake {
            config = config.with_treeshake(true);
        }
        if let Some(ms) = self.debounce_ms {
            config = config.with_debounce_ms(ms);
        }
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        config
    }
}

/// Load `playbox.json` from `dir` and apply the command-line overrides.
pub fn load_config(dir: &Path, overrides: &Overrides) -> Result<PlayboxConfig> {
    let config = overrides.apply(PlayboxConfig::load(dir).into_diagnostic()?);
    config.validate().into_diagnostic()?;
    Ok(config)
}

/// Snapshot every project file on disk.
pub fn snapshot(dir: &Path) -> Result<BuildSnapshot> {
    let mut snapshot = BuildSnapshot::new();
    for file in collect_project_files(dir).into_diagnostic()? {
        snapshot.insert(file.path, file.bytes);
    }
    debug!(dir = %dir.display(), files = snapshot.len(), "Collected project files");
    Ok(snapshot)
}

/// A live workspace mirroring the project directory.
pub fn mirror(dir: &Path) -> Result<Vfs> {
    Ok(Vfs::from_snapshot(&snapshot(dir)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_overrides_win_over_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("playbox.json"),
            r#"{"entry": "/app.ts", "debounce_ms": 100, "server": {"port": 4000}}"#,
        )
        .unwrap();

        let config = load_config(dir.path(), &Overrides::default()).unwrap();
        assert_eq!(config.entry, "/app.ts");
        assert_eq!(config.debounce_ms, 100);
        assert_eq!(config.server.port, 4000);

        let overrides = Overrides {
            entry: Some("/src/main.ts".into()),
            port: Some(9000),
            treeshake: true,
            ..Overrides::default()
        };
        let config = load_config(dir.path(), &overrides).unwrap();
        assert_eq!(config.entry, "/src/main.ts");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.debounce_ms, 100);
        assert!(config.treeshake);
    }

    #[test]
    fn test_missing_project_dir_fails() {
        let dir = tempdir().unwrap();
        assert!(load_config(&dir.path().join("nope"), &Overrides::default()).is_err());
    }

    #[test]
    fn test_mirror_skips_ignored_dirs() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/x")).unwrap();
        std::fs::write(dir.path().join("src/main.ts"), "1").unwrap();
        std::fs::write(dir.path().join("node_modules/x/index.js"), "2").unwrap();

        let fs = mirror(dir.path()).unwrap();
        assert_eq!(fs.read_text("/src/main.ts").unwrap(), "1");
        assert!(!fs.exists("/node_modules/x/index.js"));
    }
}
