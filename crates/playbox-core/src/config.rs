use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::Error;

/// Project configuration file name, looked up in the project root.
pub const CONFIG_FILE: &str = "playbox.json";

/// Environment variable overriding the remote module registry.
pub const REGISTRY_ENV: &str = "PLAYBOX_REGISTRY";

pub const DEFAULT_ENTRY: &str = "/main.ts";
pub const DEFAULT_REGISTRY: &str = "https://esm.sh/";
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_COMPONENT_EXTENSION: &str = "ripple";

/// Project configuration (`playbox.json`). Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayboxConfig {
    /// Workspace path of the entry module.
    pub entry: String,

    /// Workspace path of the HTML shell template. The built-in shell is used when unset.
    pub template: Option<String>,

    /// Delay between the last edit and the rebuild.
    pub debounce_ms: u64,

    /// Only expose exports that some importer uses.
    pub treeshake: bool,

    /// Base URL bare specifiers are resolved against.
    pub registry: String,

    pub component: ComponentConfig,

    pub server: ServerConfig,
}

/// Component-language settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentConfig {
    /// File extension of component sources, without the dot.
    pub extension: String,
    pub compiler: CompilerConfig,
}

/// Which component compiler backend to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CompilerConfig {
    /// Built-in single-file-component splitter.
    #[default]
    Builtin,
    /// Bundled helper script driving the `ripple/compiler` package with Node.js.
    Ripple {
        #[serde(default = "default_node")]
        node: String,
    },
    /// Any command speaking the line-delimited JSON compiler protocol.
    Process {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

fn default_node() -> String {
    "node".to_string()
}

/// Dev server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5180,
        }
    }
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            extension: DEFAULT_COMPONENT_EXTENSION.to_string(),
            compiler: CompilerConfig::default(),
        }
    }
}

impl Default for PlayboxConfig {
    fn default() -> Self {
        Self {
            entry: DEFAULT_ENTRY.to_string(),
            template: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            treeshake: false,
            registry: DEFAULT_REGISTRY.to_string(),
            component: ComponentConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl PlayboxConfig {
    /// Load `playbox.json` from a project directory, falling back to defaults when absent.
    ///
    /// The registry environment override is applied and the result validated.
    pub fn load(project_dir: &Path) -> Result<Self, Error> {
        if !project_dir.is_dir() {
            return Err(Error::ProjectNotFound(project_dir.to_path_buf()));
        }
        let path = project_dir.join(CONFIG_FILE);
        let config = if path.is_file() {
            let text = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
                path: path.clone(),
                source,
            })?;
            Self::from_json(&text).map_err(|source| Error::ConfigParse { path, source })?
        } else {
            Self::default()
        };

        let config = config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration document.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Apply environment overrides.
    #[must_use]
    pub fn apply_env(mut self) -> Self {
        if let Ok(registry) = std::env::var(REGISTRY_ENV) {
            if !registry.trim().is_empty() {
                self.registry = registry.trim().to_string();
            }
        }
        self
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), Error> {
        if self.entry.trim().is_empty() {
            return Err(Error::ConfigInvalid {
                field: "entry",
                message: "must not be empty".to_string(),
            });
        }
        let ext = &self.component.extension;
        if ext.is_empty() || ext.contains(['.', '/', '?']) {
            return Err(Error::ConfigInvalid {
                field: "component.extension",
                message: format!("`{ext}` must be a bare extension such as `ripple`"),
            });
        }
        self.registry_url().map(|_| ())
    }

    /// The registry as a URL with a trailing slash, so joins append to its path.
    pub fn registry_url(&self) -> Result<Url, Error> {
        let mut raw = self.registry.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).map_err(|e| Error::ConfigInvalid {
            field: "registry",
            message: format!("`{}`: {e}", self.registry),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::ConfigInvalid {
                field: "registry",
                message: format!("`{}` is not an http(s) URL", self.registry),
            });
        }
        Ok(url)
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    #[must_use]
    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    #[must_use]
    pub fn with_treeshake(mut self, treeshake: bool) -> Self {
        self.treeshake = treeshake;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = registry.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = PlayboxConfig::default();
        assert_eq!(config.entry, "/main.ts");
        assert_eq!(config.debounce(), Duration::from_millis(300));
        assert!(!config.treeshake);
        assert_eq!(config.component.extension, "ripple");
        assert_eq!(config.component.compiler, CompilerConfig::Builtin);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PlayboxConfig::from_json(
            r#"{"entry": "/src/app.ts", "component": {"compiler": {"kind": "process", "program": "ripplec"}}}"#,
        )
        .unwrap();
        assert_eq!(config.entry, "/src/app.ts");
        assert_eq!(config.debounce_ms, 300);
        assert_eq!(config.component.extension, "ripple");
        assert_eq!(
            config.component.compiler,
            CompilerConfig::Process {
                program: "ripplec".to_string(),
                args: vec![]
            }
        );
    }

    #[test]
    fn test_ripple_compiler_defaults_to_node() {
        let config =
            PlayboxConfig::from_json(r#"{"component": {"compiler": {"kind": "ripple"}}}"#).unwrap();
        assert_eq!(
            config.component.compiler,
            CompilerConfig::Ripple {
                node: "node".to_string()
            }
        );
    }

    #[test]
    fn test_registry_url_gets_trailing_slash() {
        let config = PlayboxConfig::default().with_registry("https://cdn.example.com/npm");
        assert_eq!(
            config.registry_url().unwrap().as_str(),
            "https://cdn.example.com/npm/"
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(PlayboxConfig::default().with_registry("ftp://x").validate().is_err());
        assert!(PlayboxConfig::default().with_entry(" ").validate().is_err());

        let mut config = PlayboxConfig::default();
        config.component.extension = ".ripple".to_string();
        assert!(matches!(
            config.validate(),
            Err(Error::ConfigInvalid {
                field: "component.extension",
                ..
            })
        ));
    }

    #[test]
    #[serial]
    fn test_load_reads_file_and_env_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"treeshake": true, "debounce_ms": 50}"#,
        )
        .unwrap();

        std::env::set_var(REGISTRY_ENV, "http://127.0.0.1:9999/");
        let config = PlayboxConfig::load(dir.path());
        std::env::remove_var(REGISTRY_ENV);

        let config = config.unwrap();
        assert!(config.treeshake);
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.registry, "http://127.0.0.1:9999/");
    }

    #[test]
    #[serial]
    fn test_load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlayboxConfig::load(dir.path()).unwrap();
        assert_eq!(config, PlayboxConfig::default());
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ nope").unwrap();
        assert!(matches!(
            PlayboxConfig::load(dir.path()),
            Err(Error::ConfigParse { .. })
        ));
    }
}
