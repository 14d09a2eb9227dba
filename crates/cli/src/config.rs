//! Configuration from graphbees.toml overlaid with environment variables.

use std::path::{Path, PathBuf};

use bridge::RuntimeSettings;
use serde::Deserialize;

/// Name of the optional config file looked up in the working directory.
pub const CONFIG_FILE: &str = "graphbees.toml";

/// Platforms where stopping the process would take down a shared service.
const MANAGED_PLATFORM_VARS: [&str; 4] = [
    "RENDER",
    "RENDER_SERVICE_ID",
    "STREAMLIT_SHARING_MODE",
    "STREAMLIT_CLOUD",
];

/// Contents of graphbees.toml. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub llm: LlmSection,
    pub runtime: RuntimeSection,
    /// Model calls allowed per run.
    pub max_turns: Option<usize>,
    /// Journal database location. Defaults to the user data directory.
    pub journal: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSection {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSection {
    /// Base directory for the isolated Julia environment.
    pub dir: Option<PathBuf>,
    /// Julia executable.
    pub julia: Option<PathBuf>,
    /// Value for Julia's `--threads` flag.
    pub threads: Option<String>,
    /// Bundled project directory to start from.
    pub project: Option<PathBuf>,
    pub allow_shutdown: Option<bool>,
}

impl FileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Settings for the model provider. Only commands that talk to a model
/// need these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: Option<u32>,
}

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    pub julia: PathBuf,
    pub runtime: RuntimeSettings,
    pub max_turns: Option<usize>,
    pub journal: Option<PathBuf>,
    pub allow_shutdown: bool,
}

impl Config {
    /// Overlay the environment (read through `env`) on a parsed file.
    /// Empty variables count as unset.
    pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let allow_shutdown = match var("GRAPHBEES_ALLOW_SHUTDOWN").and_then(|v| parse_flag(&v)) {
            Some(flag) => flag,
            None => file
                .runtime
                .allow_shutdown
                .unwrap_or_else(|| !MANAGED_PLATFORM_VARS.iter().any(|key| var(key).is_some())),
        };

        Self {
            api_key: var("LLM_API").or(file.llm.api_key),
            base_url: var("LLM_URL").or(file.llm.base_url),
            model: var("MODEL").or(file.llm.model),
            max_tokens: file.llm.max_tokens,
            julia: var("JULIA_EXE")
                .map(PathBuf::from)
                .or(file.runtime.julia)
                .unwrap_or_else(|| PathBuf::from(bridge::DEFAULT_EXECUTABLE)),
            runtime: RuntimeSettings {
                runtime_dir: var("GRAPHBEES_RUNTIME_DIR")
                    .map(PathBuf::from)
                    .or(file.runtime.dir),
                source_project: file.runtime.project,
                threads: file.runtime.threads.unwrap_or_default(),
            },
            max_turns: file.max_turns,
            journal: file.journal,
            allow_shutdown,
        }
    }

    /// Load `path` (or graphbees.toml when present) and overlay the process
    /// environment.
    pub fn from_env(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => FileConfig::load(path)?,
            None if Path::new(CONFIG_FILE).exists() => FileConfig::load(CONFIG_FILE)?,
            None => FileConfig::default(),
        };
        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    /// Provider settings, failing on the first one that is missing.
    pub fn llm(&self) -> Result<LlmConfig, ConfigError> {
        let required = |value: &Option<String>, name: &'static str| {
            value.clone().ok_or(ConfigError::Missing(name))
        };
        Ok(LlmConfig {
            api_key: required(&self.api_key, "LLM_API")?,
            base_url: required(&self.base_url, "LLM_URL")?,
            model: required(&self.model, "MODEL")?,
            max_tokens: self.max_tokens,
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn environment_supplies_provider_settings() {
        let config = Config::resolve(
            FileConfig::default(),
            env(&[
                ("LLM_API", "sk-test"),
                ("LLM_URL", "https://api.deepseek.com"),
                ("MODEL", "deepseek-chat"),
            ]),
        );
        let llm = config.llm().unwrap();
        assert_eq!(llm.api_key, "sk-test");
        assert_eq!(llm.base_url, "https://api.deepseek.com");
        assert_eq!(llm.model, "deepseek-chat");
        assert_eq!(config.julia, PathBuf::from("julia"));
    }

    #[test]
    fn missing_settings_are_named_in_order() {
        let config = Config::resolve(FileConfig::default(), env(&[("LLM_URL", "https://x")]));
        assert_eq!(config.llm().unwrap_err().to_string(), "LLM_API must be set");

        let config = Config::resolve(
            FileConfig::default(),
            env(&[("LLM_API", "k"), ("LLM_URL", "https://x"), ("MODEL", "  ")]),
        );
        assert!(matches!(config.llm(), Err(ConfigError::Missing("MODEL"))));
    }

    #[test]
    fn environment_overrides_file() {
        let file = FileConfig::parse(
            r#"
            max_turns = 8

            [llm]
            api_key = "from-file"
            base_url = "https://file.example"
            model = "file-model"

            [runtime]
            dir = "/var/lib/graphbees"
            julia = "/opt/julia/bin/julia"
            threads = "4"
            "#,
        )
        .unwrap();
        let config = Config::resolve(
            file,
            env(&[("MODEL", "env-model"), ("GRAPHBEES_RUNTIME_DIR", "/tmp/rt")]),
        );

        let llm = config.llm().unwrap();
        assert_eq!(llm.api_key, "from-file");
        assert_eq!(llm.model, "env-model");
        assert_eq!(config.runtime.runtime_dir, Some(PathBuf::from("/tmp/rt")));
        assert_eq!(config.runtime.threads, "4");
        assert_eq!(config.julia, PathBuf::from("/opt/julia/bin/julia"));
        assert_eq!(config.max_turns, Some(8));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            FileConfig::parse("[llm]\nkey = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn shutdown_flag_words() {
        for word in ["1", "true", "YES", " on "] {
            let config = Config::resolve(
                FileConfig::default(),
                env(&[("GRAPHBEES_ALLOW_SHUTDOWN", word), ("RENDER", "true")]),
            );
            assert!(config.allow_shutdown, "{word}");
        }
        for word in ["0", "false", "No", "off"] {
            let config = Config::resolve(
                FileConfig::default(),
                env(&[("GRAPHBEES_ALLOW_SHUTDOWN", word)]),
            );
            assert!(!config.allow_shutdown, "{word}");
        }
    }

    #[test]
    fn shutdown_disabled_on_managed_platforms() {
        assert!(Config::resolve(FileConfig::default(), env(&[])).allow_shutdown);
        for key in MANAGED_PLATFORM_VARS {
            let config = Config::resolve(FileConfig::default(), env(&[(key, "1")]));
            assert!(!config.allow_shutdown, "{key}");
        }
        let config = Config::resolve(
            FileConfig::default(),
            env(&[("GRAPHBEES_ALLOW_SHUTDOWN", "maybe"), ("STREAMLIT_CLOUD", "1")]),
        );
        assert!(!config.allow_shutdown);
    }
}
