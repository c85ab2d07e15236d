use std::collections::HashSet;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::providers::{Credentials, EndpointKind, Endpoints, ProviderTarget};

const HISTORY_FILE_NAME: &str = "prompt_history.json";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    history_file: Option<PathBuf>,
    history_limit: Option<usize>,
    timeout: Option<u64>,
    endpoints: Option<Endpoints>,
    targets: Option<Vec<TargetEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TargetEntry {
    id: String,
    name: Option<String>,
    kind: String,
    model: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Everything the aggregator and host surfaces need, resolved once.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub path: PathBuf,
    pub history_file: PathBuf,
    pub history_limit: usize,
    pub timeout: Option<Duration>,
    pub endpoints: Endpoints,
    pub targets: Vec<ProviderTarget>,
    pub credentials: Credentials,
}

impl AppConfig {
    /// Loads the config file (defaults when absent), env overrides and
    /// credentials from the environment.
    pub fn load() -> Result<Self, String> {
        let path = config_path()?;
        let file = read_config_file(&path)?;
        let mut config = Self::from_file(path, file)?;
        config.apply_env_overrides()?;
        config.credentials = Credentials::from_env();
        Ok(config)
    }

    /// Parses TOML text as if it were read from `path`. Credentials stay empty.
    pub fn from_toml(path: impl Into<PathBuf>, raw: &str) -> Result<Self, String> {
        let path = path.into();
        let file = parse_config(&path, raw)?;
        Self::from_file(path, file)
    }

    fn from_file(path: PathBuf, file: ConfigFile) -> Result<Self, String> {
        let history_file = file
            .history_file
            .unwrap_or_else(|| default_history_file(&path));
        let history_limit = file.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if history_limit == 0 {
            return Err(format!(
                "Invalid history_limit 0 in config file '{}'. Use a value of at least 1.",
                path.display()
            ));
        }

        let targets = match file.targets {
            Some(entries) => entries
                .into_iter()
                .map(|entry| entry.into_target(&path))
                .collect::<Result<Vec<_>, _>>()?,
            None => default_targets(),
        };
        validate_targets(&path, &targets)?;

        Ok(Self {
            path,
            history_file,
            history_limit,
            timeout: file.timeout.map(Duration::from_secs),
            endpoints: file.endpoints.unwrap_or_default(),
            targets,
            credentials: Credentials::default(),
        })
    }

    fn apply_env_overrides(&mut self) -> Result<(), String> {
        if let Some(value) = env_value("MC_HISTORY_FILE") {
            self.history_file = PathBuf::from(value);
        }
        if let Some(value) = env_value("MC_TIMEOUT") {
            let secs = value
                .parse::<u64>()
                .map_err(|_| format!("Invalid MC_TIMEOUT '{value}'. Use a whole number of seconds."))?;
            self.timeout = Some(Duration::from_secs(secs));
        }
        Ok(())
    }

    pub fn target(&self, id: &str) -> Option<&ProviderTarget> {
        self.targets.iter().find(|target| target.id == id)
    }

    /// Targets with `enabled` set from an explicit selection.
    ///
    /// `ids` non-empty enables exactly those ids; `all` enables everything;
    /// otherwise the configured flags stand.
    pub fn select_targets(&self, ids: &[String], all: bool) -> Result<Vec<ProviderTarget>, String> {
        if let Some(unknown) = ids.iter().find(|id| self.target(id).is_none()) {
            return Err(format!(
                "Unknown target '{unknown}'. Configured targets: {}.",
                self.target_ids().join(", ")
            ));
        }
        Ok(self
            .targets
            .iter()
            .map(|target| {
                let enabled = if all {
                    true
                } else if ids.is_empty() {
                    target.enabled
                } else {
                    ids.contains(&target.id)
                };
                target.clone().enabled(enabled)
            })
            .collect())
    }

    fn target_ids(&self) -> Vec<&str> {
        self.targets.iter().map(|target| target.id.as_str()).collect()
    }
}

impl TargetEntry {
    fn into_target(self, path: &Path) -> Result<ProviderTarget, String> {
        let kind = self.kind.parse::<EndpointKind>().map_err(|err| {
            format!(
                "Invalid target '{}' in config file '{}': {err}",
                self.id,
                path.display()
            )
        })?;
        let name = self.name.unwrap_or_else(|| self.id.clone());
        Ok(ProviderTarget::new(self.id, name, kind, self.model).enabled(self.enabled))
    }
}

fn validate_targets(path: &Path, targets: &[ProviderTarget]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for target in targets {
        if target.id.trim().is_empty() {
            return Err(format!(
                "Config file '{}' contains a target with an empty id.",
                path.display()
            ));
        }
        if target.model.trim().is_empty() {
            return Err(format!(
                "Target '{}' in config file '{}' has an empty model.",
                target.id,
                path.display()
            ));
        }
        if !seen.insert(target.id.as_str()) {
            return Err(format!(
                "Duplicate target id '{}' in config file '{}'.",
                target.id,
                path.display()
            ));
        }
    }
    Ok(())
}

pub fn default_targets() -> Vec<ProviderTarget> {
    vec![
        ProviderTarget::new(
            "ollama",
            "DeepSeek R1 (Ollama)",
            EndpointKind::Local,
            "deepseek-r1:latest",
        ),
        ProviderTarget::new(
            "anthropic",
            "Claude Sonnet 4.5",
            EndpointKind::Anthropic,
            "claude-sonnet-4-5-20250929",
        )
        .enabled(false),
        ProviderTarget::new("openai", "GPT-5", EndpointKind::Openai, "gpt-5").enabled(false),
        ProviderTarget::new(
            "google",
            "Gemini 2.0 Flash Exp",
            EndpointKind::Google,
            "gemini-2.0-flash-exp",
        ),
    ]
}

/// Parses and validates the config file, which must exist.
pub fn validate_config() -> Result<PathBuf, String> {
    let path = config_path()?;
    let raw = fs::read_to_string(&path)
        .map_err(|err| format!("Failed to read config file '{}': {err}", path.display()))?;
    AppConfig::from_toml(path.clone(), &raw)?;
    Ok(path)
}

fn read_config_file(path: &Path) -> Result<ConfigFile, String> {
    match fs::read_to_string(path) {
        Ok(raw) => parse_config(path, &raw),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            Ok(ConfigFile::default())
        }
        Err(err) => Err(format!(
            "Failed to read config file '{}': {err}",
            path.display()
        )),
    }
}

fn parse_config(path: &Path, raw: &str) -> Result<ConfigFile, String> {
    toml::from_str(raw)
        .map_err(|err| format!("Failed to parse config file '{}': {err}", path.display()))
}

fn default_history_file(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(HISTORY_FILE_NAME),
        _ => PathBuf::from(HISTORY_FILE_NAME),
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn config_path() -> Result<PathBuf, String> {
    if let Some(path) = env_value("MC_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    if let Some(xdg) = env_value("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("mcompare").join("config.toml"));
    }

    let home = env::var("HOME").map_err(|_| {
        "Cannot resolve config path: set MC_CONFIG or HOME/XDG_CONFIG_HOME.".to_string()
    })?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("mcompare")
        .join("config.toml"))
}
