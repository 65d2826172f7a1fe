use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::cli::Cli;
use crate::error::AppError;
use crate::models::{AuthType, ConfiguredRegistry, RegistryMap};
use crate::registry::{RegistryKind, RetryPolicy};

pub const DEFAULT_COLUMNS: [&str; 5] = ["status", "container", "repository", "tag", "update"];

/// Contents of `config.yaml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConfig {
    pub debug: Option<bool>,
    pub no_progress: Option<bool>,
    pub include_stopped: Option<bool>,
    pub columns: Option<Vec<String>>,
    pub containers: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub timeout_seconds: Option<u64>,
    pub deadline_seconds: Option<u64>,
    pub max_pages: Option<usize>,
    pub retries: Option<u32>,
    pub registries: BTreeMap<String, RegistryEntry>,
    /// File this config was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryEntry {
    pub domain: String,
    pub auth: Option<String>,
    pub token: Option<String>,
    pub url: Option<String>,
}

impl FileConfig {
    /// Load the config from `path`, or from the default location when `None`.
    /// Only an explicitly named file has to exist.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => return Err(AppError::Io { path, source }),
        };

        let mut config = Self::parse(&data, &path)?;
        config.source = Some(path);
        Ok(config)
    }

    pub fn parse(data: &str, path: &Path) -> Result<Self, AppError> {
        // An empty file deserializes to unit, not a mapping
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(data).map_err(|source| AppError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Bind every configured registry to its strategy, keyed by domain.
    pub fn registry_map(&self) -> RegistryMap {
        let mut map = RegistryMap::new();
        for (name, entry) in &self.registries {
            let registry = ConfiguredRegistry {
                domain: entry.domain.clone(),
                name: name.clone(),
                auth_type: AuthType::from_config(entry.auth.as_deref()),
                auth_token: entry.token.clone().unwrap_or_default(),
                kind: RegistryKind::resolve(&entry.domain, entry.url.as_deref()),
            };
            debug!(
                "Registry '{}' ({}) at {} auth={}",
                name,
                registry.domain,
                registry.kind.base_url(),
                registry.auth_type.scheme()
            );
            if let Some(previous) = map.insert(entry.domain.clone(), registry) {
                warn!(
                    "Registry '{}' overrides '{}' for domain {}",
                    name, previous.name, entry.domain
                );
            }
        }
        map
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("contrack").join("config.yaml"))
}

/// Effective run settings: CLI flags over config file over defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub debug: bool,
    pub no_progress: bool,
    pub include_stopped: bool,
    pub columns: Vec<String>,
    pub containers: Option<PathBuf>,
    pub concurrency: usize,
    pub timeout: Duration,
    pub deadline: Duration,
    pub max_pages: usize,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_sources(cli: &Cli, file: &FileConfig) -> Self {
        let retry = RetryPolicy {
            max_attempts: file.retries.unwrap_or(3).max(1),
            ..RetryPolicy::default()
        };

        Self {
            debug: cli.debug || file.debug.unwrap_or(false),
            no_progress: cli.no_progress || file.no_progress.unwrap_or(false),
            include_stopped: cli.include_stopped || file.include_stopped.unwrap_or(false),
            columns: cli
                .columns
                .clone()
                .or_else(|| file.columns.clone())
                .unwrap_or_else(|| DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect()),
            containers: cli.containers.clone().or_else(|| file.containers.clone()),
            concurrency: cli.concurrency.or(file.concurrency).unwrap_or(4).max(1),
            timeout: Duration::from_secs(file.timeout_seconds.unwrap_or(30)),
            deadline: Duration::from_secs(file.deadline_seconds.unwrap_or(300)),
            max_pages: file.max_pages.unwrap_or(100).max(1),
            retry,
        }
    }
}
