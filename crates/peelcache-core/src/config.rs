//! Worker configuration management.
//!
//! Holds the cache generation name, the worker scope, the precache manifest
//! and the lifecycle switches. Defaults describe the Peel app shell; a JSON
//! file at `~/.config/peelcache/config.json` may override any field.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "peelcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Current cache generation. Bump to discard every previously cached asset.
pub const DEFAULT_CACHE_NAME: &str = "peel-feed-react-v3";

const DEFAULT_SCOPE: &str = "http://localhost:8080/";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_PRECACHE: &[&str] = &[
    "./",
    "index.html",
    "styles.css",
    "dist/app.js",
    "manifest.json",
    "demo-data.json",
    "assets/banana.svg",
    "assets/logo-n.svg",
    "assets/corn-texture.png",
];

pub const ENV_SCOPE: &str = "PEELCACHE_SCOPE";
pub const ENV_CACHE_NAME: &str = "PEELCACHE_CACHE_NAME";
pub const ENV_CACHE_DIR: &str = "PEELCACHE_CACHE_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub cache_name: String,
    /// Base URL the worker controls; manifest entries resolve against it
    pub scope: String,
    pub precache: Vec<String>,
    pub mock_data_file: String,
    pub shell_document: String,
    pub skip_waiting: bool,
    pub claim_clients: bool,
    pub request_timeout_secs: u64,
    pub cache_dir: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            precache: DEFAULT_PRECACHE.iter().map(|s| s.to_string()).collect(),
            mock_data_file: "demo-data.json".to_string(),
            shell_document: "index.html".to_string(),
            skip_waiting: true,
            claim_clients: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            cache_dir: None,
        }
    }
}

impl WorkerConfig {
    /// Load from the user config file (if any), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Ok(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `PEELCACHE_*` overrides from the given lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(scope) = lookup(ENV_SCOPE) {
            self.scope = scope;
        }
        if let Some(name) = lookup(ENV_CACHE_NAME) {
            self.cache_name = name;
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Root directory of the on-disk stores.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Scope as a directory URL (always ends with `/`).
    pub fn scope_url(&self) -> Result<Url, WorkerError> {
        let mut scope = self.scope.clone();
        if !scope.ends_with('/') {
            scope.push('/');
        }
        Url::parse(&scope).map_err(|e| WorkerError::InvalidScope(format!("{}: {}", self.scope, e)))
    }

    /// Resolve a scope-relative URL.
    pub fn resolve(&self, relative: &str) -> Result<Url, WorkerError> {
        self.scope_url()?
            .join(relative)
            .map_err(|e| WorkerError::InvalidScope(format!("{}: {}", relative, e)))
    }

    pub fn manifest_urls(&self) -> Result<Vec<Url>, WorkerError> {
        self.precache.iter().map(|u| self.resolve(u)).collect()
    }

    pub fn shell_url(&self) -> Result<Url, WorkerError> {
        self.resolve(&self.shell_document)
    }

    /// Whether a URL path names the mock-data file.
    pub fn is_mock_data_path(&self, path: &str) -> bool {
        path.strip_suffix(self.mock_data_file.as_str())
            .is_some_and(|prefix| prefix.ends_with('/'))
    }
}
