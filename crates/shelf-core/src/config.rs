use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{DEFAULT_BASE_PREFIX, DEFAULT_COMPACT_PREFIX, Layout};
use crate::oracle::{DEFAULT_THRESHOLD, LlmConfig};

/// Project state directory, relative to the project root.
pub const SHELF_DIR: &str = ".shelf";

#[must_use]
pub fn config_path(project_root: &Path) -> PathBuf {
    project_root.join(SHELF_DIR).join("config.toml")
}

#[must_use]
pub fn locks_dir(project_root: &Path) -> PathBuf {
    project_root.join(SHELF_DIR).join("locks")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShelfConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory backing the bucket; relative paths resolve against the
    /// project root.
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
    #[serde(default = "default_base_prefix")]
    pub base_prefix: String,
    #[serde(default = "default_compact_prefix")]
    pub compact_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
            base_prefix: default_base_prefix(),
            compact_prefix: default_compact_prefix(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    #[default]
    Lexical,
    Llm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub kind: OracleKind,
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_oracle_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Prefer `SHELF_ORACLE_API_KEY` over writing the key here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            kind: OracleKind::default(),
            similarity_threshold: default_threshold(),
            endpoint: default_oracle_endpoint(),
            model: default_oracle_model(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Empty disables index sync.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub knowledge_base_id: String,
    #[serde(default)]
    pub data_source_id: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            knowledge_base_id: String::new(),
            data_source_id: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl IndexConfig {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.endpoint.trim().is_empty()
    }
}

impl ShelfConfig {
    #[must_use]
    pub fn layout(&self) -> Layout {
        Layout::new(&self.store.base_prefix, &self.store.compact_prefix)
    }

    #[must_use]
    pub fn store_root(&self, project_root: &Path) -> PathBuf {
        if self.store.root.is_absolute() {
            self.store.root.clone()
        } else {
            project_root.join(&self.store.root)
        }
    }

    #[must_use]
    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            endpoint: self.oracle.endpoint.clone(),
            model: self.oracle.model.clone(),
            api_key: self.oracle.api_key.clone().filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(self.oracle.timeout_secs),
            max_tokens: self.oracle.max_tokens,
        }
    }

    /// Apply `SHELF_*` overrides read through `lookup`. Unknown oracle kinds
    /// are an error rather than a silent fallback.
    ///
    /// # Errors
    ///
    /// Returns an error when `SHELF_ORACLE_KIND` is not `lexical` or `llm`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(root) = get("SHELF_STORE_ROOT") {
            self.store.root = PathBuf::from(root);
        }
        if let Some(base) = get("SHELF_BASE_PREFIX") {
            self.store.base_prefix = base;
        }
        if let Some(compact) = get("SHELF_COMPACT_PREFIX") {
            self.store.compact_prefix = compact;
        }
        if let Some(kind) = get("SHELF_ORACLE_KIND") {
            self.oracle.kind = match kind.trim().to_ascii_lowercase().as_str() {
                "lexical" => OracleKind::Lexical,
                "llm" => OracleKind::Llm,
                other => anyhow::bail!("SHELF_ORACLE_KIND must be lexical or llm, got '{other}'"),
            };
        }
        if let Some(endpoint) = get("SHELF_ORACLE_ENDPOINT") {
            self.oracle.endpoint = endpoint;
        }
        if let Some(model) = get("SHELF_ORACLE_MODEL") {
            self.oracle.model = model;
        }
        if let Some(key) = get("SHELF_ORACLE_API_KEY") {
            self.oracle.api_key = Some(key);
        }
        if let Some(endpoint) = get("SHELF_INDEX_ENDPOINT") {
            self.index.endpoint = endpoint;
        }
        Ok(())
    }

    /// Reject settings a run cannot work with.
    ///
    /// # Errors
    ///
    /// Returns an error when the corpus and compacted namespaces overlap,
    /// since merged output would then be read back and merged again.
    pub fn validate(&self) -> Result<()> {
        if self.layout().overlaps() {
            anyhow::bail!(
                "store.compact_prefix '{}' overlaps store.base_prefix '{}'",
                self.store.compact_prefix,
                self.store.base_prefix
            );
        }
        Ok(())
    }
}

/// Read `.shelf/config.toml` without environment overrides. A missing file
/// yields the defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ShelfConfig> {
    let path = config_path(project_root);
    if !path.exists() {
        return Ok(ShelfConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ShelfConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Project config with `SHELF_*` environment overrides applied.
///
/// # Errors
///
/// Returns an error if the file cannot be parsed, an override is invalid, or
/// the result fails [`ShelfConfig::validate`].
pub fn load_config(project_root: &Path) -> Result<ShelfConfig> {
    let mut config = load_project_config(project_root)?;
    config.apply_env_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

/// Default config rendered as TOML, as written by `shelf init`.
///
/// # Errors
///
/// Returns an error only if serialization fails.
pub fn default_config_toml() -> Result<String> {
    toml::to_string_pretty(&ShelfConfig::default()).context("Failed to render default config")
}

fn default_store_root() -> PathBuf {
    PathBuf::from("bucket")
}

fn default_base_prefix() -> String {
    DEFAULT_BASE_PREFIX.to_string()
}

fn default_compact_prefix() -> String {
    DEFAULT_COMPACT_PREFIX.to_string()
}

const fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_oracle_endpoint() -> String {
    LlmConfig::default().endpoint
}

fn default_oracle_model() -> String {
    LlmConfig::default().model
}

const fn default_timeout_secs() -> u64 {
    120
}

const fn default_max_tokens() -> u32 {
    8192
}
