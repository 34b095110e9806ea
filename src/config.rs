//! Layered configuration.
//!
//! Sources, later ones winning:
//! - Default values
//! - `.quarry/settings.toml` (searched upward from the current directory)
//! - Environment variables
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `QUARRY_` and use double
//! underscores to separate nested levels:
//! - `QUARRY_SEMANTIC__MODEL=BGESmallENV15` sets `semantic.model`
//! - `QUARRY_VECTOR__PROBES=8` sets `vector.probes`
//! - `QUARRY_INDEXING__MAX_FILE_SIZE=65536` sets `indexing.max_file_size`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::indexing::DEFAULT_MAX_FILE_SIZE;
use crate::semantic::DEFAULT_MODEL;
use crate::vector::{DEFAULT_MIN_TRAIN_SIZE, DEFAULT_PROBES, IndexConfig, IndexVariant, IvfParams};

/// Directory holding settings, and by default the index.
pub const CONFIG_DIR: &str = ".quarry";

/// Settings file name inside [`CONFIG_DIR`].
pub const SETTINGS_FILE: &str = "settings.toml";

const ENV_PREFIX: &str = "QUARRY_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding `vectors.idx` and `vectors.meta.json`
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Root of the persistent embedding cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Workspace root directory (where .quarry is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub semantic: SemanticConfig,

    #[serde(default)]
    pub vector: VectorConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SemanticConfig {
    /// Embedding model name (see `quarry config` for the active value)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Texts sent to the model per call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Where model files are downloaded; fastembed's default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models_dir: Option<PathBuf>,

    /// Show a progress bar while downloading a model
    #[serde(default = "default_true")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VectorConfig {
    /// `flat` or `ivf-flat`
    #[serde(default)]
    pub variant: IndexVariant,

    /// IVF list count; 0 picks about sqrt(n)
    #[serde(default)]
    pub clusters: usize,

    /// IVF lists scanned per query
    #[serde(default = "default_probes")]
    pub probes: usize,

    /// Builds smaller than this use a single IVF list
    #[serde(default = "default_min_train_size")]
    pub min_train_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Patterns to ignore during indexing (gitignore syntax)
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Files larger than this many bytes are skipped
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Index dotfiles and dot-directories
    #[serde(default = "default_false")]
    pub include_hidden: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for every target
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `cache = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("index")
}
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("quarry").join("embeddings"))
        .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("cache"))
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_embedding_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_probes() -> usize {
    DEFAULT_PROBES
}
fn default_min_train_size() -> usize {
    DEFAULT_MIN_TRAIN_SIZE
}
fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            cache_dir: default_cache_dir(),
            workspace_root: None,
            semantic: SemanticConfig::default(),
            vector: VectorConfig::default(),
            indexing: IndexingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            models_dir: None,
            show_download_progress: true,
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            variant: IndexVariant::default(),
            clusters: 0,
            probes: default_probes(),
            min_train_size: default_min_train_size(),
        }
    }
}

impl VectorConfig {
    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            variant: self.variant,
            ivf: IvfParams {
                clusters: self.clusters,
                probes: self.probes,
                min_train_size: self.min_train_size,
            },
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: vec!["*.generated.*".to_string()],
            max_file_size: default_max_file_size(),
            include_hidden: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

/// `QUARRY_A__B` -> `a.b`
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| key.as_str().to_lowercase().replace("__", ".").into())
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE));

        Self::load_from(config_path).map(|mut settings| {
            if settings.workspace_root.is_none() {
                settings.workspace_root = Self::workspace_root();
            }
            settings
        })
    }

    /// Load configuration from a specific file (plus environment overrides)
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(env_provider())
            .extract()
            .map_err(Box::new)
    }

    /// Find `.quarry/settings.toml` from the current directory upwards
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(SETTINGS_FILE))
    }

    /// The nearest ancestor of the current directory containing `.quarry`
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Resolve a configured path against the workspace root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create `.quarry/settings.toml` and a starter `.quarryignore` in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Self::create_default_ignore_file(force)?;

        Ok(config_path)
    }

    fn create_default_ignore_file(force: bool) -> Result<(), Box<dyn std::error::Error>> {
        let ignore_path = PathBuf::from(crate::indexing::IGNORE_FILE);

        if !force && ignore_path.exists() {
            return Ok(());
        }

        let default_content = r#"# quarry ignore patterns (gitignore syntax)
# https://git-scm.com/docs/gitignore
#
# Files matching these patterns are never chunked or embedded.
# Build, dependency and VCS directories are always skipped.

# Test fixtures (uncomment to keep them out of search results)
# tests/fixtures/
# testdata/

# Generated code
*_pb2.py
*.pb.go
*.generated.*

# Vendored sources
vendor/
third_party/
"#;

        std::fs::write(&ignore_path, default_content)?;
        Ok(())
    }
}
