use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cireval: CirevalConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub eval: EvalConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// General settings
#[derive(Debug, Clone, Deserialize)]
pub struct CirevalConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CirevalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Model server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    /// Base URL of the model server (index / fuse / status endpoints live below it)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Name of the environment variable holding an optional bearer token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Maximum number of images or queries sent per request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Dimension of the normalized/pooled embeddings (256 for BLIP)
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            dimensions: default_dimensions(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Evaluation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EvalConfig {
    /// Queries per fusion request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Image loading workers feeding the index extraction queue
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Threads used to rank the query set (1 = sequential)
    #[serde(default = "default_rank_threads")]
    pub rank_threads: usize,
    /// Reject index features whose normalized vectors are not unit length
    #[serde(default = "default_verify_unit_norm")]
    pub verify_unit_norm: bool,
    #[serde(default = "default_unit_norm_tolerance")]
    pub unit_norm_tolerance: f32,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            num_workers: default_num_workers(),
            queue_capacity: default_queue_capacity(),
            rank_threads: default_rank_threads(),
            verify_unit_norm: default_verify_unit_norm(),
            unit_norm_tolerance: default_unit_norm_tolerance(),
        }
    }
}

/// Feature store configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Optional sqlite file caching extracted index features between runs
    #[serde(default)]
    pub features_db: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_api_key_env() -> String {
    "CIREVAL_API_KEY".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_dimensions() -> usize {
    256
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_num_workers() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    64
}

fn default_rank_threads() -> usize {
    1
}

fn default_verify_unit_norm() -> bool {
    true
}

fn default_unit_norm_tolerance() -> f32 {
    1e-3
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in CIREVAL_CONFIG environment variable (must exist)
    /// 2. ./config.toml in current directory (defaults are used when absent)
    pub fn load() -> Result<Self> {
        // Optional .env file; the model server token usually lives there
        let _ = dotenv::dotenv();

        let config = match std::env::var("CIREVAL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let default_path = PathBuf::from("config.toml");
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    log::debug!("No config.toml found, using defaults");
                    Config::default()
                }
            }
        };

        config.validate()?;

        Ok(config)
    }

    /// Parse a config file without consulting the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.embeddings.endpoint).with_context(|| {
            format!(
                "embeddings.endpoint is not a valid URL: {}",
                self.embeddings.endpoint
            )
        })?;

        if self.embeddings.batch_size == 0 {
            anyhow::bail!("embeddings.batch_size must be greater than 0");
        }

        if self.embeddings.dimensions == 0 {
            anyhow::bail!("embeddings.dimensions must be greater than 0");
        }

        if self.eval.batch_size == 0 {
            anyhow::bail!("eval.batch_size must be greater than 0");
        }

        if self.eval.num_workers == 0 {
            anyhow::bail!("eval.num_workers must be greater than 0");
        }

        if self.eval.queue_capacity == 0 {
            anyhow::bail!("eval.queue_capacity must be greater than 0");
        }

        if self.eval.rank_threads == 0 {
            anyhow::bail!("eval.rank_threads must be greater than 0");
        }

        if !(self.eval.unit_norm_tolerance > 0.0) {
            anyhow::bail!("eval.unit_norm_tolerance must be positive");
        }

        Ok(())
    }

    /// Bearer token for the model server, if the configured variable is set
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.embeddings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    /// Get the feature store path
    pub fn features_db(&self) -> Option<&Path> {
        self.storage.features_db.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use crate::test_utils::ENV_LOCK;
    use tempfile::TempDir;

    const TEST_CONFIG: &str = r#"
[cireval]
log_level = "debug"

[embeddings]
endpoint = "http://localhost:9000"
api_key_env = "CIREVAL_TEST_KEY"
batch_size = 16
dimensions = 256

[eval]
batch_size = 8
num_workers = 2
rank_threads = 4
verify_unit_norm = false

[storage]
features_db = "./features.db"
"#;

    fn with_config_env(config_path: &str, f: impl FnOnce()) {
        let original = std::env::var("CIREVAL_CONFIG").ok();
        std::env::set_var("CIREVAL_CONFIG", config_path);
        f();
        std::env::remove_var("CIREVAL_CONFIG");
        if let Some(val) = original {
            std::env::set_var("CIREVAL_CONFIG", val);
        }
    }

    #[test]
    fn test_config_load_success() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, TEST_CONFIG).unwrap();
        with_config_env(config_path.to_str().unwrap(), || {
            let config = Config::load();
            assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.cireval.log_level, "debug");
            assert_eq!(config.embeddings.batch_size, 16);
            assert_eq!(config.eval.rank_threads, 4);
            assert!(!config.eval.verify_unit_norm);
            // Unset keys fall back to defaults
            assert_eq!(config.eval.queue_capacity, 64);
            assert_eq!(config.features_db(), Some(Path::new("./features.db")));
        });
    }

    #[test]
    fn test_config_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.embeddings.dimensions, 256);
        assert!(config.eval.verify_unit_norm);
        assert!(config.features_db().is_none());
    }

    #[test]
    fn test_config_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.eval.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("eval.batch_size"));
    }

    #[test]
    fn test_config_rejects_bad_endpoint() {
        let mut config = Config::default();
        config.embeddings.endpoint = "not a url".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("embeddings.endpoint"));
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        with_config_env("nonexistent.toml", || {
            let config = Config::load();
            assert!(config.is_err());
        });
    }

    #[test]
    fn test_api_key_from_env() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut config = Config::default();
        config.embeddings.api_key_env = "CIREVAL_TEST_API_KEY_VAR".to_string();
        std::env::remove_var("CIREVAL_TEST_API_KEY_VAR");
        assert!(config.api_key().is_none());
        std::env::set_var("CIREVAL_TEST_API_KEY_VAR", "secret");
        assert_eq!(config.api_key().as_deref(), Some("secret"));
        std::env::remove_var("CIREVAL_TEST_API_KEY_VAR");
    }
}
