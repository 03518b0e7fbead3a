//! Configuration management

use crate::error::{BoothError, BoothResult, ErrorContext};
use crate::logging::LoggingConfig;
use crate::types::{BackendConfig, BoothConfig, StorageConfig};

use std::path::{Path, PathBuf};

/// Used when neither the config file nor the environment names a backend
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000/api/v1";

/// Environment variable overriding `backend.base_url`
pub const BACKEND_URL_ENV: &str = "BOOTH_BACKEND_URL";

/// Environment variable overriding `storage.data_dir`
pub const DATA_DIR_ENV: &str = "BOOTH_DATA_DIR";

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            timeout_seconds: 30,
            user_agent: format!("booth/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.booth".to_string(),
        }
    }
}

impl StorageConfig {
    /// Resolve `data_dir`, expanding a leading `~` to the home directory
    pub fn data_dir_path(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches(['/', '\\']));
        }
    }
    PathBuf::from(path)
}

impl BoothConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> BoothResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BoothError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> BoothResult<Self> {
        toml::from_str(content).map_err(|e| BoothError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> BoothResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| BoothError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content).map_err(|e| BoothError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Apply `BOOTH_BACKEND_URL` and `BOOTH_DATA_DIR` when they are set
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(BACKEND_URL_ENV).ok(),
            std::env::var(DATA_DIR_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, backend_url: Option<String>, data_dir: Option<String>) {
        if let Some(url) = backend_url.filter(|v| !v.trim().is_empty()) {
            tracing::debug!(base_url = %url, "Backend URL overridden from environment");
            self.backend.base_url = url;
        }
        if let Some(dir) = data_dir.filter(|v| !v.trim().is_empty()) {
            self.storage.data_dir = dir;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> BoothResult<()> {
        let parsed = url::Url::parse(&self.backend.base_url).map_err(|e| BoothError::Config {
            message: format!("Invalid backend.base_url '{}': {}", self.backend.base_url, e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("validate")
                .with_suggestion("Use an absolute URL such as http://localhost:5000/api/v1"),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BoothError::Config {
                message: format!("Unsupported backend scheme: {}", parsed.scheme()),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Use http or https"),
            });
        }

        if self.backend.timeout_seconds == 0 {
            return Err(BoothError::Config {
                message: "backend.timeout_seconds must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set backend.timeout_seconds to a positive value"),
            });
        }

        if self.storage.data_dir.trim().is_empty() {
            return Err(BoothError::Config {
                message: "storage.data_dir must not be empty".to_string(),
                source: None,
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        Ok(())
    }
}
