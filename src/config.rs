use crate::auth::CredentialIssuer;
use crate::error::{AdaptorError, Result};
use crate::vendor::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "sensetime-adaptor.toml";
const CONFIG_DIR_NAME: &str = "sensetime-adaptor";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptorConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub vendor: VendorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_access_key_env")]
    pub access_key_env: String,
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,
    /// Upper bound on a whole vendor call, streaming included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AdaptorConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            vendor: VendorConfig::default(),
        }
    }
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_key_env: default_access_key_env(),
            secret_key_env: default_secret_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_port() -> u16 {
    4300
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_access_key_env() -> String {
    "SENSENOVA_ACCESS_KEY_ID".to_string()
}

fn default_secret_key_env() -> String {
    "SENSENOVA_SECRET_ACCESS_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl AdaptorConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AdaptorError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file, falling back to defaults.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in &config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Build the credential issuer from the configured environment variables.
    pub fn resolve_credentials(&self) -> Result<CredentialIssuer> {
        let access_key = read_env(&self.vendor.access_key_env)?;
        let secret_key = read_env(&self.vendor.secret_key_env)?;
        Ok(CredentialIssuer::new(access_key, secret_key))
    }
}

fn read_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AdaptorError::config(format!(
            "Environment variable '{name}' not set. Set it with your SenseNova key."
        ))),
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from(CONFIG_FILE_NAME));

    if cfg!(target_os = "macos") {
        if let Some(home) = home_dir() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join(CONFIG_DIR_NAME)
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join(CONFIG_DIR_NAME).join("config.toml"));
        }
        if let Some(home) = home_dir() {
            paths.push(home.join(".config").join(CONFIG_DIR_NAME).join("config.toml"));
        }
    }

    if let Some(home) = home_dir() {
        paths.push(home.join(format!(".{CONFIG_FILE_NAME}")));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
