//! Configuration loading and types for speechcoach
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/speechcoach/config.toml)
//! 3. Environment variables (SPEECHCOACH_*)
//! 4. CLI arguments (highest priority)

use crate::error::SpeechCoachError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Speechcoach Configuration
#
# Location: ~/.config/speechcoach/config.toml
# All settings can be overridden via CLI flags

[api]
# Base URL of the coaching backend
base_url = "http://localhost:8080"

# Request timeout in seconds (applies to every call, including analysis)
timeout_secs = 30

# Where to send the user when the server rejects the credential
login_path = "/login"

[auth]
# Numeric or string identifier of the practising user
user_id = "1"

# Bearer token. Prefer the SPEECHCOACH_TOKEN environment variable
# over storing it here.
# token = "..."

[audio]
# Audio input device ("default" uses system default)
device = "default"

# Sample rate of the submitted recording in Hz
sample_rate = 16000

# Maximum recording duration in seconds (safety limit)
max_duration_secs = 60

# Ask the host for echo cancellation / noise suppression where supported
echo_cancellation = true
noise_suppression = true
"#;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub audio: AudioConfig,
}

/// Backend connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Base URL, e.g. "https://coach.example.org"
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Login entry point used for unauthenticated redirects
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

/// Identity of the practising user
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Audio capture configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// cpal device name, or "default"
    #[serde(default = "default_device")]
    pub device: String,

    /// Sample rate in Hz of the submitted WAV
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Maximum recording duration in seconds (safety limit)
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u32,

    #[serde(default = "default_true")]
    pub echo_cancellation: bool,

    #[serde(default = "default_true")]
    pub noise_suppression: bool,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_user_id() -> String {
    "1".to_string()
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_max_duration_secs() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            login_path: default_login_path(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            token: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            max_duration_secs: default_max_duration_secs(),
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

impl ApiConfig {
    /// Absolute URL of the login entry point
    pub fn login_url(&self) -> String {
        if self.login_path.starts_with("http://") || self.login_path.starts_with("https://") {
            return self.login_path.clone();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.login_path.trim_start_matches('/')
        )
    }

    /// Check the base URL looks usable
    pub fn validate(&self) -> Result<(), SpeechCoachError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(SpeechCoachError::Config(format!(
                "api.base_url must start with http:// or https://, got: {}",
                self.base_url
            )));
        }

        if self.base_url.starts_with("http://")
            && !self.base_url.contains("localhost")
            && !self.base_url.contains("127.0.0.1")
            && !self.base_url.contains("[::1]")
        {
            tracing::warn!(
                "API base URL uses HTTP without TLS. Recordings and credentials will be sent unencrypted!"
            );
        }

        Ok(())
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "speechcoach")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Render the configuration with the credential masked
    pub fn redacted(&self) -> Config {
        let mut shown = self.clone();
        if shown.auth.token.is_some() {
            shown.auth.token = Some("********".to_string());
        }
        shown
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, SpeechCoachError> {
    let mut config = Config::default();

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| SpeechCoachError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| SpeechCoachError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Override config values from SPEECHCOACH_* variables
fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("SPEECHCOACH_API_URL") {
        config.api.base_url = url;
    }
    if let Some(token) = lookup("SPEECHCOACH_TOKEN") {
        config.auth.token = Some(token);
    }
    if let Some(user_id) = lookup("SPEECHCOACH_USER_ID") {
        config.auth.user_id = user_id;
    }
}

/// Save configuration to file
pub fn save_config(config: &Config, path: &Path) -> Result<(), SpeechCoachError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SpeechCoachError::Config(format!("Failed to create config dir: {}", e)))?;
    }

    let contents = toml::to_string_pretty(config)
        .map_err(|e| SpeechCoachError::Config(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(path, contents)
        .map_err(|e| SpeechCoachError::Config(format!("Failed to write config: {}", e)))?;

    Ok(())
}
