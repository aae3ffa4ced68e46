//! Configuration file support and resolved run settings

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use klaro_ai::models::DEFAULT_BASE_URL;

use crate::sizing::ModelTier;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Model used when tier selection is off or sizing fails
    pub model: Option<String>,
    /// Pick the model from the project size
    pub auto_tier: Option<bool>,
    /// Reasoning plus acting steps per run
    pub max_iterations: Option<u32>,
    pub temperature: Option<f32>,
    /// OpenAI-compatible endpoint
    pub base_url: Option<String>,
    /// Retries per model call
    pub model_retries: Option<u32>,
    pub models: TierModelsConfig,
    pub timeouts: TimeoutsConfig,
    /// API keys (alternative to environment variables)
    pub api_keys: ApiKeys,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TierModelsConfig {
    pub small: Option<String>,
    pub medium: Option<String>,
    pub large: Option<String>,
}

/// Timeouts in seconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub model: Option<u64>,
    pub session: Option<u64>,
    pub tool: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub openai: Option<String>,
}

impl FileConfig {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("klaro")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("KLARO_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load the config file, or defaults when it is missing or malformed.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Write the example config if no file exists yet.
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, example_config())?;
        Ok(path)
    }
}

/// Model per size tier
#[derive(Debug, Clone, PartialEq)]
pub struct TierModels {
    pub small: String,
    pub medium: String,
    pub large: String,
}

impl Default for TierModels {
    fn default() -> Self {
        Self {
            small: "gpt-4o-mini".to_string(),
            medium: "gpt-4o-mini".to_string(),
            large: "gpt-4o".to_string(),
        }
    }
}

impl TierModels {
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Small => &self.small,
            ModelTier::Medium => &self.medium,
            ModelTier::Large => &self.large,
        }
    }
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub model_small: Option<String>,
    pub model_medium: Option<String>,
    pub model_large: Option<String>,
    pub auto_tier: Option<bool>,
    pub max_iterations: Option<u32>,
    pub model_timeout: Option<u64>,
    pub session_timeout: Option<u64>,
    pub tool_timeout: Option<u64>,
    pub model_retries: Option<u32>,
    pub base_url: Option<String>,
    pub guides: Vec<PathBuf>,
    pub verbose: bool,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    pub model: String,
    pub tiers: TierModels,
    pub auto_tier: bool,
    pub max_iterations: u32,
    pub model_timeout: Duration,
    pub session_timeout: Duration,
    pub tool_timeout: Duration,
    pub model_retries: u32,
    pub temperature: f32,
    pub base_url: String,
    /// Extra style-guide files indexed next to the built-in guide
    pub guides: Vec<PathBuf>,
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            tiers: TierModels::default(),
            auto_tier: true,
            max_iterations: 50,
            model_timeout: Duration::from_secs(120),
            session_timeout: Duration::from_secs(600),
            tool_timeout: Duration::from_secs(30),
            model_retries: 2,
            temperature: 0.2,
            base_url: DEFAULT_BASE_URL.to_string(),
            guides: Vec::new(),
            verbose: false,
        }
    }
}

impl Settings {
    /// Command line and environment first, then the config file, then defaults.
    pub fn resolve(overrides: Overrides, file: &FileConfig) -> Self {
        let defaults = Self::default();
        let secs = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_secs).unwrap_or(fallback)
        };

        Self {
            model: overrides
                .model
                .or_else(|| file.model.clone())
                .unwrap_or(defaults.model),
            tiers: TierModels {
                small: overrides
                    .model_small
                    .or_else(|| file.models.small.clone())
                    .unwrap_or(defaults.tiers.small),
                medium: overrides
                    .model_medium
                    .or_else(|| file.models.medium.clone())
                    .unwrap_or(defaults.tiers.medium),
                large: overrides
                    .model_large
                    .or_else(|| file.models.large.clone())
                    .unwrap_or(defaults.tiers.large),
            },
            auto_tier: overrides
                .auto_tier
                .or(file.auto_tier)
                .unwrap_or(defaults.auto_tier),
            max_iterations: overrides
                .max_iterations
                .or(file.max_iterations)
                .unwrap_or(defaults.max_iterations),
            model_timeout: secs(
                overrides.model_timeout.or(file.timeouts.model),
                defaults.model_timeout,
            ),
            session_timeout: secs(
                overrides.session_timeout.or(file.timeouts.session),
                defaults.session_timeout,
            ),
            tool_timeout: secs(
                overrides.tool_timeout.or(file.timeouts.tool),
                defaults.tool_timeout,
            ),
            model_retries: overrides
                .model_retries
                .or(file.model_retries)
                .unwrap_or(defaults.model_retries),
            temperature: file.temperature.unwrap_or(defaults.temperature),
            base_url: overrides
                .base_url
                .or_else(|| file.base_url.clone())
                .unwrap_or(defaults.base_url),
            guides: overrides.guides,
            verbose: overrides.verbose,
        }
    }
}

/// API key from the config file, falling back to `OPENAI_API_KEY`.
pub fn api_key(file: &FileConfig) -> Option<String> {
    klaro_ai::providers::get_api_key(
        file.api_keys.openai.as_deref(),
        klaro_ai::providers::openai::API_KEY_ENV,
    )
    .ok()
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# klaro configuration file
# Place at ~/.config/klaro/config.toml (Linux/Mac) or %APPDATA%\klaro\config.toml (Windows)
# Command-line flags and KLARO_* environment variables take precedence.

# Model used when automatic tier selection is off
model = "gpt-4o-mini"

# Choose the model from the size of the project being documented
auto_tier = true

# Reasoning plus tool steps allowed per run
max_iterations = 50

temperature = 0.2

# Retries per model call before the agent is told the call failed
model_retries = 2

# OpenAI-compatible endpoint
# base_url = "https://api.openai.com/v1"

[models]
small = "gpt-4o-mini"
medium = "gpt-4o-mini"
large = "gpt-4o"

# Timeouts in seconds
[timeouts]
model = 120
session = 600
tool = 30

# API keys (optional - can also use the OPENAI_API_KEY environment variable)
[api_keys]
# openai = "sk-..."
"#
}
