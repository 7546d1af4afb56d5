
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable consulted when no key is configured in the file.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("OpenAI API key is not set. Set providers.openai.api_key in {0} or export OPENAI_API_KEY.")]
    MissingApiKey(String),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    #[error("Could not determine home directory")]
    NoHomeDir,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub uploads: UploadsConfig,

    #[serde(default)]
    pub prompts: PromptsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model used for image analysis (must accept image input)
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Model used for symptom analysis and follow-up questions
    #[serde(default = "default_text_model")]
    pub text_model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Requested fidelity for image input: "low", "high" or "auto"
    #[serde(default = "default_image_detail")]
    pub image_detail: String,

    /// Transport timeout for one model request, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: OpenAIConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Supports `${VAR}` / `$VAR` expansion. Empty means "use OPENAI_API_KEY".
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind")]
    pub bind: String,

    /// Idle time after which a browser session is discarded
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,

    /// Directory for staged uploads. Defaults to the system temp dir.
    #[serde(default)]
    pub temp_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Directory with `image.md`, `symptom.md` and `follow_up.md` overrides
    #[serde(default)]
    pub dir: Option<String>,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub symptom: Option<String>,

    #[serde(default)]
    pub follow_up: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_vision_model() -> String {
    "gpt-4o".to_string()
}
fn default_text_model() -> String {
    "gpt-4".to_string()
}
fn default_max_tokens() -> u32 {
    1500
}
fn default_image_detail() -> String {
    "high".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_port() -> u16 {
    8501
}
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_session_timeout_secs() -> u64 {
    30 * 60
}
fn default_max_sessions() -> usize {
    100
}
fn default_max_file_size_bytes() -> u64 {
    20 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vision_model: default_vision_model(),
            text_model: default_text_model(),
            max_tokens: default_max_tokens(),
            image_detail: default_image_detail(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_openai_base_url(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            session_timeout_secs: default_session_timeout_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size_bytes(),
            temp_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the defaults; secrets may still come from the
    /// environment (including a `.env` file in the working directory).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            Self::from_toml(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?
        } else {
            Config::default()
        };

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.vision_model.trim().is_empty() {
            return Err(ConfigError::Invalid("model.vision_model cannot be empty".into()));
        }
        if self.model.text_model.trim().is_empty() {
            return Err(ConfigError::Invalid("model.text_model cannot be empty".into()));
        }
        if self.model.max_tokens == 0 {
            return Err(ConfigError::Invalid("model.max_tokens must be positive".into()));
        }
        if !matches!(self.model.image_detail.as_str(), "low" | "high" | "auto") {
            return Err(ConfigError::Invalid(format!(
                "model.image_detail must be one of low, high, auto (got {})",
                self.model.image_detail
            )));
        }
        if self.model.timeout_secs == 0 {
            return Err(ConfigError::Invalid("model.timeout_secs must be positive".into()));
        }
        if !self.providers.openai.base_url.starts_with("http://")
            && !self.providers.openai.base_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(format!(
                "providers.openai.base_url must be an http(s) URL (got {})",
                self.providers.openai.base_url
            )));
        }
        if self.server.max_sessions == 0 {
            return Err(ConfigError::Invalid("server.max_sessions must be positive".into()));
        }
        if self.uploads.max_file_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "uploads.max_file_size_bytes must be positive".into(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be text or json (got {})",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// The model API key. Absence is fatal for anything that talks to the model.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        let configured = self.providers.openai.api_key.trim();
        // An unexpanded `${VAR}` means the variable was not set
        if !configured.is_empty() && !configured.starts_with('$') {
            return Ok(configured.to_string());
        }

        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => {
                let location = Self::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "config.toml".to_string());
                Err(ConfigError::MissingApiKey(location))
            }
        }
    }

    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        let content = toml::to_string_pretty(self)?;
        write_file(&path, &content)?;
        Ok(path)
    }

    /// Write the commented default template (for first-time setup)
    pub fn save_template(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        write_file(&path, DEFAULT_CONFIG_TEMPLATE)?;
        Ok(path)
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let base = directories::BaseDirs::new().ok_or(ConfigError::NoHomeDir)?;
        Ok(base.home_dir().join(".medassist").join("config.toml"))
    }

    /// Directory for staged uploads, expanded
    pub fn upload_dir(&self) -> PathBuf {
        match &self.uploads.temp_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => std::env::temp_dir(),
        }
    }

    fn expand_env_vars(&mut self) {
        self.providers.openai.api_key = expand_env(&self.providers.openai.api_key);
        self.providers.openai.base_url = expand_env(&self.providers.openai.base_url);
    }

    pub fn get_value(&self, key: &str) -> Result<String, ConfigError> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["model", "vision_model"] => Ok(self.model.vision_model.clone()),
            ["model", "text_model"] => Ok(self.model.text_model.clone()),
            ["model", "max_tokens"] => Ok(self.model.max_tokens.to_string()),
            ["model", "image_detail"] => Ok(self.model.image_detail.clone()),
            ["model", "timeout_secs"] => Ok(self.model.timeout_secs.to_string()),
            ["providers", "openai", "base_url"] => Ok(self.providers.openai.base_url.clone()),
            ["server", "port"] => Ok(self.server.port.to_string()),
            ["server", "bind"] => Ok(self.server.bind.clone()),
            ["server", "session_timeout_secs"] => Ok(self.server.session_timeout_secs.to_string()),
            ["server", "max_sessions"] => Ok(self.server.max_sessions.to_string()),
            ["uploads", "max_file_size_bytes"] => Ok(self.uploads.max_file_size_bytes.to_string()),
            ["prompts", "dir"] => Ok(self.prompts.dir.clone().unwrap_or_default()),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            ["logging", "format"] => Ok(self.logging.format.clone()),
            _ => Err(ConfigError::UnknownKey(key.to_string())),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let parts: Vec<&str> = key.split('.').collect();
        let invalid = |e: std::num::ParseIntError| {
            ConfigError::Invalid(format!("{}: {} ({})", key, value, e))
        };

        match parts.as_slice() {
            ["model", "vision_model"] => self.model.vision_model = value.to_string(),
            ["model", "text_model"] => self.model.text_model = value.to_string(),
            ["model", "max_tokens"] => self.model.max_tokens = value.parse().map_err(invalid)?,
            ["model", "image_detail"] => self.model.image_detail = value.to_string(),
            ["model", "timeout_secs"] => self.model.timeout_secs = value.parse().map_err(invalid)?,
            ["providers", "openai", "base_url"] => {
                self.providers.openai.base_url = value.to_string()
            }
            ["server", "port"] => self.server.port = value.parse().map_err(invalid)?,
            ["server", "bind"] => self.server.bind = value.to_string(),
            ["server", "session_timeout_secs"] => {
                self.server.session_timeout_secs = value.parse().map_err(invalid)?
            }
            ["server", "max_sessions"] => {
                self.server.max_sessions = value.parse().map_err(invalid)?
            }
            ["uploads", "max_file_size_bytes"] => {
                self.uploads.max_file_size_bytes = value.parse().map_err(invalid)?
            }
            ["prompts", "dir"] => self.prompts.dir = Some(value.to_string()),
            ["logging", "level"] => self.logging.level = value.to_string(),
            ["logging", "format"] => self.logging.format = value.to_string(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }

        self.validate()
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, content).map_err(io_err)
}

fn expand_env(s: &str) -> String {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else if let Some(var_name) = s.strip_prefix('$') {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else {
        s.to_string()
    }
}

/// Default config template with helpful comments (written by `config init`)
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# medassist configuration
# Created by `medassist config init`. Edit as needed.

[model]
# Vision-capable model for image analysis
vision_model = "gpt-4o"
# Model for symptom analysis and follow-up questions
text_model = "gpt-4"
max_tokens = 1500
# Image fidelity sent to the model: "low", "high" or "auto"
image_detail = "high"
timeout_secs = 120

[providers.openai]
# Leave empty to read OPENAI_API_KEY from the environment (or a .env file)
api_key = "${OPENAI_API_KEY}"
base_url = "https://api.openai.com/v1"

[server]
port = 8501
bind = "127.0.0.1"
session_timeout_secs = 1800
max_sessions = 100

[uploads]
max_file_size_bytes = 20971520
# temp_dir = "~/.medassist/uploads"

[prompts]
# Directory with image.md, symptom.md and follow_up.md to replace the built-in personas
# dir = "~/.medassist/prompts"

[logging]
level = "info"
# "text" or "json"
format = "text"
"#;
