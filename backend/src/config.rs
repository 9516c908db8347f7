use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use strum_macros::EnumString;
use url::Url;

use crate::storage::upload_service::UploadService;

pub const CONFIG_PATH_VAR: &str = "NUTRISNAP_CONFIG";

/// URL segment `static_dir` is mounted under.
pub const STATIC_MOUNT: &str = "static";

const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{0} is not set")]
    MissingKey(&'static str),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Invalid URL for {key}: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// How stored uploads are named inside the uploads directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NamingPolicy {
    /// `<sha256 of the bytes>.<ext>`
    ContentHash,
    /// The sanitized client filename; a later upload with the same name replaces it.
    Original,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: usize,
    pub naming: NamingPolicy,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("static/uploads"),
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            naming: NamingPolicy::ContentHash,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub endpoint: String,
    pub api_key: String,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
    pub max_predictions: usize,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.clarifai.com/v2/models/food-item-recognition/outputs"
                .to_string(),
            api_key: String::new(),
            user_id: Some("clarifai".to_string()),
            app_id: Some("main".to_string()),
            max_predictions: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NutritionConfig {
    pub base_url: String,
    pub api_key: String,
}

impl Default for NutritionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.nal.usda.gov/fdc/v1".to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub uploads: UploadConfig,
    pub recognition: RecognitionConfig,
    pub nutrition: NutritionConfig,
    pub static_dir: PathBuf,
    /// Chain a nutrition lookup for the top prediction on every upload.
    pub include_nutrition: bool,
    pub upstream_timeout_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            uploads: UploadConfig::default(),
            recognition: RecognitionConfig::default(),
            nutrition: NutritionConfig::default(),
            static_dir: PathBuf::from("static"),
            include_nutrition: true,
            upstream_timeout_secs: None,
        }
    }
}

impl AppConfig {
    /// Defaults, then the YAML file named by `NUTRISNAP_CONFIG` (if any), then
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => {
                log::info!("Loading configuration from {}", path);
                Self::from_file(path)?
            }
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_value("PORT", port)?;
        }
        if let Some(dir) = lookup("UPLOAD_DIR") {
            self.uploads.dir = PathBuf::from(dir);
        }
        if let Some(max_bytes) = lookup("MAX_UPLOAD_BYTES") {
            self.uploads.max_bytes = parse_value("MAX_UPLOAD_BYTES", max_bytes)?;
        }
        if let Some(naming) = lookup("UPLOAD_NAMING") {
            self.uploads.naming = parse_value("UPLOAD_NAMING", naming)?;
        }
        if let Some(dir) = lookup("STATIC_DIR") {
            self.static_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup("INCLUDE_NUTRITION") {
            self.include_nutrition = parse_bool("INCLUDE_NUTRITION", flag)?;
        }
        if let Some(secs) = lookup("UPSTREAM_TIMEOUT_SECS") {
            self.upstream_timeout_secs = Some(parse_value("UPSTREAM_TIMEOUT_SECS", secs)?);
        }
        if let Some(key) = lookup("CLARIFAI_API_KEY") {
            self.recognition.api_key = key;
        }
        if let Some(endpoint) = lookup("CLARIFAI_ENDPOINT") {
            self.recognition.endpoint = endpoint;
        }
        if let Some(user_id) = lookup("CLARIFAI_USER_ID") {
            self.recognition.user_id = Some(user_id).filter(|id| !id.is_empty());
        }
        if let Some(app_id) = lookup("CLARIFAI_APP_ID") {
            self.recognition.app_id = Some(app_id).filter(|id| !id.is_empty());
        }
        if let Some(key) = lookup("USDA_API_KEY") {
            self.nutrition.api_key = key;
        }
        if let Some(base_url) = lookup("USDA_BASE_URL") {
            self.nutrition.base_url = base_url;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recognition.api_key.trim().is_empty() {
            return Err(ConfigError::MissingKey("CLARIFAI_API_KEY"));
        }
        if self.nutrition.api_key.trim().is_empty() {
            return Err(ConfigError::MissingKey("USDA_API_KEY"));
        }
        Url::parse(&self.recognition.endpoint).map_err(|source| ConfigError::InvalidUrl {
            key: "CLARIFAI_ENDPOINT",
            source,
        })?;
        Url::parse(&self.nutrition.base_url).map_err(|source| ConfigError::InvalidUrl {
            key: "USDA_BASE_URL",
            source,
        })?;
        if self.uploads.max_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_UPLOAD_BYTES",
                value: "0".to_string(),
            });
        }
        if UploadService::public_prefix(&self.uploads.dir, &self.static_dir).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "UPLOAD_DIR",
                value: self.uploads.dir.display().to_string(),
            });
        }
        if self.recognition.max_predictions == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_predictions",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream_timeout_secs.map(Duration::from_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    let parsed: Option<T> = value.trim().parse().ok();
    parsed.ok_or(ConfigError::InvalidValue { key, value })
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}
