use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::ImageFormat;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use shared::Label;

pub const CONFIG_PATH_VAR: &str = "CLASSIFIER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/classifier.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub image: ImageConfig,
    pub labels: Vec<String>,
    pub upload: UploadConfig,
    pub staging: StagingConfig,
    pub inference: InferenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5006,
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub use_cuda: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("model/cnn_model.pt"),
            use_cuda: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub scale: f32,
    pub resize_filter: String,
    pub accepted_formats: Vec<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
            channels: 3,
            scale: 1.0 / 255.0,
            resize_filter: "nearest".to_string(),
            accepted_formats: ["jpeg", "png", "bmp", "gif", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ImageConfig {
    pub fn filter(&self) -> Result<FilterType, ConfigError> {
        match self.resize_filter.as_str() {
            "nearest" => Ok(FilterType::Nearest),
            "triangle" => Ok(FilterType::Triangle),
            "catmull_rom" => Ok(FilterType::CatmullRom),
            "gaussian" => Ok(FilterType::Gaussian),
            "lanczos3" => Ok(FilterType::Lanczos3),
            other => Err(ConfigError::invalid(
                "image.resize_filter",
                format!("unknown filter '{}'", other),
            )),
        }
    }

    pub fn formats(&self) -> Result<Vec<ImageFormat>, ConfigError> {
        self.accepted_formats
            .iter()
            .map(|name| {
                ImageFormat::from_extension(name).ok_or_else(|| {
                    ConfigError::invalid(
                        "image.accepted_formats",
                        format!("unknown image format '{}'", name),
                    )
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub field_name: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 50 * 1024 * 1024,
            field_name: "image".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("uploads"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub timeout_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

impl InferenceConfig {
    /// `None` when the bound is disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

pub fn default_labels() -> Vec<String> {
    ["drink", "food", "inside", "menu", "outside"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl AppConfig {
    /// Reads the YAML file named by `CLASSIFIER_CONFIG` (or the default path),
    /// then applies environment overrides. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        log::info!("Loading configuration from {}", path);
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::with_default_labels(Self::default()));
        }
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(config_str)?;
        Ok(Self::with_default_labels(config))
    }

    fn with_default_labels(mut config: Self) -> Self {
        if config.labels.is_empty() {
            config.labels = default_labels();
        }
        config
    }

    fn apply_env(&mut self) {
        if let Ok(path) = env::var("MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Ok(port) = env::var("PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => log::warn!("Ignoring invalid PORT value: {}", port),
            }
        }
        if let Ok(dir) = env::var("UPLOAD_DIR") {
            self.staging.dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.width == 0 || self.image.height == 0 {
            return Err(ConfigError::invalid(
                "image",
                "width and height must be non-zero",
            ));
        }
        if self.image.channels != 3 {
            return Err(ConfigError::invalid(
                "image.channels",
                format!("only 3 channels are supported, got {}", self.image.channels),
            ));
        }
        if !self.image.scale.is_finite() || self.image.scale <= 0.0 {
            return Err(ConfigError::invalid(
                "image.scale",
                format!("must be a positive number, got {}", self.image.scale),
            ));
        }
        self.image.filter()?;
        if self.image.formats()?.is_empty() {
            return Err(ConfigError::invalid(
                "image.accepted_formats",
                "at least one format is required",
            ));
        }

        if self.labels.is_empty() {
            return Err(ConfigError::invalid("labels", "at least one label is required"));
        }
        let mut seen = HashSet::new();
        for label in &self.labels {
            if label.trim().is_empty() {
                return Err(ConfigError::invalid("labels", "labels must be non-empty"));
            }
            if !seen.insert(label.as_str()) {
                return Err(ConfigError::invalid(
                    "labels",
                    format!("duplicate label '{}'", label),
                ));
            }
        }

        if self.upload.max_bytes == 0 {
            return Err(ConfigError::invalid("upload.max_bytes", "must be non-zero"));
        }
        if self.upload.field_name.is_empty() {
            return Err(ConfigError::invalid("upload.field_name", "must be non-empty"));
        }
        Ok(())
    }

    pub fn labels(&self) -> Vec<Label> {
        self.labels.iter().map(|l| Label::new(l.as_str())).collect()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
