use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: ModelConfig,
    #[serde(default)]
    pub labels: Option<LabelsConfig>,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub trait Validatable {
    fn get_path(&self) -> PathBuf;

    fn validate(&self) -> Result<(), String> {
        let path = self.get_path();
        if !path.exists() {
            return Err(format!("File not found: {:?}", path));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub onnx_file: String,
    pub model_dir: PathBuf,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_min_probability")]
    pub min_probability: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
    #[serde(default)]
    pub use_tensorrt: bool,
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_input_size() -> u32 {
    640
}

fn default_min_probability() -> f32 {
    0.25
}

fn default_iou_threshold() -> f32 {
    0.7
}

fn default_max_detections() -> usize {
    300
}

impl Validatable for ModelConfig {
    fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }

    fn validate(&self) -> Result<(), String> {
        if self.num_instances == 0 {
            return Err("model.num_instances must be at least 1".to_string());
        }
        if self.input_size == 0 {
            return Err("model.input_size must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_probability) {
            return Err(format!(
                "model.min_probability must be within [0, 1], got {}",
                self.min_probability
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(format!(
                "model.iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            ));
        }
        if !self.get_path().exists() {
            return Err(format!("Model file not found: {:?}", self.get_path()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LabelsConfig {
    pub labels_file: String,
    pub labels_dir: PathBuf,
}

impl Validatable for LabelsConfig {
    fn get_path(&self) -> PathBuf {
        self.labels_dir.join(&self.labels_file)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

/// Layers `base.yaml`, the environment file and `APP_*` variables, without
/// checking that the referenced files exist.
pub fn load_configuration(
    configuration_directory: &Path,
    environment: &Environment,
) -> Result<Config, config::ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    config.try_deserialize::<Config>()
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("No current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = load_configuration(&configuration_directory, &environment)?;

    config.model.validate().map_err(config::ConfigError::Message)?;
    if let Some(labels) = &config.labels {
        labels.validate().map_err(config::ConfigError::Message)?;
    }

    Ok(config)
}
