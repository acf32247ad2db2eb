use std::time::Duration;

use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::SalleSenseError;

/// Prefix for environment overrides, e.g. `SALLESENSE__DATABASE__PASSWORD`.
pub const ENV_PREFIX: &str = "SALLESENSE";

/// Type tag of the sensor row the capture loop writes against.
pub const CAMERA_SENSOR_TYPE: &str = "CAMERA";

#[derive(Debug, Deserialize, Clone)]
pub struct SalleSenseConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub capture: CaptureConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Full connection URL. When set it is tried before the host/name variants.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// TLS modes tried in order when connecting (`require`, `prefer`, `disable`, ...).
    #[serde(default = "default_ssl_modes")]
    pub ssl_modes: Vec<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    2
}

fn default_ssl_modes() -> Vec<String> {
    vec!["prefer".to_string(), "disable".to_string()]
}

fn default_connect_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    pub room_id: i32,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_settle_seconds")]
    pub settle_seconds: u64,
    #[serde(default = "default_sensor_type")]
    pub sensor_type: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_buffer_count")]
    pub buffer_count: u32,
}

fn default_interval_seconds() -> u64 {
    5
}

fn default_settle_seconds() -> u64 {
    2
}

fn default_sensor_type() -> String {
    CAMERA_SENSOR_TYPE.to_string()
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_buffer_count() -> u32 {
    2
}

impl CaptureConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CameraConfig {
    pub backend: String,
    pub command: String,
    pub capture_timeout_seconds: u64,
    /// Image directory replayed by the `directory` backend.
    #[serde(default)]
    pub directory: Option<String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: "rpicam".to_string(),
            command: "rpicam-still".to_string(),
            capture_timeout_seconds: 10,
            directory: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8780,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ImportConfig {
    pub max_photo_bytes: usize,
    pub default_count: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_photo_bytes: 5 * 1024 * 1024,
            default_count: 10,
        }
    }
}

impl SalleSenseConfig {
    /// Load from a TOML file, then apply `SALLESENSE__SECTION__KEY` overrides.
    pub fn load(path: &str) -> Result<Self, SalleSenseError> {
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name(path))
                .add_source(Environment::with_prefix(ENV_PREFIX).separator("__")),
        )
    }

    /// Load from a TOML file only, ignoring the environment.
    pub fn from_file(path: &str) -> Result<Self, SalleSenseError> {
        Self::from_builder(Config::builder().add_source(File::with_name(path)))
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, SalleSenseError> {
        Self::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, SalleSenseError> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SalleSenseError> {
        if self.capture.interval_seconds == 0 {
            return Err(SalleSenseError::InvalidConfig(
                "capture.interval_seconds must be greater than 0".to_string(),
            ));
        }
        if self.capture.room_id <= 0 {
            return Err(SalleSenseError::InvalidConfig(format!(
                "capture.room_id must be positive, got {}",
                self.capture.room_id
            )));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(SalleSenseError::InvalidConfig(format!(
                "capture resolution must be non-zero, got {}x{}",
                self.capture.width, self.capture.height
            )));
        }
        if self.database.url.is_none() && self.database.ssl_modes.is_empty() {
            return Err(SalleSenseError::InvalidConfig(
                "database.ssl_modes must list at least one mode when no url is set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [database]
        name = "sallesense"
        username = "capture"

        [capture]
        room_id = 3
    "#;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config = SalleSenseConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.capture.room_id, 3);
        assert_eq!(config.capture.interval(), Duration::from_secs(5));
        assert_eq!(config.capture.settle_delay(), Duration::from_secs(2));
        assert_eq!(config.capture.sensor_type, "CAMERA");
        assert_eq!((config.capture.width, config.capture.height), (1920, 1080));
        assert_eq!(config.capture.buffer_count, 2);
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.ssl_modes, vec!["prefer", "disable"]);
        assert!(config.database.url.is_none());
        assert_eq!(config.camera.backend, "rpicam");
        assert_eq!(config.camera.command, "rpicam-still");
        assert_eq!(config.import.max_photo_bytes, 5 * 1024 * 1024);
        assert_eq!(config.service.log_level, "info");
        assert!(config.http.enabled);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let toml = format!("{}\ninterval_seconds = 0\n", MINIMAL);
        let err = SalleSenseConfig::from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, SalleSenseError::InvalidConfig(_)), "got {:?}", err);
    }

    #[test]
    fn test_non_positive_room_rejected() {
        let toml = r#"
            [database]
            name = "sallesense"
            username = "capture"

            [capture]
            room_id = 0
        "#;
        let err = SalleSenseConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("room_id"));
    }

    #[test]
    fn test_missing_database_section_is_config_error() {
        let toml = r#"
            [capture]
            room_id = 1
        "#;
        let err = SalleSenseConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, SalleSenseError::Config(_)), "got {:?}", err);
    }

    #[test]
    fn test_directory_backend_parsed() {
        let toml = format!(
            "{}\n[camera]\nbackend = \"directory\"\ncapture_timeout_seconds = 3\ndirectory = \"/srv/frames\"\n",
            MINIMAL
        );
        let config = SalleSenseConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.camera.backend, "directory");
        assert_eq!(config.camera.capture_timeout_seconds, 3);
        assert_eq!(config.camera.directory.as_deref(), Some("/srv/frames"));
    }

    #[test]
    fn test_partial_camera_section_uses_defaults() {
        let toml = format!(
            "{}\n[camera]\nbackend = \"directory\"\ndirectory = \"/srv/frames\"\n",
            MINIMAL
        );
        let config = SalleSenseConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.camera.backend, "directory");
        assert_eq!(config.camera.directory.as_deref(), Some("/srv/frames"));
        assert_eq!(config.camera.command, "rpicam-still");
        assert_eq!(config.camera.capture_timeout_seconds, 10);
    }

    #[test]
    fn test_partial_http_section_uses_defaults() {
        let toml = format!("{}\n[http]\nport = 9000\n", MINIMAL);
        let config = SalleSenseConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.http.port, 9000);
        assert!(config.http.enabled);
        assert_eq!(config.http.host, "127.0.0.1");
    }

    #[test]
    fn test_partial_import_section_uses_defaults() {
        let toml = format!("{}\n[import]\ndefault_count = 4\n", MINIMAL);
        let config = SalleSenseConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.import.default_count, 4);
        assert_eq!(config.import.max_photo_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_example_config_is_valid() {
        let config =
            SalleSenseConfig::from_toml_str(include_str!("../../sallesense.example.toml")).unwrap();
        assert_eq!(config.http.port, 8780);
        assert_eq!(config.import.default_count, 10);
        assert_eq!(config.capture.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sallesense.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = SalleSenseConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.database.name, "sallesense");
        assert_eq!(config.database.username, "capture");
        assert_eq!(config.capture.room_id, 3);
        assert_eq!(config.capture.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let err = SalleSenseConfig::load(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, SalleSenseError::Config(_)), "got {:?}", err);
    }
}
