use thiserror::Error;

#[derive(Error, Debug)]
pub enum SalleSenseError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No sensor of type '{0}' found")]
    SensorNotFound(String),

    #[error("All {} connection attempts failed: {}", .attempts.len(), .attempts.join("; "))]
    ConnectionExhausted { attempts: Vec<String> },

    #[error("Other error: {0}")]
    Other(String),
}
