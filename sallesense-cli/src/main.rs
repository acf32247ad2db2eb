//! sallesense-cli: maintenance commands for a SalleSense installation
//!
//! # Subcommands
//! - `health`                                        — check database connectivity
//! - `migrate`                                       — apply the schema migrations
//! - `import <dir> [-n <count> | --all] [--room <id>]` — insert photo files as measurements
//! - `status [--server <url>]`                       — query the photo API health endpoint

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use sallesense_core::image_format::list_photo_files;
use sallesense_core::{PgCaptureStore, SalleSenseConfig, SalleSenseError};
use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8780";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "sallesense-cli", version, about = "SalleSense maintenance commands")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true, default_value = "sallesense.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check database connectivity
    Health,

    /// Run database migrations
    Migrate,

    /// Insert image files from a directory as photo measurements
    Import {
        /// Directory holding .png/.jpg/.jpeg files
        dir: PathBuf,

        /// Number of files to import (default: import.default_count)
        #[arg(short = 'n', long, conflicts_with = "all")]
        count: Option<usize>,

        /// Import every file in the directory
        #[arg(long)]
        all: bool,

        /// Room id to attach the photos to (default: capture.room_id)
        #[arg(long)]
        room: Option<i32>,
    },

    /// Show photo API status
    Status {
        /// Photo API base URL (overrides SALLESENSE_API_URL env var)
        #[arg(long, env = "SALLESENSE_API_URL", default_value = DEFAULT_SERVER)]
        server: String,
    },
}

// ============================================================================
// Import
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportLimit {
    Count(usize),
    All,
}

impl ImportLimit {
    fn from_args(count: Option<usize>, all: bool, default_count: usize) -> Self {
        if all {
            ImportLimit::All
        } else {
            ImportLimit::Count(count.unwrap_or(default_count))
        }
    }
}

/// First files of the sorted listing; a count above the listing size takes everything.
pub fn select_files(mut files: Vec<PathBuf>, limit: ImportLimit) -> Vec<PathBuf> {
    if let ImportLimit::Count(n) = limit {
        files.truncate(n);
    }
    files
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("file too large ({size} bytes, max {max})")]
    TooLarge { size: u64, max: usize },

    #[error("file is empty")]
    Empty,

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("insert failed: {0}")]
    Store(#[from] SalleSenseError),
}

/// Read one photo, rejecting files over `max_bytes` before loading them.
pub fn read_photo(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ImportError> {
    let size = std::fs::metadata(path)?.len();
    if size > max_bytes as u64 {
        return Err(ImportError::TooLarge {
            size,
            max: max_bytes,
        });
    }
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(ImportError::Empty);
    }
    Ok(bytes)
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub inserted: Vec<(String, i32)>,
    pub errors: Vec<(String, String)>,
}

impl ImportSummary {
    pub fn render(&self) -> String {
        let mut out = format!(
            "Inserted: {} | Errors: {}\n",
            self.inserted.len(),
            self.errors.len()
        );
        if !self.inserted.is_empty() {
            let ids: Vec<String> = self.inserted.iter().map(|(_, id)| id.to_string()).collect();
            out.push_str(&format!("Ids: {}\n", ids.join(", ")));
        }
        for (name, err) in &self.errors {
            out.push_str(&format!("  ✗ {}: {}\n", name, err));
        }
        out
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn do_import(
    config: &SalleSenseConfig,
    dir: &Path,
    limit: ImportLimit,
    room_id: i32,
) -> anyhow::Result<ImportSummary> {
    let files = list_photo_files(dir)
        .map_err(|e| anyhow::anyhow!("cannot list {}: {}", dir.display(), e))?;
    if files.is_empty() {
        anyhow::bail!("no .png/.jpg/.jpeg files in {}", dir.display());
    }
    let available = files.len();
    let files = select_files(files, limit);
    println!("Importing {} of {} photos into room {}", files.len(), available, room_id);

    let pool = sallesense_core::db::create_pool(&config.database).await?;
    let store = PgCaptureStore::new(pool.clone());

    let sensor = store
        .find_sensor(&config.capture.sensor_type)
        .await?
        .ok_or_else(|| SalleSenseError::SensorNotFound(config.capture.sensor_type.clone()))?;
    println!("Using sensor {} ({})", sensor.id_capteur, sensor.nom);

    let mut summary = ImportSummary::default();
    for path in &files {
        let name = file_label(path);
        let result = match read_photo(path, config.import.max_photo_bytes) {
            Ok(bytes) => store
                .insert_photo(sensor.id_capteur, room_id, &bytes)
                .await
                .map(|id| (id, bytes.len()))
                .map_err(ImportError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok((id, size)) => {
                println!("  ✓ {} → id {} ({:.1} KB)", name, id, size as f64 / 1024.0);
                summary.inserted.push((name, id));
            }
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "Photo skipped");
                summary.errors.push((name, e.to_string()));
            }
        }
    }

    pool.close().await;
    Ok(summary)
}

// ============================================================================
// Health / Status
// ============================================================================

async fn do_health(config: &SalleSenseConfig) -> anyhow::Result<()> {
    let pool = sallesense_core::db::create_pool(&config.database).await?;
    let version = sallesense_core::db::health_check(&pool).await?;
    println!("✅ PostgreSQL connected: {}", version);
    pool.close().await;
    Ok(())
}

async fn do_migrate(config: &SalleSenseConfig) -> anyhow::Result<()> {
    let pool = sallesense_core::db::create_pool(&config.database).await?;
    sallesense_core::db::run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");
    println!("✅ Database migrations applied");
    pool.close().await;
    Ok(())
}

/// Body of the photo API's GET /health
#[derive(Debug, Deserialize)]
pub struct ApiHealth {
    pub status: String,
    pub version: Option<String>,
    pub postgresql: Option<String>,
    pub error: Option<String>,
}

async fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);
    let resp = match client.get(&url).send().await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("sallesense-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let code = resp.status();
    let body: ApiHealth = resp.json().await?;
    println!("Photo API:  {}", body.status);
    println!("Version:    {}", body.version.as_deref().unwrap_or("?"));
    println!("PostgreSQL: {}", body.postgresql.as_deref().unwrap_or("?"));
    if let Some(err) = body.error {
        println!("Error:      {}", err);
    }

    if !code.is_success() {
        eprintln!("sallesense-cli: photo API unhealthy (HTTP {})", code);
        std::process::exit(1);
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let result = match cli.command {
        Commands::Status { server } => do_status(server.trim_end_matches('/')).await,
        Commands::Health => match SalleSenseConfig::load(&cli.config) {
            Ok(config) => do_health(&config).await,
            Err(e) => Err(e.into()),
        },
        Commands::Migrate => match SalleSenseConfig::load(&cli.config) {
            Ok(config) => do_migrate(&config).await,
            Err(e) => Err(e.into()),
        },
        Commands::Import {
            dir,
            count,
            all,
            room,
        } => match SalleSenseConfig::load(&cli.config) {
            Ok(config) => {
                let limit = ImportLimit::from_args(count, all, config.import.default_count);
                let room_id = room.unwrap_or(config.capture.room_id);
                do_import(&config, &dir, limit, room_id).await.map(|summary| {
                    print!("{}", summary.render());
                })
            }
            Err(e) => Err(e.into()),
        },
    };

    if let Err(e) = result {
        eprintln!("sallesense-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
