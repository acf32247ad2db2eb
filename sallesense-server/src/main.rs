use std::sync::Arc;

use clap::Parser;
use sallesense_core::{create_camera, CameraBackend, PgCaptureStore, SalleSenseConfig};
use sallesense_server::capture::{CaptureLoop, CaptureSettings};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sallesense-capture", author, version, about = "Periodic room photo capture", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "sallesense.toml")]
    config: String,

    /// Check database connectivity and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match SalleSenseConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over service.log_level
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    let pool = match sallesense_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match sallesense_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ SalleSense DB health check passed");
        return Ok(());
    }

    let backend = match CameraBackend::from_config(&config.camera) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Invalid camera configuration: {}", e);
            std::process::exit(1);
        }
    };

    let (tx, rx) = broadcast::channel(1);
    sallesense_server::shutdown::spawn_signal_listener(tx.clone());

    let store = Arc::new(PgCaptureStore::new(pool.clone()));
    let mut capture = CaptureLoop::new(
        create_camera(backend),
        store,
        CaptureSettings::from(&config.capture),
    );

    if let Err(e) = capture.setup().await {
        tracing::error!(error = %e, "Capture startup failed");
        pool.close().await;
        std::process::exit(1);
    }

    capture.run(rx).await;
    let report = capture.release().await;
    pool.close().await;

    println!(
        "Capture stopped: {} photos captured ({} capture failures, {} storage failures)",
        report.photos_captured, report.capture_failures, report.persist_failures
    );
    Ok(())
}
