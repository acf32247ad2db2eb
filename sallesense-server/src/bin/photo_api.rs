use clap::Parser;
use sallesense_core::{PgCaptureStore, SalleSenseConfig};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sallesense-photo-api", author, version, about = "HTTP API over stored room photos", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "sallesense.toml")]
    config: String,
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

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    if !config.http.enabled {
        tracing::info!("HTTP API disabled (http.enabled = false)");
        return Ok(());
    }

    let pool = match sallesense_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    let (tx, rx) = broadcast::channel(1);
    sallesense_server::shutdown::spawn_signal_listener(tx);

    let store = PgCaptureStore::new(pool.clone());
    if let Err(e) = sallesense_server::http::start_http_server(store, &config.http, rx).await {
        tracing::error!("HTTP server error: {}", e);
        pool.close().await;
        std::process::exit(1);
    }

    pool.close().await;
    Ok(())
}
