use std::sync::Arc;

use chatrag_core::ChatragConfig;
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use chatrag_server::server;
use chatrag_server::services::RagServices;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "chatrag.toml")]
    config: String,

    /// Build all services, print their status and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (GEMINI_API_KEY, PINECONE_API_KEY in dev)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match ChatragConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over service.log_level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.service.log_level.clone()));
    fmt().with_env_filter(filter).init();

    let services = match RagServices::from_config(config).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to initialise services: {:#}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        let response =
            chatrag_server::router::handle_request(chatrag_core::ipc::ChatragRequest::Health, &services).await;
        match response.data {
            Some(data) if response.is_ok() => {
                println!("✅ chatrag services ready: {}", data);
                return Ok(());
            }
            _ => {
                println!(
                    "❌ chatrag health check failed: {}",
                    response.error.unwrap_or_default()
                );
                std::process::exit(1);
            }
        }
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // HTTP REST API, if enabled
    if services.config.http.enabled {
        let http_services = services.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = chatrag_server::http::start_http_server(http_services, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = services.config.service.socket_path.clone();
    server::run_unix_server(&socket_path, services, tx.subscribe()).await?;

    Ok(())
}
