use clap::Parser;
use dotenvy::dotenv;
use office_pdf_backend::config::AppConfig;
use office_pdf_backend::infrastructure::{converter, storage};
use office_pdf_backend::services::conversion_service::ConversionService;
use office_pdf_backend::services::limiter::ConversionLimiter;
use office_pdf_backend::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "office_pdf_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Office → PDF backend...");

    // 2. Configuration
    let mut config = AppConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate()?;

    let limiter = ConversionLimiter::from_config(&config);
    info!(
        "🛡️  Config: Max Size={}MB, Converter={}, Max Concurrent={}, Timeout={}",
        config.max_file_size / 1024 / 1024,
        config.converter_path,
        if limiter.is_some() {
            config.max_concurrent_conversions.to_string()
        } else {
            "unlimited".to_string()
        },
        match config.conversion_timeout() {
            Some(limit) => format!("{:?}", limit),
            None => "none".to_string(),
        }
    );

    // 3. Infrastructure
    let temp_storage = storage::setup_storage(&config).await?;
    let converter_service = converter::setup_converter(&config).await;

    let state = AppState {
        config: config.clone(),
        conversions: Arc::new(ConversionService::new(
            temp_storage,
            converter_service,
            limiter,
        )),
    };

    // 4. Serve
    let app = create_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Backend running at http://localhost:{}", config.port);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", config.port);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Server runtime error: {}", e);
        return Err(e.into());
    }

    info!("👋 Backend exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
