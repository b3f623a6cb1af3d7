use clap::Parser;
use sensetime_adaptor::config::config_search_paths;
use sensetime_adaptor::{build_router, Adaptor, AdaptorConfig, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "sensetime-adaptor",
    about = "Serve an OpenAI-compatible API backed by SenseTime SenseNova",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Vendor base URL (overrides config)
    #[arg(long)]
    base_url: Option<String>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sensetime_adaptor=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = AdaptorConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(base_url) = cli.base_url {
        config.vendor.base_url = base_url;
    }

    // Fails here rather than on the first request if keys are missing.
    let adaptor = Adaptor::from_config(&config)?;

    info!("sensetime-adaptor v{}", env!("CARGO_PKG_VERSION"));
    info!("  Vendor:   {}", config.vendor.base_url);
    info!("  Timeout:  {}s", config.vendor.timeout_secs);
    info!("  Port:     {}", config.port);

    let state = Arc::new(AppState::new(adaptor));

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
