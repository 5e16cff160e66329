use claude_shim::providers::{ProviderPreset, WireApi};
use claude_shim::{build_router, AppState, InterceptorChain, SharedLogger, ShimConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "claude-shim",
    about = "Serve the Anthropic Messages API on top of any OpenAI-compatible provider",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Provider name (overrides config)
    #[arg(long)]
    provider: Option<String>,

    /// Backend wire protocol: chat or responses (overrides config)
    #[arg(long, value_parser = parse_api)]
    api: Option<WireApi>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

fn parse_api(value: &str) -> Result<WireApi, String> {
    WireApi::from_name(value).ok_or_else(|| format!("unknown api '{value}', expected chat or responses"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "claude_shim=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths (first match wins):");
        for (i, path) in ShimConfig::search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = ShimConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ref provider) = cli.provider {
        config.provider.name = provider.clone();
        if let Some(preset) = ProviderPreset::from_name(provider) {
            config.provider.base_url = Some(preset.base_url.to_string());
            config.provider.api_key_env = preset.default_api_key_env.to_string();
        }
    }
    if let Some(api) = cli.api {
        config.provider.api = Some(api);
    }

    let logger = SharedLogger::new(config.log.capacity, config.log.file.as_deref())?;

    // Validate config eagerly
    let base_url = config.effective_base_url()?;
    let _api_key = config.resolve_api_key()?;

    let interceptors = InterceptorChain::from_config(&config.intercept);

    info!("claude-shim v{}", env!("CARGO_PKG_VERSION"));
    info!("  Provider:      {}", config.provider.name);
    info!("  Base URL:      {}", base_url);
    info!("  API:           {}", config.wire_api());
    info!("  Port:          {}", config.port);
    info!("  Models:        {} mapped", config.models.len());
    info!("  Interceptors:  {:?}", interceptors.names());
    if let Some(ref file) = config.log.file {
        info!("  Log file:      {}", file.display());
    }

    logger.info(
        "startup",
        format!(
            "Starting claude-shim provider={} api={} base_url={} port={}",
            config.provider.name,
            config.wire_api(),
            base_url,
            config.port
        ),
    );

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let state = Arc::new(AppState {
        config: config.clone(),
        client,
        logger,
        interceptors: Arc::new(interceptors),
    });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  ANTHROPIC_BASE_URL=http://localhost:{} claude", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
