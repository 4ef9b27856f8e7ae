//! `partyplan` - serve menu and drink planning over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use partyplan_runtime::{GeminiProvider, Relay, RelayConfig};
use partyplan_server::{router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "partyplan")]
#[command(about = "Relay party planning requests to Gemini with retry and shape checks")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "PARTYPLAN_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// YAML relay configuration (model, retry policy, deadlines)
    #[arg(long, env = "PARTYPLAN_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured model
    #[arg(long, env = "GEMINI_MODEL")]
    model: Option<String>,

    /// Override the configured API root
    #[arg(long)]
    base_url: Option<String>,

    /// Start even when no API key is available; planning requests then fail with 500
    #[arg(long)]
    defer_credential_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,partyplan=debug"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    tracing::debug!(?config, "Relay configuration loaded");

    let state = match GeminiProvider::from_config(&config) {
        Ok(provider) => {
            tracing::info!(
                model = provider.model(),
                endpoint = %provider.endpoint(),
                key_source = %provider.credential_source(),
                "Gemini provider ready"
            );
            AppState::new(Arc::new(Relay::new(Arc::new(provider), config)))
        }
        Err(e) if args.defer_credential_check => {
            tracing::warn!(error = %e, "Starting without credentials; planning requests will fail");
            AppState::unconfigured()
        }
        Err(e) => return Err(e).context("Cannot start without a Gemini API key"),
    };

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    tracing::info!(addr = %args.bind, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shut down");
    Ok(())
}

fn load_config(args: &Args) -> Result<RelayConfig> {
    let mut config = match &args.config {
        Some(path) => RelayConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RelayConfig::default(),
    };

    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    config.validate().context("Invalid relay configuration")?;
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
