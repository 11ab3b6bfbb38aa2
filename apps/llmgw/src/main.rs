use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use llmgw_core::upstream_client::{UpstreamClientConfig, WreqUpstreamClient};
use llmgw_core::Dispatcher;
use llmgw_directory::{EndpointResolver, RedisEndpointResolver, StaticEndpointResolver};
use llmgw_router::{GatewayState, gateway_router};

mod cli;
mod config;

/// Hard bound on draining, whatever the per-server grace says.
const MAX_SHUTDOWN_GRACE: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log)),
        )
        .init();

    let config = config::load(&args.config)?;

    let resolver: Arc<dyn EndpointResolver> = match &args.redis_url {
        Some(url) => {
            info!(url = %url, "using redis routing directory");
            Arc::new(RedisEndpointResolver::connect(url).await?)
        }
        None => {
            info!(config = %args.config.display(), "using static routing directory");
            Arc::new(StaticEndpointResolver::new(config.routes.clone()))
        }
    };

    let client = WreqUpstreamClient::new(UpstreamClientConfig::default())?;
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(client)));

    let app = gateway_router(GatewayState {
        resolver,
        dispatcher,
    });

    let listen = args.listen.unwrap_or(config.server.listen);
    let grace =
        Duration::from_secs(config.server.shutdown_grace_secs).min(MAX_SHUTDOWN_GRACE);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!(listen = %listen, "gateway listening");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received, draining in-flight streams");
        signal_token.cancel();
    });

    let drain_token = shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { drain_token.cancelled().await });

    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_secs = grace.as_secs(), "drain grace elapsed, forcing exit");
        }
    }

    Ok(())
}
