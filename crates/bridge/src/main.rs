use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use grafana_bridge::{
    config::{Cli, Config, Transport},
    grafana::{GrafanaClient, PrometheusProxy},
    prompts::PromptCatalog,
    server::Server,
    stdio::StdioServer,
    tools::{Services, ToolRegistry},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout belongs to the stdio transport
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = Config::load(&cli).context("loading configuration")?;
    info!("Loaded configuration: {:?}", config);

    let grafana = GrafanaClient::new(&config.grafana)
        .context("creating Grafana client")?
        .with_timeout(config.query.request_timeout);
    let metrics = Arc::new(PrometheusProxy::new(grafana.clone()));

    let services = Services::new(Arc::new(grafana), metrics)
        .with_default_step(config.query.default_step)
        .with_request_timeout(config.query.request_timeout);
    let registry = Arc::new(ToolRegistry::from_categories(&config.tools.enabled));
    let prompts = Arc::new(PromptCatalog::new()?);
    info!("Registered tools: {}", registry.names().join(", "));

    match config.server.transport {
        Transport::Stdio => {
            info!("Starting stdio transport");
            StdioServer::new(registry, services, prompts).run().await?;
        }
        Transport::Http => {
            info!("Starting server on {}", config.server.addr);
            Server::new(registry, services, prompts)
                .start(&config.server.addr)
                .await?;
        }
    }

    Ok(())
}
