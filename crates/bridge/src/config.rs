use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::tools::ToolCategory;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Transport {
    #[serde(rename = "stdio")]
    Stdio,
    #[serde(rename = "http")]
    Http,
}

impl Default for Transport {
    fn default() -> Self {
        Transport::Http
    }
}

impl std::str::FromStr for Transport {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" => Ok(Transport::Http),
            other => Err(crate::Error::Config(format!(
                "Invalid transport type: {}. Must be 'stdio' or 'http'",
                other
            ))),
        }
    }
}

/// Command line flags. Anything set here wins over the environment.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "grafana-bridge", about = "Agent tools for Grafana dashboards and Prometheus datasources")]
pub struct Cli {
    /// Transport type (stdio or http)
    #[arg(short = 't', long)]
    pub transport: Option<String>,

    /// Host and port for the http transport
    #[arg(long)]
    pub address: Option<String>,

    /// Comma separated list of tool categories to enable
    #[arg(long)]
    pub enabled_tools: Option<String>,

    /// Disable prometheus tools
    #[arg(long)]
    pub disable_prometheus: bool,

    /// Disable dashboard tools
    #[arg(long)]
    pub disable_dashboard: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log outgoing Grafana requests
    #[arg(long)]
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub grafana: GrafanaConfig,
    pub tools: ToolsConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
    #[serde(default)]
    pub transport: Transport,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GrafanaConfig {
    pub url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub debug: bool,
}

impl std::fmt::Debug for GrafanaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrafanaConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("debug", &self.debug)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub enabled: Vec<ToolCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Range query step when the caller gives none.
    pub default_step: Duration,
    /// Upper bound on a single tool invocation.
    pub request_timeout: Duration,
}

impl Config {
    pub fn load(cli: &Cli) -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();
        Self::from_lookup(cli, |key| std::env::var(key).ok())
    }

    /// Build a config from `lookup` (normally the process environment)
    /// with `cli` taking precedence.
    pub fn from_lookup<F>(cli: &Cli, lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let transport = match cli.transport.clone().or_else(|| lookup("TRANSPORT")) {
            Some(t) => t.parse()?,
            None => defaults.server.transport,
        };

        let enabled_list = cli
            .enabled_tools
            .clone()
            .or_else(|| lookup("ENABLED_TOOLS"))
            .unwrap_or_else(|| "prometheus,dashboard".to_string());
        let mut enabled = Vec::new();
        for name in enabled_list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let category: ToolCategory = name.parse()?;
            let disabled = match category {
                ToolCategory::Prometheus => cli.disable_prometheus,
                ToolCategory::Dashboard => cli.disable_dashboard,
            };
            if disabled {
                tracing::info!("Disabling tools in category {}", category);
            } else if !enabled.contains(&category) {
                enabled.push(category);
            }
        }

        let config = Config {
            server: ServerConfig {
                addr: cli
                    .address
                    .clone()
                    .or_else(|| lookup("SERVER_ADDR"))
                    .unwrap_or(defaults.server.addr),
                transport,
            },
            grafana: GrafanaConfig {
                url: lookup("GRAFANA_URL")
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.grafana.url),
                api_key: lookup("GRAFANA_API_KEY").filter(|k| !k.is_empty()),
                debug: cli.debug,
            },
            tools: ToolsConfig { enabled },
            query: QueryConfig {
                default_step: seconds(&lookup, "DEFAULT_STEP_SECS")?.unwrap_or(defaults.query.default_step),
                request_timeout: seconds(&lookup, "REQUEST_TIMEOUT_SECS")?
                    .unwrap_or(defaults.query.request_timeout),
            },
        };

        if config.grafana.api_key.is_none() {
            tracing::warn!("GRAFANA_API_KEY is not set. Requests to Grafana will be anonymous.");
        }

        url::Url::parse(&config.grafana.url)
            .map_err(|e| crate::Error::Config(format!("GRAFANA_URL {:?} is not a valid URL: {}", config.grafana.url, e)))?;

        Ok(config)
    }
}

fn seconds<F>(lookup: &F, key: &str) -> crate::Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) | Err(_) => Err(crate::Error::Config(format!(
                "{} must be a positive number of seconds, got {:?}",
                key, raw
            ))),
            Ok(secs) => Ok(Some(Duration::from_secs(secs))),
        },
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                addr: "localhost:8005".to_string(),
                transport: Transport::Http,
            },
            grafana: GrafanaConfig {
                url: "http://localhost:3000".to_string(),
                api_key: None,
                debug: false,
            },
            tools: ToolsConfig {
                enabled: vec![ToolCategory::Prometheus, ToolCategory::Dashboard],
            },
            query: QueryConfig {
                default_step: crate::query::DEFAULT_STEP,
                request_timeout: Duration::from_secs(30),
            },
        }
    }
}
