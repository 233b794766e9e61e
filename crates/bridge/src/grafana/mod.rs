//! Grafana HTTP client
//!
//! Reads and saves dashboards through the Grafana HTTP API and, via
//! [`prometheus`], reaches Prometheus datasources through Grafana's
//! datasource proxy.

pub mod prometheus;

pub use self::prometheus::PrometheusProxy;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::backend::cancellable;
use crate::config::GrafanaConfig;
use crate::dashboard::{DashboardStore, DashboardWithMeta, SaveDashboard, SavedDashboardRef};
use crate::{Error, Result};

#[derive(Clone)]
pub struct GrafanaClient {
    base: Url,
    client: Client,
    api_key: Option<String>,
    timeout: Duration,
    debug: bool,
}

impl GrafanaClient {
    pub fn new(config: &GrafanaConfig) -> Result<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("invalid Grafana URL {:?}: {}", config.url, e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("Grafana URL {:?} cannot be a base URL", config.url)));
        }
        Ok(Self {
            base,
            client: Client::new(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(30),
            debug: config.debug,
        })
    }

    /// Set per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URL with `segments` appended, each percent-encoded.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        if self.debug {
            info!("Grafana request: {} {}", method, url);
        } else {
            debug!("Grafana request: {} {}", method, url);
        }

        let mut request = self.client.request(method, url).timeout(self.timeout);

        // Add auth header if token is provided
        if let Some(token) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        request
    }

    /// Send `request` and decode a JSON body, mapping 404 to `NotFound`.
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(Error::Backend(format!("{} failed ({}): {}", what, status, error_text)));
        }

        Ok(response.json().await?)
    }

    /// Fails with `NotFound` if Grafana has no datasource `uid`.
    pub async fn ensure_datasource(&self, uid: &str) -> Result<()> {
        let url = self.endpoint(&["api", "datasources", "uid", uid]);
        let _: serde_json::Value = self
            .send_json(self.request(Method::GET, url), &format!("datasource {}", uid))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DashboardStore for GrafanaClient {
    async fn get_by_uid(&self, uid: &str, cancel: &CancellationToken) -> Result<DashboardWithMeta> {
        let url = self.endpoint(&["api", "dashboards", "uid", uid]);
        cancellable(
            cancel,
            self.send_json(self.request(Method::GET, url), &format!("dashboard {}", uid)),
        )
        .await
    }

    async fn save(&self, request: &SaveDashboard, cancel: &CancellationToken) -> Result<SavedDashboardRef> {
        let url = self.endpoint(&["api", "dashboards", "db"]);
        let req = self.request(Method::POST, url).json(request);
        cancellable(cancel, self.send_json(req, "save dashboard")).await
    }
}
