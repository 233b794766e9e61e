//! Agent Tools Module
//!
//! Tools an agent can call to read dashboards and query Prometheus
//! datasources. Every tool is registered in a [`ToolRegistry`] built from
//! the enabled [`ToolCategory`] list.

pub mod dashboard;
pub mod prometheus;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::gen::SchemaGenerator;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::MetricsBackend;
use crate::dashboard::DashboardStore;
use crate::metrics::{TOOL_CALLS_TOTAL, TOOL_DURATION_SECONDS};
use crate::query::DEFAULT_STEP;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Prometheus,
    Dashboard,
}

impl std::str::FromStr for ToolCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "prometheus" => Ok(ToolCategory::Prometheus),
            "dashboard" => Ok(ToolCategory::Dashboard),
            other => Err(Error::Config(format!(
                "Unknown tool category: {}. Must be 'prometheus' or 'dashboard'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolCategory::Prometheus => write!(f, "prometheus"),
            ToolCategory::Dashboard => write!(f, "dashboard"),
        }
    }
}

/// Result from tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: None,
        }
    }

    pub fn failure(error: impl Into<String>, metadata: Option<Value>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            metadata,
        }
    }

    /// Text form handed to agents: the output JSON, or the error message.
    pub fn text(&self) -> String {
        match &self.error {
            Some(error) if !self.success => error.clone(),
            _ => match &self.output {
                Value::String(s) => s.clone(),
                other => serde_json::to_string_pretty(other).unwrap_or_default(),
            },
        }
    }
}

/// What a client sees when listing tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub annotations: ToolAnnotations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    pub title: String,
    pub read_only_hint: bool,
}

/// Long-lived handles shared by every invocation.
#[derive(Clone)]
pub struct Services {
    pub dashboards: Arc<dyn DashboardStore>,
    pub metrics: Arc<dyn MetricsBackend>,
    pub default_step: Duration,
    pub request_timeout: Duration,
}

impl Services {
    pub fn new(dashboards: Arc<dyn DashboardStore>, metrics: Arc<dyn MetricsBackend>) -> Self {
        Self {
            dashboards,
            metrics,
            default_step: DEFAULT_STEP,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_default_step(mut self, step: Duration) -> Self {
        self.default_step = step;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Context for one invocation, stamped with the current time.
    pub fn context(&self, cancel: CancellationToken) -> ToolContext {
        ToolContext {
            dashboards: self.dashboards.clone(),
            metrics: self.metrics.clone(),
            default_step: self.default_step,
            now: Utc::now(),
            cancel,
        }
    }
}

/// Per-invocation state. `now` is fixed for the whole call so relative
/// times inside one request agree with each other.
pub struct ToolContext {
    pub dashboards: Arc<dyn DashboardStore>,
    pub metrics: Arc<dyn MetricsBackend>,
    pub default_step: Duration,
    pub now: DateTime<Utc>,
    pub cancel: CancellationToken,
}

/// Common trait for all agent tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Name, description and argument schema for clients
    fn descriptor(&self) -> ToolDescriptor;

    /// Execute the tool with JSON arguments
    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<Value>;
}

/// A tool with typed arguments. Implementors get [`Tool`] for free, with the
/// input schema generated from `Args`.
#[async_trait]
pub trait TypedTool: Send + Sync + 'static {
    const NAME: &'static str;
    const TITLE: &'static str;
    const DESCRIPTION: &'static str;
    const READ_ONLY: bool = true;

    type Args: DeserializeOwned + JsonSchema + Send;
    type Output: Serialize + Send;

    async fn call(&self, ctx: &ToolContext, args: Self::Args) -> Result<Self::Output>;
}

#[async_trait]
impl<T: TypedTool> Tool for T {
    fn name(&self) -> &str {
        T::NAME
    }

    fn descriptor(&self) -> ToolDescriptor {
        let schema = SchemaGenerator::default().into_root_schema_for::<T::Args>();
        ToolDescriptor {
            name: T::NAME.to_string(),
            description: T::DESCRIPTION.to_string(),
            input_schema: serde_json::to_value(schema).unwrap_or_else(|_| json!({"type": "object"})),
            annotations: ToolAnnotations {
                title: T::TITLE.to_string(),
                read_only_hint: T::READ_ONLY,
            },
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<Value> {
        // Clients may omit arguments entirely
        let input = if input.is_null() { json!({}) } else { input };
        let args: T::Args = serde_json::from_value(input)
            .map_err(|e| Error::Validation(format!("invalid arguments for {}: {}", T::NAME, e)))?;
        let output = self.call(ctx, args).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Name-keyed table of enabled tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every tool in `categories`.
    pub fn from_categories(categories: &[ToolCategory]) -> Self {
        let mut registry = Self::new();
        for category in categories {
            match category {
                ToolCategory::Prometheus => prometheus::register(&mut registry),
                ToolCategory::Dashboard => dashboard::register(&mut registry),
            }
            info!("Enabled {} tools", category);
        }
        registry
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    /// Run `name` with a fresh cancellation token bounded by the request
    /// timeout. Dropping the returned future cancels in-flight work.
    pub async fn invoke(&self, services: &Services, name: &str, input: Value) -> Result<ToolResult> {
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        let ctx = services.context(cancel.clone());

        match tokio::time::timeout(services.request_timeout, self.call(name, &ctx, input)).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                warn!("Tool {} timed out after {:?}", name, services.request_timeout);
                TOOL_CALLS_TOTAL.with_label_values(&[name, "timeout"]).inc();
                Ok(ToolResult::failure(
                    format!("{} timed out after {:?}: {}", name, services.request_timeout, Error::Cancelled),
                    None,
                ))
            }
        }
    }

    /// Run `name` under an existing context.
    ///
    /// Unknown tools and undecodable arguments are errors; anything the
    /// tool itself reports becomes an unsuccessful [`ToolResult`].
    pub async fn call(&self, name: &str, ctx: &ToolContext, input: Value) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("tool {}", name)))?;

        debug!("Calling tool {} with {}", name, input);
        let started = Instant::now();
        let outcome = tool.execute(ctx, input).await;
        TOOL_DURATION_SECONDS
            .with_label_values(&[name])
            .observe(started.elapsed().as_secs_f64());

        let (label, result) = match outcome {
            Ok(output) => ("success", Ok(ToolResult::ok(output))),
            Err(Error::Validation(msg)) => ("invalid", Err(Error::Validation(msg))),
            Err(Error::UnresolvedVariables(missing)) => {
                let message = Error::UnresolvedVariables(missing.clone()).to_string();
                ("unresolved", Ok(ToolResult::failure(message, Some(json!({ "missing": missing })))))
            }
            Err(Error::Cancelled) => ("cancelled", Ok(ToolResult::failure(Error::Cancelled.to_string(), None))),
            Err(e) => {
                warn!("Tool {} failed: {}", name, e);
                ("error", Ok(ToolResult::failure(e.to_string(), None)))
            }
        };
        TOOL_CALLS_TOTAL.with_label_values(&[name, label]).inc();
        result
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{context, Stall};
    use super::*;
    use crate::backend::MockMetricsBackend;
    use crate::dashboard::MockDashboardStore;

    struct Echo;

    #[derive(Deserialize, JsonSchema)]
    struct EchoArgs {
        /// Text to echo back
        text: String,
    }

    #[async_trait]
    impl TypedTool for Echo {
        const NAME: &'static str = "echo";
        const TITLE: &'static str = "Echo";
        const DESCRIPTION: &'static str = "Echo the input";
        type Args = EchoArgs;
        type Output = String;

        async fn call(&self, _ctx: &ToolContext, args: EchoArgs) -> Result<String> {
            match args.text.as_str() {
                "missing" => Err(Error::UnresolvedVariables(vec!["$job".into()])),
                "boom" => Err(Error::Backend("boom".into())),
                _ => Ok(args.text),
            }
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        registry
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("Prometheus".parse::<ToolCategory>().unwrap(), ToolCategory::Prometheus);
        assert_eq!(" dashboard ".parse::<ToolCategory>().unwrap(), ToolCategory::Dashboard);
        assert!(matches!("loki".parse::<ToolCategory>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_categories() {
        let registry = ToolRegistry::from_categories(&[ToolCategory::Dashboard]);
        assert!(registry.get("get_dashboard_panel_queries").is_some());
        assert!(registry.get("query_prometheus").is_none());

        let all = ToolRegistry::from_categories(&[ToolCategory::Prometheus, ToolCategory::Dashboard]);
        assert_eq!(all.names().len(), 8);
    }

    #[test]
    fn test_descriptor_schema() {
        let descriptor = registry().descriptors().remove(0);
        assert_eq!(descriptor.name, "echo");
        assert!(descriptor.annotations.read_only_hint);
        assert_eq!(descriptor.input_schema["properties"]["text"]["type"], "string");
    }

    fn stall_registry(stall: &Stall) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(stall.clone());
        registry
    }

    fn services(timeout: Duration) -> Services {
        Services::new(Arc::new(MockDashboardStore::new()), Arc::new(MockMetricsBackend::new()))
            .with_request_timeout(timeout)
    }

    #[tokio::test]
    async fn test_invoke_timeout_cancels() {
        let stall = Stall::default();
        let registry = stall_registry(&stall);
        let timeouts = || TOOL_CALLS_TOTAL.with_label_values(&["stall", "timeout"]).get();
        let before = timeouts();

        let result = registry
            .invoke(&services(Duration::from_millis(20)), "stall", Value::Null)
            .await
            .unwrap();
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("operation cancelled"), "{}", error);
        assert!(error.contains("20ms"), "{}", error);
        assert!(timeouts() > before);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(stall.was_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_invoke_cancels() {
        let stall = Stall::default();
        let registry = stall_registry(&stall);
        let services = services(Duration::from_secs(30));

        let outer = tokio::time::timeout(
            Duration::from_millis(20),
            registry.invoke(&services, "stall", Value::Null),
        )
        .await;
        assert!(outer.is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(stall.was_cancelled());
    }

    #[tokio::test]
    async fn test_call_outcomes() {
        let ctx = context(MockDashboardStore::new(), MockMetricsBackend::new());
        let registry = registry();

        let ok = registry.call("echo", &ctx, json!({"text": "hi"})).await.unwrap();
        assert_eq!(ok, ToolResult::ok(json!("hi")));
        assert_eq!(ok.text(), "hi");

        let missing = registry.call("echo", &ctx, json!({"text": "missing"})).await.unwrap();
        assert!(!missing.success);
        assert_eq!(missing.metadata, Some(json!({"missing": ["$job"]})));

        let failed = registry.call("echo", &ctx, json!({"text": "boom"})).await.unwrap();
        assert_eq!(failed.error.as_deref(), Some("Backend error: boom"));

        assert!(matches!(
            registry.call("echo", &ctx, json!({"txt": 1})).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            registry.call("nope", &ctx, Value::Null).await,
            Err(Error::NotFound(_))
        ));
    }
}
