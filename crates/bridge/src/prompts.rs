//! Prompt templates rendered with Tera
//!
//! Prompts are canned user messages that walk an agent through a workflow
//! built from the tools in [`crate::tools`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tera::{Context, Tera};

use crate::{Error, Result};

const EXTRACT_QUERY_TEMPLATE: &str = r#"From the Grafana dashboard with Dashboard UID = ({{ dashboard_uid }}), extract the Prometheus query used to calculate {{ metric }}.

Use the Prometheus datasource UID: {{ datasource_uid }}.

Task Steps:

Query Extraction
Locate the exact Prometheus query from the dashboard panel for {{ metric }} under the {{ panel_title }} panel.

Variable Resolution
If the query contains any template variables:
- Identify and list them.
- Prompt me to provide concrete values for each unresolved variable.
- Substitute the values into the query.

Time Range Input
- Prompt me to enter a time range (for example: now-1h to now or ISO timestamps). Do not execute the query until the time range is specified.

Query Execution
- Once all variables are resolved and the time range is defined, execute the query against the Prometheus datasource and retrieve the time series data as (timestamp, value) pairs.

Spike Detection
- For each pair of adjacent values, calculate the relative increase as (current - previous) / max(previous, 1e-6).
- Mark a spike when the relative increase is at least 0.5 and the absolute increase is at least 10 points.

Output Requirements:
- Return the final substituted Prometheus query.
- Display the time series data in tabular format.
- If a spike is detected, show the timestamps where it started and peaked, the values before and after it, and the relative and absolute increase."#;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: PromptContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptResult {
    pub description: String,
    pub messages: Vec<PromptMessage>,
}

struct PromptTemplate {
    descriptor: PromptDescriptor,
    /// (argument name, template variable) pairs
    bindings: &'static [(&'static str, &'static str)],
    result_description: &'static str,
}

/// Parsed prompt templates, looked up by name.
pub struct PromptCatalog {
    tera: Tera,
    prompts: Vec<PromptTemplate>,
}

impl PromptCatalog {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template("extract_promql_from_grafana", EXTRACT_QUERY_TEMPLATE)
            .map_err(|e| Error::Template(format!("Failed to parse template: {}", e)))?;

        let prompts = vec![PromptTemplate {
            descriptor: PromptDescriptor {
                name: "extract_promql_from_grafana",
                description: "Extract and execute a Prometheus query from a Grafana dashboard",
                arguments: vec![
                    required("dashboardUID", "UID of the Grafana dashboard"),
                    required("metric", "Name of the Prometheus metric"),
                    required("panelTitle", "Name of the panel"),
                    required("datasourceUID", "UID of the Prometheus datasource"),
                ],
            },
            bindings: &[
                ("dashboardUID", "dashboard_uid"),
                ("metric", "metric"),
                ("panelTitle", "panel_title"),
                ("datasourceUID", "datasource_uid"),
            ],
            result_description: "Ready to execute query extraction",
        }];

        Ok(Self { tera, prompts })
    }

    pub fn list(&self) -> Vec<PromptDescriptor> {
        self.prompts.iter().map(|p| p.descriptor.clone()).collect()
    }

    /// Render prompt `name`. Every required argument must be present and
    /// non-empty.
    pub fn get(&self, name: &str, arguments: &HashMap<String, String>) -> Result<PromptResult> {
        let prompt = self
            .prompts
            .iter()
            .find(|p| p.descriptor.name == name)
            .ok_or_else(|| Error::NotFound(format!("prompt {}", name)))?;

        let mut context = Context::new();
        for (argument, variable) in prompt.bindings {
            let value = arguments.get(*argument).map(String::as_str).unwrap_or_default();
            if value.is_empty() {
                return Err(Error::Validation(format!("argument '{}' is required", argument)));
            }
            context.insert(*variable, value);
        }

        let text = self
            .tera
            .render(name, &context)
            .map_err(|e| Error::Template(format!("Failed to render template: {}", e)))?;

        Ok(PromptResult {
            description: prompt.result_description.to_string(),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: PromptContent {
                    kind: "text".to_string(),
                    text,
                },
            }],
        })
    }
}

fn required(name: &'static str, description: &'static str) -> PromptArgument {
    PromptArgument {
        name,
        description,
        required: true,
    }
}
