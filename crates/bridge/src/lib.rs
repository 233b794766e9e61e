pub mod backend;
pub mod config;
pub mod dashboard;
pub mod grafana;
pub mod metrics;
pub mod prompts;
pub mod query;
pub mod server;
pub mod stdio;
pub mod tools;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid time format: {input:?} ({reason})")]
    Parse { input: String, reason: String },
    #[error(
        "unresolved variables in query: {}; please prompt the user to provide values for them",
        .0.join(", ")
    )]
    UnresolvedVariables(Vec<String>),
    #[error("malformed dashboard: {0}")]
    MalformedDashboard(String),
    #[error("invalid query type: {0:?} (expected \"instant\" or \"range\")")]
    InvalidMode(String),
    #[error("invalid time range: end {end} is not after start {start}")]
    InvalidTimeRange { start: String, end: String },
    #[error("invalid matcher type: {0:?}")]
    InvalidMatcher(String),
    #[error("compiling regex {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("querying Prometheus {mode} for {expr:?}: {source}")]
    Query {
        mode: String,
        expr: String,
        #[source]
        source: Box<Error>,
    },
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Template error: {0}")]
    Template(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
