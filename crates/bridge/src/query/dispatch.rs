//! Query dispatch
//!
//! Picks instant or range execution, resolves the time window and hands the
//! query to a [`MetricsBackend`]. Nothing is retried here.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::time::parse_time;
use crate::backend::{MetricsBackend, QueryResult};
use crate::{Error, Result};

/// Step used for range queries when the caller does not give one.
pub const DEFAULT_STEP: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Instant,
    Range,
}

impl QueryMode {
    /// An absent or empty mode means a range query.
    pub fn parse_or_default(mode: Option<&str>) -> Result<Self> {
        match mode.map(str::trim) {
            None | Some("") => Ok(QueryMode::Range),
            Some(other) => other.parse(),
        }
    }
}

impl FromStr for QueryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "instant" => Ok(QueryMode::Instant),
            "range" => Ok(QueryMode::Range),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMode::Instant => f.write_str("instant"),
            QueryMode::Range => f.write_str("range"),
        }
    }
}

/// A resolved point in time or a validated window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSpec {
    Instant {
        at: DateTime<Utc>,
    },
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    },
}

impl TimeSpec {
    pub fn instant(at: DateTime<Utc>) -> Self {
        TimeSpec::Instant { at }
    }

    /// Requires `end > start` and a non-zero step.
    pub fn range(start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> Result<Self> {
        if end <= start {
            return Err(Error::InvalidTimeRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        if step.is_zero() {
            return Err(Error::Validation("range query step must be positive".into()));
        }
        Ok(TimeSpec::Range { start, end, step })
    }

    /// Build a `TimeSpec` from user supplied time expressions.
    ///
    /// Instant queries only look at `from`. Range queries default `to` to
    /// `now` and `step` to `default_step`.
    pub fn resolve(
        mode: QueryMode,
        from: &str,
        to: Option<&str>,
        step: Option<Duration>,
        default_step: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let start = parse_time(from, now)?;
        match mode {
            QueryMode::Instant => Ok(TimeSpec::instant(start)),
            QueryMode::Range => {
                let end = match to.map(str::trim).filter(|t| !t.is_empty()) {
                    Some(to) => parse_time(to, now)?,
                    None => now,
                };
                TimeSpec::range(start, end, step.unwrap_or(default_step))
            }
        }
    }

    pub fn mode(&self) -> QueryMode {
        match self {
            TimeSpec::Instant { .. } => QueryMode::Instant,
            TimeSpec::Range { .. } => QueryMode::Range,
        }
    }
}

/// Caller supplied time window, before parsing.
#[derive(Debug, Clone, Default)]
pub struct TimeWindow {
    pub from: String,
    pub to: Option<String>,
    pub step: Option<Duration>,
}

pub struct Dispatcher<'a> {
    backend: &'a dyn MetricsBackend,
    default_step: Duration,
}

impl<'a> Dispatcher<'a> {
    pub fn new(backend: &'a dyn MetricsBackend) -> Self {
        Self {
            backend,
            default_step: DEFAULT_STEP,
        }
    }

    pub fn with_default_step(mut self, step: Duration) -> Self {
        self.default_step = step;
        self
    }

    /// Validate `mode` and the window, then execute. Invalid modes and
    /// windows fail before the backend is contacted.
    pub async fn dispatch(
        &self,
        expr: &str,
        datasource_uid: &str,
        mode: Option<&str>,
        window: &TimeWindow,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let mode = QueryMode::parse_or_default(mode)?;
        let spec = TimeSpec::resolve(
            mode,
            &window.from,
            window.to.as_deref(),
            window.step.filter(|s| !s.is_zero()),
            self.default_step,
            now,
        )?;
        self.execute(expr, datasource_uid, &spec, cancel).await
    }

    /// Execute an already resolved query. Backend failures are wrapped with
    /// the expression and mode; cancellation is passed through untouched.
    pub async fn execute(
        &self,
        expr: &str,
        datasource_uid: &str,
        spec: &TimeSpec,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        debug!(
            "Dispatching {} query to datasource {}: {}",
            spec.mode(),
            datasource_uid,
            expr
        );

        let result = match *spec {
            TimeSpec::Instant { at } => {
                self.backend
                    .query_instant(datasource_uid, expr, at, cancel)
                    .await
            }
            TimeSpec::Range { start, end, step } => {
                self.backend
                    .query_range(datasource_uid, expr, start, end, step, cancel)
                    .await
            }
        };

        result.map_err(|e| match e {
            Error::Cancelled => Error::Cancelled,
            other => Error::Query {
                mode: spec.mode().to_string(),
                expr: expr.to_string(),
                source: Box::new(other),
            },
        })
    }
}
