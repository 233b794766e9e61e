//! Telemetry query resolution
//!
//! Time expressions, template variables, label selectors, query dispatch and
//! listing helpers shared by the Prometheus tools.

pub mod dispatch;
pub mod listing;
pub mod selector;
pub mod time;
pub mod variables;

pub use dispatch::{Dispatcher, QueryMode, TimeSpec, TimeWindow, DEFAULT_STEP};
pub use listing::{filter_and_page, Page, LABEL_LIMIT, METRIC_NAME_LIMIT};
pub use selector::{LabelMatcher, MatchOp, Selector};
pub use time::parse_time;
pub use variables::{resolve, substitute, variable_names, variable_tokens, Substitution};
