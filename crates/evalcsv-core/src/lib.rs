//! evalcsv-core: run an agent over an eval set and export every metric of
//! every turn as one CSV row.
//!
//! Results come from a [`ResultSource`] (a [`LocalEvaluator`] or saved eval
//! history), are flattened with [`flatten`], and written with [`export_csv`].

pub mod agent;
pub mod config;
pub mod datasource;
pub mod error;
pub mod flatten;
pub mod metric;
pub mod render;
pub mod report;
pub mod runner;
pub mod table;
pub mod telemetry;
pub mod testing;
pub mod types;

pub mod agents {
	pub mod weather;
}

pub mod metrics {
	pub mod response_match;
	pub mod trajectory;
}

pub use agent::{from_async_fn, Agent, AgentRegistry};
pub use agents::weather::{Locale, WeatherAgent};
pub use config::{EvalConfig, MetricSpec};
pub use datasource::{load_eval_set, load_eval_set_result, HistorySource, ResultSource};
pub use error::{Error, RenderError, Result};
pub use flatten::{flatten, Cell, FlatRow, MetricCells, BASE_COLUMNS};
pub use metric::{metrics_from_config, Metric, MetricEvaluation};
pub use metrics::{response_match::ResponseMatchMetric, trajectory::ToolTrajectoryMetric};
pub use render::{content_to_text, tool_calls_to_text};
pub use runner::{LocalEvaluator, LocalEvaluatorBuilder};
pub use table::{export_csv, ExportOutcome, OutputEncoding, Table};
pub use types::{CaseResult, EvalSet, EvalSetResult, EvalStatus, InvocationResult, MetricOutcome, ResultsByEvalId};
