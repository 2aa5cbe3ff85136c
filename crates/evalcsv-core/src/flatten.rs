//! Flatten nested eval results into one row per invocation.

use std::fmt;

use crate::error::RenderError;
use crate::render::{content_to_text, tool_calls_to_text};
use crate::types::{EvalStatus, InvocationResult, MetricOutcome, ResultsByEvalId};

/// Columns every row carries, in output order.
pub const BASE_COLUMNS: [&str; 6] = [
    "eval_id",
    "prompt",
    "expected_response",
    "actual_response",
    "expected_tool_calls",
    "actual_tool_calls",
];

/// One invocation result, ready for tabular export.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRow {
    pub eval_id: String,
    pub prompt: String,
    pub expected_response: String,
    pub actual_response: String,
    pub expected_tool_calls: String,
    pub actual_tool_calls: String,
    /// In the order the metrics were reported for this invocation.
    pub metrics: Vec<MetricCells>,
}

/// The three cells one metric contributes to a row.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCells {
    pub name: String,
    pub score: Option<f64>,
    pub status: Option<EvalStatus>,
    pub threshold: f64,
}

impl From<&MetricOutcome> for MetricCells {
    fn from(outcome: &MetricOutcome) -> Self {
        Self {
            name: outcome.metric_name.clone(),
            score: outcome.score,
            status: outcome.eval_status,
            threshold: outcome.threshold,
        }
    }
}

/// A single CSV cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => f.write_str(&format_number(*n)),
            Cell::Empty => Ok(()),
        }
    }
}

/// Shortest round-trip form with a trailing `.0` for integral values, and
/// exponents written with a sign and at least two digits (`1e-05`, `1e+16`),
/// the way pandas writes floats.
fn format_number(n: f64) -> String {
    let debug = format!("{n:?}");
    match debug.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => debug,
    }
}

impl FlatRow {
    pub fn from_invocation(eval_id: &str, result: &InvocationResult) -> Result<Self, RenderError> {
        let expected = &result.expected_invocation;
        let actual = &result.actual_invocation;
        Ok(Self {
            eval_id: eval_id.to_string(),
            prompt: content_to_text(Some(&expected.user_content))?,
            expected_response: content_to_text(expected.final_response.as_ref())?,
            actual_response: content_to_text(actual.final_response.as_ref())?,
            expected_tool_calls: tool_calls_to_text(expected.intermediate_data.as_ref())?,
            actual_tool_calls: tool_calls_to_text(actual.intermediate_data.as_ref())?,
            metrics: result.eval_metric_results.iter().map(MetricCells::from).collect(),
        })
    }

    /// Column name and value pairs, base columns first.
    pub fn cells(&self) -> Vec<(String, Cell)> {
        let base = [
            &self.eval_id,
            &self.prompt,
            &self.expected_response,
            &self.actual_response,
            &self.expected_tool_calls,
            &self.actual_tool_calls,
        ];
        let mut cells: Vec<(String, Cell)> = BASE_COLUMNS
            .iter()
            .zip(base)
            .map(|(name, value)| (name.to_string(), Cell::Text(value.clone())))
            .collect();

        for m in &self.metrics {
            let score = m.score.map(Cell::Number).unwrap_or(Cell::Empty);
            cells.push((format!("{}_score", m.name), score));
            let status = m.status.map(|s| Cell::Text(s.to_string())).unwrap_or(Cell::Empty);
            cells.push((format!("{}_status", m.name), status));
            cells.push((format!("{}_threshold", m.name), Cell::Number(m.threshold)));
        }
        cells
    }
}

/// Walk eval ids, then case results, then invocation results, producing
/// exactly one row per invocation result.
pub fn flatten(results: &ResultsByEvalId) -> Result<Vec<FlatRow>, RenderError> {
    let mut rows = Vec::with_capacity(results.invocation_count());
    for (eval_id, case_results) in results.iter() {
        for case_result in case_results {
            for invocation in &case_result.eval_metric_result_per_invocation {
                rows.push(FlatRow::from_invocation(eval_id, invocation)?);
            }
        }
    }
    Ok(rows)
}
