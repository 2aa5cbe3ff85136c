//! Console narration of results. Nothing here changes the exported rows.

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::flatten::FlatRow;
use crate::types::{CaseResult, EvalStatus, ResultsByEvalId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
	pub case_runs: usize,
	pub passed: usize,
	pub failed: usize,
	pub not_evaluated: usize,
	pub pass_rate: f64,
}

impl RunSummary {
	pub fn from_results(results: &ResultsByEvalId) -> Self {
		let mut summary = RunSummary {
			case_runs: 0,
			passed: 0,
			failed: 0,
			not_evaluated: 0,
			pass_rate: 0.0,
		};
		for cr in results.case_results() {
			summary.case_runs += 1;
			match cr.final_eval_status {
				EvalStatus::Passed => summary.passed += 1,
				EvalStatus::Failed => summary.failed += 1,
				EvalStatus::NotEvaluated => summary.not_evaluated += 1,
			}
		}
		if summary.case_runs > 0 {
			summary.pass_rate = summary.passed as f64 / summary.case_runs as f64;
		}
		summary
	}
}

#[derive(Debug, Clone, Tabled)]
struct SummaryRow {
	eval_id: String,
	session: String,
	status: String,
	metrics: String,
}

impl From<&CaseResult> for SummaryRow {
	fn from(cr: &CaseResult) -> Self {
		let metrics = cr
			.overall_eval_metric_results
			.iter()
			.map(|m| {
				let score = m.score.map(|s| format!("{s:.3}")).unwrap_or_else(|| "-".to_string());
				let status = m.eval_status.map(|s| s.as_str()).unwrap_or("-");
				format!("{}: {} ({})", m.metric_name, score, status)
			})
			.collect::<Vec<_>>()
			.join("\n");
		SummaryRow {
			eval_id: truncate(cr.eval_id.clone(), 40),
			session: cr.session_id.clone(),
			status: status_icon(cr.final_eval_status).to_string(),
			metrics,
		}
	}
}

/// One line per case run plus a totals line.
pub fn summary_table(results: &ResultsByEvalId) -> String {
	let rows: Vec<SummaryRow> = results.case_results().map(SummaryRow::from).collect();
	let summary = RunSummary::from_results(results);

	let summary_text = format!(
		"Case runs: {}  Passed: {}  Failed: {}  Not evaluated: {}  Pass rate: {:.1}%",
		summary.case_runs,
		summary.passed,
		summary.failed,
		summary.not_evaluated,
		summary.pass_rate * 100.0
	);

	format!("{}\n\n{}\n", Table::new(rows), summary_text)
}

/// Prompt, expected and actual response of one row.
pub fn detailed_result(row: &FlatRow) -> String {
	format!(
		"\n--- Eval ID: {} ---\nPrompt:\n{}\nExpected:\n{}\nActual:\n{}\n",
		row.eval_id, row.prompt, row.expected_response, row.actual_response
	)
}

fn status_icon(status: EvalStatus) -> &'static str {
	match status {
		EvalStatus::Passed => "✓ PASSED",
		EvalStatus::Failed => "✗ FAILED",
		EvalStatus::NotEvaluated => "- NOT_EVALUATED",
	}
}

fn truncate(s: String, max_len: usize) -> String {
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}
