use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::config::TOOL_TRAJECTORY_AVG_SCORE;
use crate::metric::{Metric, MetricEvaluation};
use crate::types::{FunctionCall, Invocation};

/// 1.0 for a turn whose tool calls match the expected ones exactly, in
/// order, by name and arguments; 0.0 otherwise. Call ids are ignored.
pub struct ToolTrajectoryMetric {
	pub threshold: f64,
}

impl ToolTrajectoryMetric {
	pub fn new(threshold: f64) -> Self {
		Self { threshold }
	}
}

#[async_trait]
impl Metric for ToolTrajectoryMetric {
	fn name(&self) -> &'static str {
		TOOL_TRAJECTORY_AVG_SCORE
	}

	fn threshold(&self) -> f64 {
		self.threshold
	}

	async fn evaluate(&self, actual: &[Invocation], expected: &[Invocation]) -> Result<MetricEvaluation> {
		let scores = actual
			.iter()
			.zip(expected)
			.map(|(a, e)| {
				let matched = a.tool_uses().len() == e.tool_uses().len()
					&& a.tool_uses().iter().zip(e.tool_uses()).all(|(x, y)| same_call(x, y));
				Some(if matched { 1.0 } else { 0.0 })
			})
			.collect();
		Ok(MetricEvaluation::from_scores(self.name(), self.threshold, scores))
	}
}

fn same_call(a: &FunctionCall, b: &FunctionCall) -> bool {
	a.name == b.name && normalized_args(&a.args) == normalized_args(&b.args)
}

fn normalized_args(args: &Option<Value>) -> Value {
	match args {
		None | Some(Value::Null) => Value::Object(Default::default()),
		Some(v) => v.clone(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{EvalStatus, IntermediateData};
	use serde_json::json;

	fn with_calls(calls: Vec<FunctionCall>) -> Invocation {
		Invocation {
			intermediate_data: Some(IntermediateData { tool_uses: calls, ..IntermediateData::default() }),
			..Invocation::default()
		}
	}

	#[tokio::test]
	async fn test_ids_are_ignored() {
		let mut expected_call = FunctionCall::new("query_weather", json!({"city_name": "台北"}));
		expected_call.id = Some("adk-123".into());
		let actual_call = FunctionCall::new("query_weather", json!({"city_name": "台北"}));

		let metric = ToolTrajectoryMetric::new(1.0);
		let eval = metric
			.evaluate(&[with_calls(vec![actual_call])], &[with_calls(vec![expected_call])])
			.await
			.unwrap();
		assert_eq!(eval.overall.score, Some(1.0));
		assert_eq!(eval.overall.eval_status, Some(EvalStatus::Passed));
	}

	#[tokio::test]
	async fn test_mismatch_scores_zero_per_turn() {
		let metric = ToolTrajectoryMetric::new(1.0);
		let actual = [
			with_calls(vec![FunctionCall::new("query_weather", json!({"city_name": "高雄"}))]),
			with_calls(vec![]),
		];
		let expected = [
			with_calls(vec![FunctionCall::new("query_weather", json!({"city_name": "台北"}))]),
			Invocation::default(),
		];
		let eval = metric.evaluate(&actual, &expected).await.unwrap();
		let scores: Vec<_> = eval.per_invocation.iter().map(|o| o.score).collect();
		assert_eq!(scores, vec![Some(0.0), Some(1.0)]);
		assert_eq!(eval.overall.score, Some(0.5));
		assert_eq!(eval.overall.eval_status, Some(EvalStatus::Failed));
	}

	#[tokio::test]
	async fn test_missing_and_empty_args_match() {
		let metric = ToolTrajectoryMetric::new(1.0);
		let actual = [with_calls(vec![FunctionCall { id: None, name: Some("noop".into()), args: None }])];
		let expected = [with_calls(vec![FunctionCall::new("noop", json!({}))])];
		let eval = metric.evaluate(&actual, &expected).await.unwrap();
		assert_eq!(eval.overall.score, Some(1.0));
	}
}
