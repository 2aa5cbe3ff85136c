//! Eval set and eval result data model.
//!
//! The JSON layout matches the eval set / eval history files written by
//! agent evaluation frameworks, so datasets and saved results can be read
//! as-is. Unknown fields are ignored.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message content made of ordered parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	#[serde(default)]
	pub parts: Vec<Part>,
}

impl Content {
	pub fn new(role: impl Into<String>, parts: Vec<Part>) -> Self {
		Self { role: Some(role.into()), parts }
	}

	pub fn user_text(text: impl Into<String>) -> Self {
		Self::new("user", vec![Part::text(text)])
	}

	pub fn model_text(text: impl Into<String>) -> Self {
		Self::new("model", vec![Part::text(text)])
	}
}

/// One piece of content. A part holds exactly one payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub function_call: Option<FunctionCall>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub function_response: Option<FunctionResponse>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub inline_data: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub thought: Option<bool>,
}

impl Part {
	pub fn text(text: impl Into<String>) -> Self {
		Self { text: Some(text.into()), ..Self::default() }
	}

	/// Number of payload fields set on this part.
	pub fn payload_count(&self) -> usize {
		[
			self.text.is_some(),
			self.function_call.is_some(),
			self.function_response.is_some(),
			self.inline_data.is_some(),
		]
		.into_iter()
		.filter(|set| *set)
		.count()
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub args: Option<Value>,
}

impl FunctionCall {
	pub fn new(name: impl Into<String>, args: Value) -> Self {
		Self { id: None, name: Some(name.into()), args: Some(args) }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default)]
	pub response: Value,
}

/// Tool traffic and sub-agent replies recorded between the user prompt and
/// the final response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntermediateData {
	#[serde(default)]
	pub tool_uses: Vec<FunctionCall>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tool_responses: Vec<FunctionResponse>,
	/// (author, parts) pairs.
	#[serde(default)]
	pub intermediate_responses: Vec<(String, Vec<Part>)>,
}

/// One conversation turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
	#[serde(default)]
	pub invocation_id: String,
	pub user_content: Content,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub final_response: Option<Content>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub intermediate_data: Option<IntermediateData>,
	#[serde(default)]
	pub creation_timestamp: f64,
}

impl Invocation {
	pub fn tool_uses(&self) -> &[FunctionCall] {
		self.intermediate_data
			.as_ref()
			.map(|d| d.tool_uses.as_slice())
			.unwrap_or_default()
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInput {
	pub app_name: String,
	pub user_id: String,
	#[serde(default)]
	pub state: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
	pub eval_id: String,
	#[serde(default)]
	pub conversation: Vec<Invocation>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_input: Option<SessionInput>,
	#[serde(default)]
	pub creation_timestamp: f64,
}

/// A named collection of evaluation cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSet {
	pub eval_set_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default)]
	pub eval_cases: Vec<EvalCase>,
	#[serde(default)]
	pub creation_timestamp: f64,
}

/// Outcome of comparing a score against its threshold.
///
/// Serialized as the integer code used by eval history files
/// (1 passed, 2 failed, 3 not evaluated); names are accepted on input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "StatusRepr", into = "u8")]
pub enum EvalStatus {
	Passed,
	Failed,
	#[default]
	NotEvaluated,
}

impl EvalStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			EvalStatus::Passed => "PASSED",
			EvalStatus::Failed => "FAILED",
			EvalStatus::NotEvaluated => "NOT_EVALUATED",
		}
	}

	/// Status for an optional score measured against `threshold`.
	pub fn from_score(score: Option<f64>, threshold: f64) -> Self {
		match score {
			Some(s) if s >= threshold => EvalStatus::Passed,
			Some(_) => EvalStatus::Failed,
			None => EvalStatus::NotEvaluated,
		}
	}
}

impl fmt::Display for EvalStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusRepr {
	Code(u8),
	Name(String),
}

impl TryFrom<StatusRepr> for EvalStatus {
	type Error = String;

	fn try_from(repr: StatusRepr) -> Result<Self, Self::Error> {
		match repr {
			StatusRepr::Code(1) => Ok(EvalStatus::Passed),
			StatusRepr::Code(2) => Ok(EvalStatus::Failed),
			StatusRepr::Code(3) => Ok(EvalStatus::NotEvaluated),
			StatusRepr::Code(other) => Err(format!("unknown eval status code {other}")),
			StatusRepr::Name(name) => {
				let bare = name.rsplit('.').next().unwrap_or(&name).to_ascii_uppercase();
				match bare.as_str() {
					"PASSED" => Ok(EvalStatus::Passed),
					"FAILED" => Ok(EvalStatus::Failed),
					"NOT_EVALUATED" => Ok(EvalStatus::NotEvaluated),
					_ => Err(format!("unknown eval status {name:?}")),
				}
			}
		}
	}
}

impl From<EvalStatus> for u8 {
	fn from(status: EvalStatus) -> u8 {
		match status {
			EvalStatus::Passed => 1,
			EvalStatus::Failed => 2,
			EvalStatus::NotEvaluated => 3,
		}
	}
}

/// One named metric measured on one invocation or on a whole case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricOutcome {
	pub metric_name: String,
	pub threshold: f64,
	#[serde(default)]
	pub score: Option<f64>,
	/// Unset in history files that never recorded a status.
	#[serde(default)]
	pub eval_status: Option<EvalStatus>,
}

/// Expected vs. actual invocation and the metrics computed on the pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
	pub actual_invocation: Invocation,
	pub expected_invocation: Invocation,
	#[serde(default)]
	pub eval_metric_results: Vec<MetricOutcome>,
}

/// One run of one eval case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
	#[serde(default)]
	pub eval_set_id: String,
	pub eval_id: String,
	#[serde(default)]
	pub final_eval_status: EvalStatus,
	#[serde(default)]
	pub overall_eval_metric_results: Vec<MetricOutcome>,
	#[serde(default)]
	pub eval_metric_result_per_invocation: Vec<InvocationResult>,
	#[serde(default)]
	pub session_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
}

/// Saved results of evaluating one eval set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSetResult {
	pub eval_set_result_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub eval_set_result_name: Option<String>,
	#[serde(default)]
	pub eval_set_id: String,
	#[serde(default)]
	pub eval_case_results: Vec<CaseResult>,
	#[serde(default)]
	pub creation_timestamp: f64,
}

/// Case results grouped by eval id, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsByEvalId {
	entries: Vec<(String, Vec<CaseResult>)>,
}

impl ResultsByEvalId {
	pub fn new() -> Self {
		Self::default()
	}

	/// Append `results` under `eval_id`. A new id goes to the end; a known
	/// id keeps its position and its results are extended.
	pub fn insert(&mut self, eval_id: impl Into<String>, results: Vec<CaseResult>) {
		let eval_id = eval_id.into();
		match self.entries.iter_mut().find(|(id, _)| *id == eval_id) {
			Some((_, existing)) => existing.extend(results),
			None => self.entries.push((eval_id, results)),
		}
	}

	/// Group a single case result under its own `eval_id`.
	pub fn push(&mut self, result: CaseResult) {
		let eval_id = result.eval_id.clone();
		self.insert(eval_id, vec![result]);
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &[CaseResult])> {
		self.entries.iter().map(|(id, results)| (id.as_str(), results.as_slice()))
	}

	pub fn case_results(&self) -> impl Iterator<Item = &CaseResult> {
		self.entries.iter().flat_map(|(_, results)| results.iter())
	}

	/// Number of eval ids.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Total invocation results across every case result.
	pub fn invocation_count(&self) -> usize {
		self.case_results()
			.map(|cr| cr.eval_metric_result_per_invocation.len())
			.sum()
	}

	/// Flatten back into a saveable eval set result.
	pub fn to_eval_set_result(&self, eval_set_result_id: impl Into<String>, eval_set_id: impl Into<String>) -> EvalSetResult {
		EvalSetResult {
			eval_set_result_id: eval_set_result_id.into(),
			eval_set_result_name: None,
			eval_set_id: eval_set_id.into(),
			eval_case_results: self.case_results().cloned().collect(),
			creation_timestamp: 0.0,
		}
	}
}

impl FromIterator<CaseResult> for ResultsByEvalId {
	fn from_iter<I: IntoIterator<Item = CaseResult>>(iter: I) -> Self {
		let mut grouped = Self::new();
		for result in iter {
			grouped.push(result);
		}
		grouped
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn case(eval_id: &str, session: &str) -> CaseResult {
		CaseResult {
			eval_set_id: "set".into(),
			eval_id: eval_id.into(),
			final_eval_status: EvalStatus::Passed,
			overall_eval_metric_results: Vec::new(),
			eval_metric_result_per_invocation: Vec::new(),
			session_id: session.into(),
			user_id: None,
		}
	}

	#[test]
	fn test_status_accepts_codes_and_names() {
		let parsed: Vec<EvalStatus> =
			serde_json::from_value(json!([1, 2, 3, "PASSED", "EvalStatus.FAILED", "not_evaluated"])).unwrap();
		assert_eq!(
			parsed,
			vec![
				EvalStatus::Passed,
				EvalStatus::Failed,
				EvalStatus::NotEvaluated,
				EvalStatus::Passed,
				EvalStatus::Failed,
				EvalStatus::NotEvaluated,
			]
		);
		assert!(serde_json::from_value::<EvalStatus>(json!(7)).is_err());
		assert_eq!(serde_json::to_value(EvalStatus::Failed).unwrap(), json!(2));
	}

	#[test]
	fn test_metric_outcome_status_may_be_unset() {
		let outcomes: Vec<MetricOutcome> = serde_json::from_value(json!([
			{"metric_name": "m", "threshold": 0.8, "score": 0.9},
			{"metric_name": "m", "threshold": 0.8, "score": 0.9, "eval_status": null},
			{"metric_name": "m", "threshold": 0.8, "eval_status": 1}
		]))
		.unwrap();
		let statuses: Vec<_> = outcomes.iter().map(|o| o.eval_status).collect();
		assert_eq!(statuses, vec![None, None, Some(EvalStatus::Passed)]);
	}

	#[test]
	fn test_status_from_score() {
		assert_eq!(EvalStatus::from_score(Some(0.8), 0.8), EvalStatus::Passed);
		assert_eq!(EvalStatus::from_score(Some(0.5), 0.8), EvalStatus::Failed);
		assert_eq!(EvalStatus::from_score(None, 0.8), EvalStatus::NotEvaluated);
		assert_eq!(EvalStatus::Failed.to_string(), "FAILED");
	}

	#[test]
	fn test_part_payload_count() {
		let mut part = Part::text("hi");
		assert_eq!(part.payload_count(), 1);
		part.function_call = Some(FunctionCall::new("f", json!({})));
		assert_eq!(part.payload_count(), 2);
		assert_eq!(Part::default().payload_count(), 0);
	}

	#[test]
	fn test_eval_set_parses_framework_layout() {
		let raw = json!({
			"eval_set_id": "weather",
			"eval_cases": [{
				"eval_id": "case_1",
				"conversation": [{
					"invocation_id": "inv-1",
					"user_content": {"parts": [{"text": "台北的天氣如何？"}], "role": "user"},
					"final_response": {"parts": [{"text": "台北 的天氣是：陰天。"}], "role": "model"},
					"intermediate_data": {
						"tool_uses": [{"id": "t1", "name": "query_weather", "args": {"city_name": "台北"}}],
						"intermediate_responses": []
					}
				}],
				"session_input": {"app_name": "weather_agent", "user_id": "u", "state": {}}
			}]
		});
		let set: EvalSet = serde_json::from_value(raw).unwrap();
		assert_eq!(set.eval_cases.len(), 1);
		let inv = &set.eval_cases[0].conversation[0];
		assert_eq!(inv.tool_uses().len(), 1);
		assert_eq!(inv.tool_uses()[0].name.as_deref(), Some("query_weather"));
		assert_eq!(Invocation::default().tool_uses().len(), 0);
	}

	#[test]
	fn test_results_group_in_insertion_order() {
		let grouped: ResultsByEvalId = vec![case("b", "1"), case("a", "2"), case("b", "3")]
			.into_iter()
			.collect();
		let ids: Vec<&str> = grouped.iter().map(|(id, _)| id).collect();
		assert_eq!(ids, vec!["b", "a"]);
		let sessions: Vec<&str> = grouped.case_results().map(|c| c.session_id.as_str()).collect();
		assert_eq!(sessions, vec!["1", "3", "2"]);
		assert_eq!(grouped.len(), 2);
		assert_eq!(grouped.invocation_count(), 0);
	}
}
