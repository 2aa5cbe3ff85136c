use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::agent::Agent;
use crate::datasource::ResultSource;
use crate::error::{Error, Result};
use crate::metric::Metric;
use crate::types::{CaseResult, EvalSet, EvalStatus, InvocationResult, ResultsByEvalId};

pub struct LocalEvaluatorBuilder {
	agent: Option<Arc<dyn Agent>>,
	eval_set: Option<EvalSet>,
	metrics: Vec<Arc<dyn Metric>>,
	num_runs: usize,
	concurrency: usize,
}

impl LocalEvaluatorBuilder {
	pub fn new() -> Self {
		Self {
			agent: None,
			eval_set: None,
			metrics: Vec::new(),
			num_runs: 1,
			concurrency: 8,
		}
	}

	pub fn agent(mut self, agent: Arc<dyn Agent>) -> Self {
		self.agent = Some(agent);
		self
	}

	pub fn eval_set(mut self, eval_set: EvalSet) -> Self {
		self.eval_set = Some(eval_set);
		self
	}

	pub fn metrics<I>(mut self, metrics: I) -> Self
	where
		I: IntoIterator<Item = Arc<dyn Metric>>,
	{
		self.metrics = metrics.into_iter().collect();
		self
	}

	pub fn add_metric(mut self, metric: Arc<dyn Metric>) -> Self {
		self.metrics.push(metric);
		self
	}

	/// How many times each case is replayed.
	pub fn num_runs(mut self, n: usize) -> Self {
		self.num_runs = n;
		self
	}

	/// Case runs in flight at once.
	pub fn concurrency(mut self, n: usize) -> Self {
		self.concurrency = n.max(1);
		self
	}

	pub fn build(self) -> Result<LocalEvaluator> {
		if self.num_runs == 0 {
			return Err(Error::Config("num_runs must be at least 1".into()));
		}
		Ok(LocalEvaluator {
			agent: self.agent.ok_or_else(|| Error::Config("agent must be set".into()))?,
			eval_set: Arc::new(self.eval_set.ok_or_else(|| Error::Config("eval_set must be set".into()))?),
			metrics: self.metrics,
			num_runs: self.num_runs,
			concurrency: self.concurrency,
		})
	}
}

impl Default for LocalEvaluatorBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Replays an eval set through an agent and scores every turn.
pub struct LocalEvaluator {
	agent: Arc<dyn Agent>,
	eval_set: Arc<EvalSet>,
	metrics: Vec<Arc<dyn Metric>>,
	num_runs: usize,
	concurrency: usize,
}

impl LocalEvaluator {
	pub fn builder() -> LocalEvaluatorBuilder {
		LocalEvaluatorBuilder::new()
	}

	pub fn eval_set(&self) -> &EvalSet {
		&self.eval_set
	}

	/// Run every case `num_runs` times. Results keep dataset order and run
	/// order whatever order the runs finish in. The first agent or metric
	/// failure aborts the whole evaluation.
	pub async fn run(&self) -> Result<ResultsByEvalId> {
		let set = &self.eval_set;
		info!(
			eval_set_id = %set.eval_set_id,
			agent = self.agent.name(),
			cases = set.eval_cases.len(),
			num_runs = self.num_runs,
			"running evaluation"
		);

		let jobs: Vec<(usize, usize)> = (0..set.eval_cases.len())
			.flat_map(|index| (1..=self.num_runs).map(move |run| (index, run)))
			.collect();

		let agent = self.agent.clone();
		let metrics = self.metrics.clone();
		let eval_set = self.eval_set.clone();
		let results: Vec<CaseResult> = stream::iter(jobs)
			.map(move |(index, run)| {
				run_case(agent.clone(), metrics.clone(), eval_set.clone(), index, run)
			})
			.buffered(self.concurrency)
			.try_collect()
			.await?;

		info!(case_results = results.len(), "evaluation finished");
		Ok(results.into_iter().collect())
	}
}

async fn run_case(
	agent: Arc<dyn Agent>,
	metrics: Vec<Arc<dyn Metric>>,
	eval_set: Arc<EvalSet>,
	index: usize,
	run: usize,
) -> Result<CaseResult> {
	let case = &eval_set.eval_cases[index];
	debug!(eval_id = %case.eval_id, run, "running case");
	let evaluation_error = |source: anyhow::Error| Error::Evaluation {
		eval_id: case.eval_id.clone(),
		source,
	};

	let expected = &case.conversation;
	let mut actual = Vec::with_capacity(expected.len());
	for turn in expected {
		let mut invocation = agent
			.invoke(&turn.user_content)
			.await
			.map_err(evaluation_error)?;
		invocation.invocation_id = turn.invocation_id.clone();
		actual.push(invocation);
	}

	let mut overall = Vec::with_capacity(metrics.len());
	let mut per_turn: Vec<Vec<_>> = vec![Vec::with_capacity(metrics.len()); expected.len()];
	for metric in &metrics {
		let evaluation = metric.evaluate(&actual, expected).await.map_err(evaluation_error)?;
		overall.push(evaluation.overall);
		for (slot, outcome) in per_turn.iter_mut().zip(evaluation.per_invocation) {
			slot.push(outcome);
		}
	}

	let final_eval_status = if overall.iter().any(|o| o.eval_status == Some(EvalStatus::Failed)) {
		EvalStatus::Failed
	} else if overall.iter().any(|o| o.eval_status == Some(EvalStatus::Passed)) {
		EvalStatus::Passed
	} else {
		EvalStatus::NotEvaluated
	};
	debug!(eval_id = %case.eval_id, run, status = %final_eval_status, "case finished");

	let eval_metric_result_per_invocation = actual
		.into_iter()
		.zip(expected.iter().cloned())
		.zip(per_turn)
		.map(|((actual_invocation, expected_invocation), eval_metric_results)| InvocationResult {
			actual_invocation,
			expected_invocation,
			eval_metric_results,
		})
		.collect();

	Ok(CaseResult {
		eval_set_id: eval_set.eval_set_id.clone(),
		eval_id: case.eval_id.clone(),
		final_eval_status,
		overall_eval_metric_results: overall,
		eval_metric_result_per_invocation,
		session_id: format!("{}-{}-run{}", eval_set.eval_set_id, case.eval_id, run),
		user_id: case.session_input.as_ref().map(|s| s.user_id.clone()),
	})
}

#[async_trait]
impl ResultSource for LocalEvaluator {
	async fn results(&self) -> Result<ResultsByEvalId> {
		self.run().await
	}
}
