use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{EvalConfig, RESPONSE_MATCH_SCORE, TOOL_TRAJECTORY_AVG_SCORE};
use crate::error::Error;
use crate::metrics::{response_match::ResponseMatchMetric, trajectory::ToolTrajectoryMetric};
use crate::types::{EvalStatus, Invocation, MetricOutcome};

/// Scores a case's actual invocations against the expected ones.
#[async_trait]
pub trait Metric: Send + Sync {
    fn name(&self) -> &'static str;
    fn threshold(&self) -> f64;

    /// `actual` and `expected` are aligned turn by turn.
    async fn evaluate(&self, actual: &[Invocation], expected: &[Invocation]) -> Result<MetricEvaluation>;
}

/// Per-invocation and overall outcome of one metric on one case.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEvaluation {
    pub overall: MetricOutcome,
    pub per_invocation: Vec<MetricOutcome>,
}

impl MetricEvaluation {
    /// Build from per-invocation scores. The overall score is the mean of
    /// the scores that are present.
    pub fn from_scores(name: &str, threshold: f64, scores: Vec<Option<f64>>) -> Self {
        let present: Vec<f64> = scores.iter().flatten().copied().collect();
        let overall_score = if present.is_empty() {
            None
        } else {
            Some(present.iter().sum::<f64>() / present.len() as f64)
        };
        let outcome = |score: Option<f64>| MetricOutcome {
            metric_name: name.to_string(),
            threshold,
            score,
            eval_status: Some(EvalStatus::from_score(score, threshold)),
        };
        Self {
            overall: outcome(overall_score),
            per_invocation: scores.into_iter().map(outcome).collect(),
        }
    }
}

/// Instantiate the configured metrics in criteria order.
pub fn metrics_from_config(config: &EvalConfig) -> Result<Vec<Arc<dyn Metric>>, Error> {
    config
        .metric_specs()?
        .into_iter()
        .map(|spec| -> Result<Arc<dyn Metric>, Error> {
            match spec.name.as_str() {
                TOOL_TRAJECTORY_AVG_SCORE => Ok(Arc::new(ToolTrajectoryMetric::new(spec.threshold))),
                RESPONSE_MATCH_SCORE => Ok(Arc::new(ResponseMatchMetric::new(spec.threshold))),
                other => Err(Error::Config(format!(
                    "unsupported metric {other:?} (supported: {TOOL_TRAJECTORY_AVG_SCORE}, {RESPONSE_MATCH_SCORE})"
                ))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_scores_averages_present_scores() {
        let eval = MetricEvaluation::from_scores("m", 0.5, vec![Some(1.0), None, Some(0.0)]);
        assert_eq!(eval.overall.score, Some(0.5));
        assert_eq!(eval.overall.eval_status, Some(EvalStatus::Passed));
        let statuses: Vec<_> = eval.per_invocation.iter().map(|o| o.eval_status).collect();
        assert_eq!(
            statuses,
            vec![
                Some(EvalStatus::Passed),
                Some(EvalStatus::NotEvaluated),
                Some(EvalStatus::Failed)
            ]
        );

        let empty = MetricEvaluation::from_scores("m", 0.5, vec![None]);
        assert_eq!(empty.overall.eval_status, Some(EvalStatus::NotEvaluated));
    }

    #[test]
    fn test_metrics_follow_config_order() {
        let config: EvalConfig = serde_json::from_value(json!({
            "criteria": {"response_match_score": 0.8, "tool_trajectory_avg_score": 1.0}
        }))
        .unwrap();
        let names: Vec<_> = metrics_from_config(&config)
            .unwrap()
            .iter()
            .map(|m| m.name())
            .collect();
        assert_eq!(names, vec![RESPONSE_MATCH_SCORE, TOOL_TRAJECTORY_AVG_SCORE]);
    }

    #[test]
    fn test_unknown_metric_is_rejected() {
        let config: EvalConfig = serde_json::from_value(json!({
            "criteria": {"safety_v1": 0.8}
        }))
        .unwrap();
        let err = metrics_from_config(&config).err().unwrap();
        assert!(err.is_load_error());
    }
}
