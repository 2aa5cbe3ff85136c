use std::path::Path;

use anyhow::{Context, Result};

use crate::agent::AgentRegistry;
use crate::config::EvalConfig;
use crate::datasource::{dataset_files, load_eval_set};
use crate::metric::metrics_from_config;
use crate::report::summary_table;
use crate::runner::LocalEvaluator;
use crate::types::{EvalStatus, ResultsByEvalId};

/// Runs per case used by [`evaluate`].
pub const DEFAULT_NUM_RUNS: usize = 2;

/// Evaluate a built-in agent against a dataset file or a directory of
/// datasets, failing unless every metric passed.
///
/// Metrics come from `test_config.json` next to the dataset, or the
/// default criteria when there is none.
///
/// # Example
/// ```ignore
/// #[tokio::test]
/// async fn test_weather_agent() -> anyhow::Result<()> {
///     evaluate("weather_agent", "evalsets/weather_agent/weather_evaluation_zhtw.evalset.json").await
/// }
/// ```
pub async fn evaluate(agent_module: &str, dataset: impl AsRef<Path>) -> Result<()> {
    let dataset = dataset.as_ref();
    let agent = AgentRegistry::with_builtin_agents().load(agent_module)?;

    for file in dataset_files(dataset).await? {
        let config = EvalConfig::for_dataset(&file).await?;
        let metrics = metrics_from_config(&config)?;
        let eval_set = load_eval_set(&file).await?;

        let results = LocalEvaluator::builder()
            .agent(agent.clone())
            .eval_set(eval_set)
            .metrics(metrics)
            .num_runs(DEFAULT_NUM_RUNS)
            .build()?
            .run()
            .await?;

        assert_all_passed(&results).with_context(|| format!("dataset {}", file.display()))?;
    }
    Ok(())
}

/// Fail when any per-invocation or overall metric outcome did not pass.
pub fn assert_all_passed(results: &ResultsByEvalId) -> Result<()> {
    let mut failures = Vec::new();
    for cr in results.case_results() {
        for outcome in &cr.overall_eval_metric_results {
            if outcome.eval_status != Some(EvalStatus::Passed) {
                let score = outcome
                    .score
                    .map(|s| format!("{s:.3}"))
                    .unwrap_or_else(|| "none".to_string());
                failures.push(format!(
                    "{} ({}): {} scored {} against threshold {}",
                    cr.eval_id, cr.session_id, outcome.metric_name, score, outcome.threshold
                ));
            }
        }
    }

    if !failures.is_empty() {
        anyhow::bail!(
            "Evaluation failed: {} metric outcome(s) did not pass\n{}\n{}",
            failures.len(),
            failures.join("\n"),
            summary_table(results)
        );
    }
    Ok(())
}
