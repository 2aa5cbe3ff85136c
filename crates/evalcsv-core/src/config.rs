use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// File name looked up next to a dataset by [`EvalConfig::for_dataset`].
pub const CONFIG_FILE_NAME: &str = "test_config.json";

pub const TOOL_TRAJECTORY_AVG_SCORE: &str = "tool_trajectory_avg_score";
pub const RESPONSE_MATCH_SCORE: &str = "response_match_score";

/// Which metrics to compute and their pass thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Metric name to criterion, in file order.
    pub criteria: Map<String, Value>,
}

/// A criterion is either a bare threshold or an object with a threshold.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Criterion {
    Threshold(f64),
    Detailed { threshold: f64 },
}

/// A metric name with its resolved threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub name: String,
    pub threshold: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        let mut criteria = Map::new();
        criteria.insert(TOOL_TRAJECTORY_AVG_SCORE.to_string(), Value::from(1.0));
        criteria.insert(RESPONSE_MATCH_SCORE.to_string(), Value::from(0.8));
        Self { criteria }
    }
}

impl EvalConfig {
    /// Load a config file. A missing file is an error.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading eval config");
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config: EvalConfig = serde_json::from_str(&raw).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.metric_specs()?;
        Ok(config)
    }

    /// Config stored next to `dataset` as `test_config.json`, or the
    /// defaults when there is none.
    pub async fn for_dataset(dataset: impl AsRef<Path>) -> Result<Self> {
        let candidate = config_path_for(dataset.as_ref()).await?;
        match tokio::fs::metadata(&candidate).await {
            Ok(_) => Self::load(&candidate).await,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %candidate.display(), "no eval config found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(Error::Read {
                path: candidate,
                source,
            }),
        }
    }

    /// Resolve every criterion to a threshold, keeping file order.
    pub fn metric_specs(&self) -> Result<Vec<MetricSpec>> {
        self.criteria
            .iter()
            .map(|(name, value)| {
                let criterion: Criterion = serde_json::from_value(value.clone()).map_err(|_| {
                    Error::Config(format!("criterion {name:?} must be a number or {{\"threshold\": <number>}}"))
                })?;
                let threshold = match criterion {
                    Criterion::Threshold(t) | Criterion::Detailed { threshold: t } => t,
                };
                Ok(MetricSpec {
                    name: name.clone(),
                    threshold,
                })
            })
            .collect()
    }
}

async fn config_path_for(dataset: &Path) -> Result<PathBuf> {
    let is_dir = match tokio::fs::metadata(dataset).await {
        Ok(meta) => meta.is_dir(),
        // A dataset that does not exist yet still names its directory.
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(source) => {
            return Err(Error::Read {
                path: dataset.to_path_buf(),
                source,
            })
        }
    };
    let dir = if is_dir {
        dataset
    } else {
        dataset.parent().unwrap_or_else(|| Path::new("."))
    };
    Ok(dir.join(CONFIG_FILE_NAME))
}
