use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{EvalSet, EvalSetResult, ResultsByEvalId};

/// Anything that can produce grouped case results.
///
/// Implementations finish all of their work before returning; callers
/// never see partial results.
#[async_trait]
pub trait ResultSource: Send + Sync {
    async fn results(&self) -> Result<ResultsByEvalId>;
}

/// Load an eval set JSON file.
pub async fn load_eval_set(path: impl AsRef<Path>) -> Result<EvalSet> {
    let path = path.as_ref();
    let set: EvalSet = read_json(path).await?;
    info!(
        path = %path.display(),
        eval_set_id = %set.eval_set_id,
        cases = set.eval_cases.len(),
        "loaded eval set"
    );
    Ok(set)
}

/// Load a saved eval set result (eval history) JSON file.
pub async fn load_eval_set_result(path: impl AsRef<Path>) -> Result<EvalSetResult> {
    read_json(path.as_ref()).await
}

/// Collect eval set files from `path`: the file itself, or every
/// `*.evalset.json` / `*.test.json` directly inside a directory, sorted by
/// name.
pub async fn dataset_files(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let read_err = |source| Error::Read {
        path: path.to_path_buf(),
        source,
    };
    let meta = tokio::fs::metadata(path).await.map_err(read_err)?;
    if !meta.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut entries = tokio::fs::read_dir(path).await.map_err(read_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let file = entry.path();
        let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name.ends_with(".evalset.json") || name.ends_with(".test.json") {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}

/// Results read back from one or more saved eval history files.
pub struct HistorySource {
    paths: Vec<PathBuf>,
}

impl HistorySource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ResultSource for HistorySource {
    async fn results(&self) -> Result<ResultsByEvalId> {
        let mut grouped = ResultsByEvalId::new();
        for path in &self.paths {
            let saved = load_eval_set_result(path).await?;
            debug!(
                path = %path.display(),
                cases = saved.eval_case_results.len(),
                "loaded eval history"
            );
            for case_result in saved.eval_case_results {
                grouped.push(case_result);
            }
        }
        Ok(grouped)
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&content).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}
