use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown agent module {name:?} (available: {available})")]
    AgentLoad { name: String, available: String },

    #[error("evaluation of case {eval_id:?} failed")]
    Evaluation {
        eval_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to write {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode CSV")]
    Csv(#[from] csv::Error),

    #[error("output contains characters that {encoding} cannot represent")]
    Unencodable { encoding: &'static str },
}

impl Error {
    /// True for errors raised while loading inputs, before any evaluation.
    pub fn is_load_error(&self) -> bool {
        matches!(self, Error::Read { .. } | Error::Parse { .. } | Error::Config(_))
    }
}

/// A content or tool-call payload that cannot be turned into text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("content part {index} carries {count} payloads, expected one")]
    AmbiguousPart { index: usize, count: usize },

    #[error("tool call {index} has no name")]
    MissingToolName { index: usize },

    #[error("tool call {index} ({name}) has non-object arguments")]
    InvalidToolArgs { index: usize, name: String },
}
