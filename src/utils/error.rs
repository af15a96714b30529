// Error types for the collector pipeline
// Design: every stage returns a tagged StageError; the orchestrator owns the
// skip-vs-abort policy instead of each collector logging and swallowing.

use thiserror::Error;

pub type CollectorResult<T> = Result<T, CollectorError>;
pub type StageResult<T> = Result<T, StageError>;

/// Top-level collector errors. Only a lost database connection (or broken
/// configuration) ends a monitoring cycle for a target database.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database connection failed: {0}")]
    Connection(String),

    #[error(transparent)]
    Stage(#[from] StageError),
}

/// Per-stage errors. `kind()` drives the orchestrator's dispatch: anything
/// except a lost connection is skip-and-continue for the cycle.
#[derive(Debug, Error)]
pub enum StageError {
    /// A required extension is missing on this server.
    #[error("metric family is not eligible on this server")]
    NotEligible,

    /// The server major version has no matching query template.
    #[error("unsupported PostgreSQL version")]
    UnsupportedVersion,

    #[error("unable to parse PostgreSQL version from string: {0}")]
    VersionParse(String),

    /// Query issuance or row streaming failed.
    #[error("query failed: {0}")]
    Query(String),

    /// A row did not decode into the expected record shape.
    #[error("row decode failed: {0}")]
    RowDecode(String),

    /// The telemetry transport rejected a flush.
    #[error("telemetry publish failed: {0}")]
    Transport(String),
}

/// Coarse classification used by the orchestrator when deciding how loudly
/// to log a skipped stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageErrorKind {
    Ineligible,
    Failure,
}

impl StageError {
    pub fn kind(&self) -> StageErrorKind {
        match self {
            StageError::NotEligible | StageError::UnsupportedVersion => StageErrorKind::Ineligible,
            StageError::VersionParse(_)
            | StageError::Query(_)
            | StageError::RowDecode(_)
            | StageError::Transport(_) => StageErrorKind::Failure,
        }
    }

    pub fn query(err: impl std::fmt::Display) -> Self {
        StageError::Query(err.to_string())
    }

    pub fn row_decode(err: impl std::fmt::Display) -> Self {
        StageError::RowDecode(err.to_string())
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        StageError::Transport(err.to_string())
    }
}
