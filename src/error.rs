//! Error taxonomy for the engine (spec §7).

use thiserror::Error;

/// Raised while turning a ChatterLang script into an executable graph.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unresolved identifier '{0}' in parameters")]
    UnresolvedIdentifier(String),

    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("unknown segment '{0}'")]
    UnknownSegment(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("structural error: {0}")]
    Structural(String),
}

/// Raised when a helper (field extraction, casting, ...) cannot do its job
/// under the configured strictness.
#[derive(Debug, Error)]
pub enum RuntimeDataError {
    #[error("field '{0}' not found")]
    MissingField(String),

    #[error("could not cast value to {0}")]
    CastFailed(String),
}

/// Raised by a segment's `transform`/source's `generate`; propagated up the
/// iterator chain unless the segment opted into tolerance.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Data(#[from] RuntimeDataError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Raised by a fork or arrow-fork worker failure.
#[derive(Debug, Error)]
pub enum ConcurrencyError {
    #[error("fork branch {0} failed: {1}")]
    BranchFailed(usize, String),

    #[error("arrow-fork '{0}' worker failed: {1}")]
    ArrowForkFailed(String, String),
}
