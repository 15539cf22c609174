use thiserror::Error;

/// Errors from SKILL.md manifest parsing and validation.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest must begin with '---' front-matter delimiter")]
    MissingOpeningDelimiter,

    #[error("manifest front-matter has no content after the opening delimiter")]
    EmptyFrontMatter,

    #[error("manifest is missing the closing '---' front-matter delimiter")]
    MissingClosingDelimiter,

    #[error("parse front-matter YAML: {0}")]
    Yaml(String),

    #[error("invalid skill: {0}")]
    Invalid(String),
}

/// Errors from object-storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found")]
    NotFound,

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors from the container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("container engine error: {0}")]
    Backend(String),
}

/// Errors from repository operations (used by the trait definitions in
/// skillbox-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by the execution core.
///
/// Pre-record failures (admission, version resolution, record creation)
/// are returned to the caller as-is. Post-record failures are folded into
/// the terminal execution record instead of propagating.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("skill not found")]
    SkillNotFound,

    #[error("invalid skill: {0}")]
    InvalidSkill(String),

    #[error("{0}")]
    ImageNotAllowed(String),

    #[error("invalid resource limit: {0}")]
    ResourceInvalid(String),

    #[error("env var {0:?} is not allowed")]
    EnvForbidden(String),

    #[error("execution timed out after {0}")]
    Timeout(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("database error: {0}")]
    Database(#[from] RepositoryError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
