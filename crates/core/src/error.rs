use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The planner is not configured or could not be reached.
    #[error("Planner unavailable: {0}")]
    Unavailable(String),

    #[error("Cannot determine how to execute {0}")]
    NoPlan(String),

    #[error("Unsupported execution method: {0}")]
    UnsupportedMethod(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
