use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Corpus root not found or unreadable: {0}")]
    CorpusUnreadable(String),

    #[error("Invalid task filter pattern: {0}")]
    InvalidFilter(String),

    #[error("Interpreter not found: {0}")]
    InterpreterNotFound(String),

    #[error("Isolation context creation failed: {0}")]
    ContextCreate(String),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Job queue is closed")]
    QueueClosed,

    #[error("Worker failed to execute job: {0}")]
    JobExecution(String),
}

pub type Result<T> = std::result::Result<T, Error>;
