use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session pool is empty, configure at least one session")]
    EmptyPool,

    #[error("Invalid session index: {index} (pool size {len})")]
    SessionIndex { index: usize, len: usize },
}

pub type AppResult<T> = Result<T, AppError>;
