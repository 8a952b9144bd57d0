use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("No video loaded; initialize the router first")]
    NotInitialized,

    #[error("Another query is already in flight for this session")]
    QueryInFlight,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<config::ConfigError> for RouterError {
    #[inline]
    fn from(error: config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

pub mod cache;
pub mod classifier;
pub mod commands;
pub mod config;
pub mod cost;
pub mod external;
pub mod retrieval;
pub mod router;
pub mod storage;
pub mod transcript;
