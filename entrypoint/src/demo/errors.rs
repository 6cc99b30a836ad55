use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum DemoError {
    #[error("Failed to read config file {0}: {1}")]
    ConfigUnreadable(String, std::io::Error),
    #[error("Invalid config file: {0}")]
    InvalidConfig(#[from] serde_json::Error),
    #[error("Invalid --option value {0}, expected name=json")]
    InvalidOption(String),
    #[error("Load task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}
