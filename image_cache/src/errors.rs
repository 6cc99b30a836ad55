use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("{0} is not cached")]
    NotCached(String),
    #[error("Failed to cache {src}: {source}")]
    CacheWrite { src: String, source: EngineError },
    #[error("Failed to resolve cached file for {src}: {source}")]
    LookupFailed { src: String, source: EngineError },
    #[error("Cache engine failed to initialize: {0}")]
    Initialization(EngineError),
    #[error("Caching is disabled")]
    Disabled,
    #[error("Cache engine dropped the request without answering")]
    EngineDropped,
}
