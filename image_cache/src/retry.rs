use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::CacheError;

/// What to do after a source could not be cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the remote source and park the element until the source is resolved later.
    Defer,
    /// Park the element, then immediately release every parked element waiting on this source.
    Resolve(String),
    /// Forget the failed source and run the whole pipeline again for another one.
    Alternate(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    #[error("Retry callback failed for {src}: {reason}")]
    CallbackFailed { src: String, reason: String },
}

/// User supplied hook invoked whenever caching a source fails.
#[async_trait]
pub trait RetryCallback: Send + Sync {
    async fn on_cache_failure(
        &self,
        src: &str,
        error: &CacheError,
    ) -> Result<RetryDecision, RetryError>;
}

pub struct RetryFn<F>(pub F);

#[async_trait]
impl<F, Fut> RetryCallback for RetryFn<F>
where
    F: Fn(String, CacheError) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RetryDecision, RetryError>> + Send,
{
    async fn on_cache_failure(
        &self,
        src: &str,
        error: &CacheError,
    ) -> Result<RetryDecision, RetryError> {
        (self.0)(src.to_string(), error.clone()).await
    }
}

#[derive(Clone, Default)]
pub struct RetryCallbacks {
    callbacks: HashMap<String, Arc<dyn RetryCallback>>,
}

impl fmt::Debug for RetryCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryCallbacks")
            .field("names", &self.names())
            .finish()
    }
}

impl RetryCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, callback: Arc<dyn RetryCallback>) -> Self {
        self.callbacks.insert(name.into(), callback);

        self
    }

    pub fn register_fn<F, Fut>(self, name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(String, CacheError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RetryDecision, RetryError>> + Send + 'static,
    {
        self.register(name, Arc::new(RetryFn(callback)))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RetryCallback>> {
        self.callbacks.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.callbacks.keys().map(String::as_str).collect();
        names.sort_unstable();

        names
    }
}
