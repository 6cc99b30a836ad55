use common::config::EngineOptions;

use crate::errors::EngineError;

pub type Continuation<T> = Box<dyn FnOnce(T) + Send + 'static>;

// (path, success)
pub type CachedCallback = Box<dyn FnOnce(String, bool) + Send + 'static>;

// (src, local_path)
pub type ResolvedCallback = Box<dyn FnOnce(String, String) + Send + 'static>;

/// Capability interface of the external image cache engine.
///
/// Every method reports its outcome by invoking exactly one of the
/// continuations it is given, either before returning or later from another
/// task. Dropping all continuations without calling any of them is treated
/// by the facade as a lost request.
pub trait CacheEngine: Send + Sync {
    /// `on_success` receives whether the engine ended up with caching enabled.
    fn init(
        &self,
        options: &EngineOptions,
        on_success: Continuation<bool>,
        on_failure: Continuation<EngineError>,
    );

    fn is_cached(&self, src: &str, callback: CachedCallback);

    fn cache_file(
        &self,
        src: &str,
        on_success: Continuation<()>,
        on_failure: Continuation<EngineError>,
    );

    fn get_cached_file_url(
        &self,
        src: &str,
        on_success: ResolvedCallback,
        on_failure: Continuation<EngineError>,
    );
}
