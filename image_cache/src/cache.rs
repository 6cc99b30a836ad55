use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use common::config::{CacheConfig, EngineOptions};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::{
    errors::{CacheError, EngineError},
    retry::{RetryCallback, RetryCallbacks},
    traits::CacheEngine,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Pending,
    Ready,
    Failed(CacheError),
}

// shared by the success and failure continuations, whichever runs first wins
struct Completion<T>(Mutex<Option<oneshot::Sender<T>>>);

impl<T> Completion<T> {
    fn channel() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (sender, receiver) = oneshot::channel();

        (Arc::new(Self(Mutex::new(Some(sender)))), receiver)
    }

    fn complete(&self, value: T) {
        let sender = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(sender) = sender {
            // receiver gone means nobody is waiting anymore
            let _ = sender.send(value);
        }
    }
}

fn settle(signal: &watch::Sender<Readiness>, outcome: Readiness) {
    signal.send_if_modified(|state| {
        if *state != Readiness::Pending {
            return false;
        }

        *state = outcome;

        true
    });
}

/// Future based front of a callback driven [`CacheEngine`].
///
/// One instance owns the engine handle, the effective engine options and the
/// readiness signal every load waits on.
pub struct ImgCache {
    engine: Arc<dyn CacheEngine>,
    options: EngineOptions,
    callbacks: RetryCallbacks,
    init_started: AtomicBool,
    readiness: Arc<watch::Sender<Readiness>>,
}

impl ImgCache {
    /// Builds the facade, initializing the engine right away unless `manual_init` is set.
    pub fn new(
        engine: Arc<dyn CacheEngine>,
        config: CacheConfig,
        callbacks: RetryCallbacks,
    ) -> Arc<Self> {
        let (readiness, _) = watch::channel(Readiness::Pending);

        let cache = Arc::new(Self {
            engine,
            options: config.options,
            callbacks,
            init_started: AtomicBool::new(false),
            readiness: Arc::new(readiness),
        });

        if !config.manual_init {
            cache.init();
        } else {
            debug!("Manual init requested, waiting for the host to start the engine");
        }

        cache
    }

    /// Starts the engine. Only the first call reaches the engine.
    pub fn init(&self) {
        if self.init_started.swap(true, Ordering::AcqRel) {
            debug!("Cache engine initialization already started");
            return;
        }

        info!("Initializing cache engine");

        let cache_disabled = self.options.cache_disabled;
        let on_success_signal = self.readiness.clone();
        let on_failure_signal = self.readiness.clone();

        self.engine.init(
            &self.options,
            Box::new(move |caching_enabled| {
                if caching_enabled && !cache_disabled {
                    info!("Cache engine ready");
                    settle(&on_success_signal, Readiness::Ready);
                } else {
                    warn!("Cache engine started with caching disabled");
                    settle(&on_success_signal, Readiness::Failed(CacheError::Disabled));
                }
            }),
            Box::new(move |err: EngineError| {
                warn!("Cache engine failed to initialize: {err}");
                settle(
                    &on_failure_signal,
                    Readiness::Failed(CacheError::Initialization(err)),
                );
            }),
        );
    }

    /// Resolves once the engine is up with caching enabled, every caller sees the same outcome.
    pub async fn ready(&self) -> Result<(), CacheError> {
        let mut receiver = self.readiness.subscribe();

        loop {
            let state = receiver.borrow_and_update().clone();

            match state {
                Readiness::Ready => return Ok(()),
                Readiness::Failed(err) => return Err(err),
                Readiness::Pending => receiver
                    .changed()
                    .await
                    .map_err(|_| CacheError::EngineDropped)?,
            }
        }
    }

    pub fn retry_callback(&self) -> Option<Arc<dyn RetryCallback>> {
        let name = self.options.retry_callback_provider.as_deref()?;

        let callback = self.callbacks.get(name);

        if callback.is_none() {
            warn!(
                "Retry callback provider {name} is not registered, known providers: {:?}",
                self.callbacks.names()
            );
        }

        callback
    }

    pub fn internal(&self) -> Arc<dyn CacheEngine> {
        self.engine.clone()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// `Ok(())` if `src` is cached, [`CacheError::NotCached`] otherwise.
    pub async fn is_cached(&self, src: &str) -> Result<(), CacheError> {
        let (completion, receiver) = Completion::channel();

        self.engine.is_cached(
            src,
            Box::new(move |_path, success| completion.complete(success)),
        );

        let cached = receiver.await.map_err(|_| CacheError::EngineDropped)?;

        trace!("Cache lookup for {src}: {cached}");

        if cached {
            Ok(())
        } else {
            Err(CacheError::NotCached(src.to_string()))
        }
    }

    pub async fn cache_file(&self, src: &str) -> Result<(), CacheError> {
        let (completion, receiver) = Completion::channel();
        let on_failure = completion.clone();

        self.engine.cache_file(
            src,
            Box::new(move |_| completion.complete(Ok(()))),
            Box::new(move |err| on_failure.complete(Err(err))),
        );

        match receiver.await.map_err(|_| CacheError::EngineDropped)? {
            Ok(()) => {
                debug!("Cached {src}");
                Ok(())
            }
            Err(source) => {
                debug!("Failed to cache {src}: {source}");
                Err(CacheError::CacheWrite {
                    src: src.to_string(),
                    source,
                })
            }
        }
    }

    pub async fn get_cached_file_url(&self, src: &str) -> Result<String, CacheError> {
        let (completion, receiver) = Completion::channel();
        let on_failure = completion.clone();

        self.engine.get_cached_file_url(
            src,
            Box::new(move |_src, local_path| completion.complete(Ok(local_path))),
            Box::new(move |err| on_failure.complete(Err(err))),
        );

        receiver
            .await
            .map_err(|_| CacheError::EngineDropped)?
            .map_err(|source| CacheError::LookupFailed {
                src: src.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::{memory_cache::MemoryEngine, retry::RetryDecision};

    fn facade(engine: Arc<MemoryEngine>, config: CacheConfig) -> Arc<ImgCache> {
        ImgCache::new(engine, config, RetryCallbacks::new())
    }

    #[tokio::test]
    async fn ready_resolves_after_automatic_init() {
        let engine = Arc::new(MemoryEngine::new("/local"));
        let cache = facade(engine.clone(), CacheConfig::default());

        assert_eq!(cache.ready().await, Ok(()));
        assert_eq!(cache.ready().await, Ok(()));
        assert_eq!(engine.stats().init_calls, 1);
    }

    #[tokio::test]
    async fn disabled_cache_rejects_readiness() {
        let engine = Arc::new(MemoryEngine::new("/local"));
        let config = CacheConfig::builder().disable_cache(true).build();
        let cache = facade(engine, config);

        assert_eq!(cache.ready().await, Err(CacheError::Disabled));
    }

    #[tokio::test]
    async fn engine_reporting_disabled_rejects_readiness() {
        let engine = Arc::new(MemoryEngine::new("/local").with_caching_enabled(false));
        let cache = facade(engine, CacheConfig::default());

        assert_eq!(cache.ready().await, Err(CacheError::Disabled));
    }

    #[tokio::test]
    async fn failed_init_rejects_readiness() {
        let engine = Arc::new(MemoryEngine::new("/local").with_init_failure("no filesystem"));
        let cache = facade(engine, CacheConfig::default());

        assert_eq!(
            cache.ready().await,
            Err(CacheError::Initialization(EngineError::new("no filesystem")))
        );
    }

    #[tokio::test]
    async fn manual_init_defers_until_requested() {
        let engine = Arc::new(MemoryEngine::new("/local"));
        let config = CacheConfig::builder().manual_init(true).build();
        let cache = facade(engine.clone(), config);

        assert_eq!(engine.stats().init_calls, 0);
        assert!(
            timeout(Duration::from_millis(20), cache.ready())
                .await
                .is_err()
        );

        cache.init();
        cache.init();

        assert_eq!(cache.ready().await, Ok(()));
        assert_eq!(engine.stats().init_calls, 1);
    }

    #[tokio::test]
    async fn is_cached_rejects_on_miss() {
        let engine = Arc::new(MemoryEngine::new("/local").with_cached("hit.jpg"));
        let cache = facade(engine, CacheConfig::default());

        assert_eq!(cache.is_cached("hit.jpg").await, Ok(()));
        assert_eq!(
            cache.is_cached("miss.jpg").await,
            Err(CacheError::NotCached("miss.jpg".into()))
        );
    }

    #[tokio::test]
    async fn cache_file_then_resolve_local_path() {
        let engine = Arc::new(MemoryEngine::new("/local"));
        let cache = facade(engine, CacheConfig::default());
        cache.ready().await.unwrap();

        cache.cache_file("a.jpg").await.unwrap();

        assert_eq!(cache.is_cached("a.jpg").await, Ok(()));
        assert_eq!(
            cache.get_cached_file_url("a.jpg").await,
            Ok("/local/a.jpg".to_string())
        );
    }

    #[tokio::test]
    async fn cache_file_surfaces_engine_error() {
        let engine = Arc::new(MemoryEngine::new("/local").with_cache_failure("b.jpg", "404"));
        let cache = facade(engine, CacheConfig::default());
        cache.ready().await.unwrap();

        assert_eq!(
            cache.cache_file("b.jpg").await,
            Err(CacheError::CacheWrite {
                src: "b.jpg".into(),
                source: EngineError::new("404"),
            })
        );
    }

    #[tokio::test]
    async fn lookup_of_uncached_file_fails() {
        let engine = Arc::new(MemoryEngine::new("/local"));
        let cache = facade(engine, CacheConfig::default());
        cache.ready().await.unwrap();

        assert!(matches!(
            cache.get_cached_file_url("nope.jpg").await,
            Err(CacheError::LookupFailed { .. })
        ));
    }

    #[tokio::test]
    async fn retry_callback_is_resolved_by_configured_name() {
        let engine = Arc::new(MemoryEngine::new("/local"));
        let callbacks = RetryCallbacks::new()
            .register_fn("offline", |_src, _err| async { Ok(RetryDecision::Defer) });

        let configured = ImgCache::new(
            engine.clone(),
            CacheConfig::builder().retry_callback_provider("offline").build(),
            callbacks.clone(),
        );
        assert!(configured.retry_callback().is_some());

        let misconfigured = ImgCache::new(
            engine.clone(),
            CacheConfig::builder().retry_callback_provider("online").build(),
            callbacks.clone(),
        );
        assert!(misconfigured.retry_callback().is_none());

        let unconfigured = ImgCache::new(engine, CacheConfig::default(), callbacks);
        assert!(unconfigured.retry_callback().is_none());
    }

    #[tokio::test]
    async fn options_reach_the_engine() {
        let engine = Arc::new(MemoryEngine::new("/local"));
        let config = CacheConfig::builder()
            .set_option("localCacheFolder", "thumbs")
            .build();
        let cache = facade(engine.clone(), config);
        cache.ready().await.unwrap();

        assert_eq!(
            engine.applied_options().and_then(|o| o.get("localCacheFolder")),
            Some(serde_json::json!("thumbs"))
        );
        assert_eq!(
            cache.options().get("localCacheFolder"),
            Some(serde_json::json!("thumbs"))
        );
    }
}
