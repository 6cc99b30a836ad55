use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use common::config::EngineOptions;
use tracing::{debug, trace};

use crate::{
    errors::EngineError,
    traits::{CacheEngine, CachedCallback, Continuation, ResolvedCallback},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub init_calls: usize,
    pub lookups: usize,
    pub downloads: usize,
    pub resolutions: usize,
}

impl EngineStats {
    pub fn queries(&self) -> usize {
        self.lookups + self.downloads + self.resolutions
    }
}

#[derive(Default)]
struct EngineState {
    initialized: bool,
    applied_options: Option<EngineOptions>,
    cached: HashMap<String, String>,
    failures: HashMap<String, String>,
    latency: HashMap<String, Duration>,
    stats: EngineStats,
}

/// In-process engine keeping its "downloads" in memory.
///
/// Sources registered with [`MemoryEngine::with_cache_failure`] fail to
/// download, everything else caches successfully under `local_root`.
/// Sources with a latency answer from a spawned task after sleeping, which
/// needs a tokio runtime.
pub struct MemoryEngine {
    local_root: String,
    caching_enabled: bool,
    init_failure: Option<String>,
    state: Mutex<EngineState>,
}

impl MemoryEngine {
    pub fn new(local_root: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            caching_enabled: true,
            init_failure: None,
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn with_caching_enabled(mut self, enabled: bool) -> Self {
        self.caching_enabled = enabled;

        self
    }

    pub fn with_init_failure(mut self, reason: impl Into<String>) -> Self {
        self.init_failure = Some(reason.into());

        self
    }

    pub fn with_cached(self, src: impl Into<String>) -> Self {
        let src = src.into();
        let local_path = self.local_path(&src);
        self.lock().cached.insert(src, local_path);

        self
    }

    pub fn with_cache_failure(self, src: impl Into<String>, reason: impl Into<String>) -> Self {
        self.set_cache_failure(src, reason);

        self
    }

    pub fn with_latency(self, src: impl Into<String>, latency: Duration) -> Self {
        self.lock().latency.insert(src.into(), latency);

        self
    }

    pub fn set_cache_failure(&self, src: impl Into<String>, reason: impl Into<String>) {
        self.lock().failures.insert(src.into(), reason.into());
    }

    pub fn clear_cache_failure(&self, src: &str) {
        self.lock().failures.remove(src);
    }

    pub fn stats(&self) -> EngineStats {
        self.lock().stats
    }

    pub fn applied_options(&self) -> Option<EngineOptions> {
        self.lock().applied_options.clone()
    }

    pub fn local_path(&self, src: &str) -> String {
        let without_scheme = src.split_once("://").map_or(src, |(_, rest)| rest);
        let file_name: String = without_scheme
            .chars()
            .map(|c| match c {
                '/' | ':' | '?' | '&' | '=' | '#' => '_',
                other => other,
            })
            .collect();

        format!("{}/{}", self.local_root.trim_end_matches('/'), file_name)
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn respond(latency: Option<Duration>, respond: impl FnOnce() + Send + 'static) {
        match latency {
            Some(latency) => {
                tokio::spawn(async move {
                    tokio::time::sleep(latency).await;
                    respond();
                });
            }
            None => respond(),
        }
    }
}

impl CacheEngine for MemoryEngine {
    fn init(
        &self,
        options: &EngineOptions,
        on_success: Continuation<bool>,
        on_failure: Continuation<EngineError>,
    ) {
        {
            let mut state = self.lock();
            state.stats.init_calls += 1;
            state.applied_options = Some(options.clone());
            state.initialized = self.init_failure.is_none();
        }

        match &self.init_failure {
            Some(reason) => on_failure(EngineError::new(reason.clone())),
            None => on_success(self.caching_enabled && !options.cache_disabled),
        }
    }

    fn is_cached(&self, src: &str, callback: CachedCallback) {
        let (local_path, latency) = {
            let mut state = self.lock();
            state.stats.lookups += 1;

            let local_path = match state.initialized {
                true => state.cached.get(src).cloned(),
                false => None,
            };

            (local_path, state.latency.get(src).copied())
        };

        trace!("Memory engine lookup {src}: {local_path:?}");

        let src = src.to_string();
        Self::respond(latency, move || match local_path {
            Some(path) => callback(path, true),
            None => callback(src, false),
        });
    }

    fn cache_file(
        &self,
        src: &str,
        on_success: Continuation<()>,
        on_failure: Continuation<EngineError>,
    ) {
        let local_path = self.local_path(src);

        let (outcome, latency) = {
            let mut state = self.lock();
            state.stats.downloads += 1;

            let outcome = if !state.initialized {
                Err(EngineError::new("engine is not initialized"))
            } else if let Some(reason) = state.failures.get(src) {
                Err(EngineError::new(reason.clone()))
            } else {
                state.cached.insert(src.to_string(), local_path);
                Ok(())
            };

            (outcome, state.latency.get(src).copied())
        };

        debug!("Memory engine download {src}: {outcome:?}");

        Self::respond(latency, move || match outcome {
            Ok(()) => on_success(()),
            Err(err) => on_failure(err),
        });
    }

    fn get_cached_file_url(
        &self,
        src: &str,
        on_success: ResolvedCallback,
        on_failure: Continuation<EngineError>,
    ) {
        let (local_path, latency) = {
            let mut state = self.lock();
            state.stats.resolutions += 1;

            (state.cached.get(src).cloned(), state.latency.get(src).copied())
        };

        let src = src.to_string();
        Self::respond(latency, move || match local_path {
            Some(path) => on_success(src, path),
            None => on_failure(EngineError::new(format!("{src} is not in the cache"))),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_path_flattens_remote_urls() {
        let engine = MemoryEngine::new("/local/");

        assert_eq!(engine.local_path("a.jpg"), "/local/a.jpg");
        assert_eq!(
            engine.local_path("https://cdn.example.com/img/b.png?w=200"),
            "/local/cdn.example.com_img_b.png_w_200"
        );
    }

    #[test]
    fn downloads_before_init_fail() {
        let engine = MemoryEngine::new("/local");
        let failed = std::sync::Arc::new(Mutex::new(None));
        let sink = failed.clone();

        engine.cache_file(
            "a.jpg",
            Box::new(|_| {}),
            Box::new(move |err| *sink.lock().unwrap() = Some(err)),
        );

        assert_eq!(
            *failed.lock().unwrap(),
            Some(EngineError::new("engine is not initialized"))
        );
        assert_eq!(engine.stats().downloads, 1);
    }
}
