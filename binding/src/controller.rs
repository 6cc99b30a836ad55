use std::{
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use common::binding::BindingKind;
use futures::future::{BoxFuture, FutureExt, join_all};
use image_cache::{CacheError, ImgCache, RetryCallback, RetryDecision, RetryError};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::{
    element::{ImageElement, apply_img},
    errors::BindingError,
    registry::{PendingEntry, PendingRegistry},
    scope::Scope,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStatus {
    NotConfigured,
    Parked,
    AlreadyParked,
    // parked elements reloaded by an immediate resolve
    Released(usize),
    Failed(RetryError),
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Skipped,
    Discarded,
    Cached {
        local_path: String,
    },
    Fallback {
        src: String,
        error: CacheError,
        retry: RetryStatus,
    },
}

/// Element and scope a binding writes to, plus the latest load issued per kind.
pub struct BindingTarget {
    pub(crate) scope: Arc<Scope>,
    pub(crate) element: Arc<dyn ImageElement>,
    generations: [AtomicU64; 2],
}

impl BindingTarget {
    pub(crate) fn new(scope: Arc<Scope>, element: Arc<dyn ImageElement>) -> Self {
        Self {
            scope,
            element,
            generations: [AtomicU64::new(0), AtomicU64::new(0)],
        }
    }

    fn generation(&self, kind: BindingKind) -> &AtomicU64 {
        match kind {
            BindingKind::Src => &self.generations[0],
            BindingKind::Background => &self.generations[1],
        }
    }

    fn begin(&self, kind: BindingKind) -> u64 {
        self.generation(kind).fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn is_current(&self, kind: BindingKind, generation: u64) -> bool {
        !self.scope.is_destroyed() && self.generation(kind).load(Ordering::Acquire) == generation
    }

    // only the most recently issued load for this kind may write to the element
    fn apply(&self, kind: BindingKind, generation: u64, src: &str) -> bool {
        if !self.is_current(kind, generation) {
            trace!("Dropping stale {kind} result {src} for {}", self.element.id());
            return false;
        }

        apply_img(self.element.as_ref(), kind, src);

        true
    }
}

struct Inner {
    cache: Arc<ImgCache>,
    registry: Arc<PendingRegistry>,
    retry_callback: Option<Arc<dyn RetryCallback>>,
}

/// Drives the load, cache, fallback and retry pipeline for every element
/// linked through it, sharing one pending registry among them.
#[derive(Clone)]
pub struct ImgCacheBinding {
    inner: Arc<Inner>,
}

impl ImgCacheBinding {
    pub fn new(cache: Arc<ImgCache>) -> Self {
        let retry_callback = cache.retry_callback();

        if retry_callback.is_none() {
            debug!("No retry callback configured, failed sources will not be retried");
        }

        Self {
            inner: Arc::new(Inner {
                cache,
                registry: PendingRegistry::new(),
                retry_callback,
            }),
        }
    }

    pub fn cache(&self) -> &Arc<ImgCache> {
        &self.inner.cache
    }

    pub fn registry(&self) -> &PendingRegistry {
        &self.inner.registry
    }

    pub fn link(&self, scope: &Arc<Scope>, element: Arc<dyn ImageElement>) -> Binding {
        self.inner.registry.watch_scope(scope);

        trace!("Linking {} under {}", element.id(), scope.id());

        Binding {
            controller: self.clone(),
            target: Arc::new(BindingTarget::new(scope.clone(), element)),
        }
    }

    /// Reloads every parked element waiting on `src` and drops their entries.
    pub async fn resolve_pending(&self, src: &str) -> usize {
        self.release(src.to_string()).await
    }

    // boxed since a release can run loads that release again
    fn release(&self, src: String) -> BoxFuture<'static, usize> {
        let controller = self.clone();

        async move {
            let (entries, stale): (Vec<_>, Vec<_>) = controller
                .inner
                .registry
                .take_matching(&src)
                .into_iter()
                .partition(PendingEntry::is_current);
            let released = entries.len();

            if !stale.is_empty() {
                debug!("Dropped {} superseded entries for {src}", stale.len());
            }

            if released > 0 {
                info!("Releasing {released} pending loads for {src}");
            }

            let reloads = entries
                .into_iter()
                .map(|entry| controller.run(entry.target, entry.kind, src.clone()));
            join_all(reloads).await;

            released
        }
        .boxed()
    }

    fn run(
        &self,
        target: Arc<BindingTarget>,
        kind: BindingKind,
        src: String,
    ) -> BoxFuture<'static, LoadOutcome> {
        let controller = self.clone();

        async move {
            if src.is_empty() {
                return LoadOutcome::Skipped;
            }

            let generation = target.begin(kind);
            controller.inner.registry.supersede(
                target.scope.id(),
                target.element.id(),
                kind,
                &src,
                generation,
            );

            let cache = controller.inner.cache.clone();

            if let Err(err) = cache.ready().await {
                debug!("Cache unavailable ({err}), showing {src} directly");
                return controller
                    .fallback(target, kind, generation, src, err)
                    .await;
            }

            let local_path = match cache.is_cached(&src).await {
                Ok(()) => cache.get_cached_file_url(&src).await,
                Err(_) => match cache.cache_file(&src).await {
                    Ok(()) => cache.get_cached_file_url(&src).await,
                    Err(err) => Err(err),
                },
            };

            match local_path {
                Ok(local_path) => {
                    if !target.apply(kind, generation, &local_path) {
                        return LoadOutcome::Discarded;
                    }

                    debug!("Applied cached {local_path} for {src}");
                    LoadOutcome::Cached { local_path }
                }
                Err(err) => {
                    controller
                        .fallback(target, kind, generation, src, err)
                        .await
                }
            }
        }
        .boxed()
    }

    async fn fallback(
        &self,
        target: Arc<BindingTarget>,
        kind: BindingKind,
        generation: u64,
        src: String,
        error: CacheError,
    ) -> LoadOutcome {
        if !target.apply(kind, generation, &src) {
            return LoadOutcome::Discarded;
        }

        let Some(callback) = self.inner.retry_callback.clone() else {
            return LoadOutcome::Fallback {
                src,
                error,
                retry: RetryStatus::NotConfigured,
            };
        };

        let decision = callback.on_cache_failure(&src, &error).await;

        if !target.is_current(kind, generation) {
            debug!("Ignoring retry decision for {src}, binding moved on");
            return LoadOutcome::Fallback {
                src,
                error,
                retry: RetryStatus::Abandoned,
            };
        }

        let retry = match decision {
            Err(err) => {
                warn!("{err}, keeping {src}");
                RetryStatus::Failed(err)
            }
            Ok(RetryDecision::Defer) => match self.park(&target, kind, generation, &src) {
                true => RetryStatus::Parked,
                false => RetryStatus::AlreadyParked,
            },
            Ok(RetryDecision::Resolve(resolved)) => {
                self.park(&target, kind, generation, &src);
                RetryStatus::Released(self.release(resolved).await)
            }
            Ok(RetryDecision::Alternate(alternate)) => {
                self.inner.registry.remove_if_src(
                    target.scope.id(),
                    target.element.id(),
                    &src,
                );

                info!("Retrying {} with {alternate} instead of {src}", target.element.id());
                return self.run(target, kind, alternate).await;
            }
        };

        LoadOutcome::Fallback { src, error, retry }
    }

    fn park(
        &self,
        target: &Arc<BindingTarget>,
        kind: BindingKind,
        generation: u64,
        src: &str,
    ) -> bool {
        self.inner.registry.register(PendingEntry {
            target: target.clone(),
            kind,
            src: src.to_string(),
            generation,
        })
    }
}

#[derive(Clone)]
pub struct Binding {
    controller: ImgCacheBinding,
    target: Arc<BindingTarget>,
}

impl Binding {
    pub fn element(&self) -> &Arc<dyn ImageElement> {
        &self.target.element
    }

    pub fn scope(&self) -> &Arc<Scope> {
        &self.target.scope
    }

    pub async fn load(&self, kind: BindingKind, src: impl Into<String>) -> LoadOutcome {
        self.controller
            .run(self.target.clone(), kind, src.into())
            .await
    }

    /// Starts the pipeline in the background, the way attribute changes are delivered.
    pub fn observe(&self, kind: BindingKind, src: impl Into<String>) -> JoinHandle<LoadOutcome> {
        tokio::spawn(self.controller.run(self.target.clone(), kind, src.into()))
    }

    /// Like [`Binding::observe`], keyed by the declared attribute name (`ic-src`, `ic-bg`).
    pub fn observe_attribute(
        &self,
        attribute: &str,
        src: impl Into<String>,
    ) -> Result<JoinHandle<LoadOutcome>, BindingError> {
        let kind = BindingKind::from_str(attribute)
            .map_err(|_| BindingError::UnknownAttribute(attribute.to_string()))?;

        Ok(self.observe(kind, src))
    }
}
