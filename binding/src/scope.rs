use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use common::binding::ScopeId;
use tracing::debug;

type Teardown = Box<dyn FnOnce(ScopeId) + Send>;

/// Lifetime of a host view. Bindings linked under a scope stop applying
/// results and lose their pending retries once it is destroyed.
pub struct Scope {
    id: ScopeId,
    destroyed: AtomicBool,
    teardown: Mutex<Vec<Teardown>>,
}

impl Scope {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ScopeId::next(),
            destroyed: AtomicBool::new(false),
            teardown: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Registers a teardown hook. Returns `false` if the scope is already gone.
    pub fn on_destroy(&self, hook: impl FnOnce(ScopeId) + Send + 'static) -> bool {
        let mut teardown = self.teardown.lock().unwrap_or_else(PoisonError::into_inner);

        if self.is_destroyed() {
            return false;
        }

        teardown.push(Box::new(hook));

        true
    }

    pub fn destroy(&self) {
        let hooks = {
            let mut teardown = self.teardown.lock().unwrap_or_else(PoisonError::into_inner);

            if self.destroyed.swap(true, Ordering::AcqRel) {
                return;
            }

            std::mem::take(&mut *teardown)
        };

        debug!("Destroying {} ({} teardown hooks)", self.id, hooks.len());

        for hook in hooks {
            hook(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn hooks_run_once() {
        let scope = Scope::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        assert!(scope.on_destroy(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        scope.destroy();
        scope.destroy();

        assert!(scope.is_destroyed());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!scope.on_destroy(|_| {}));
    }
}
