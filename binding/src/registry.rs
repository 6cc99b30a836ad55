use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use common::binding::{BindingKind, ElementId, ScopeId};
use tracing::{debug, trace};

use crate::{controller::BindingTarget, scope::Scope};

type EntryKey = (ScopeId, ElementId);

/// An element parked after a failed cache attempt, waiting for its source to be resolved.
#[derive(Clone)]
pub struct PendingEntry {
    pub(crate) target: Arc<BindingTarget>,
    pub(crate) kind: BindingKind,
    pub(crate) src: String,
    pub(crate) generation: u64,
}

impl PendingEntry {
    pub fn scope_id(&self) -> ScopeId {
        self.target.scope.id()
    }

    pub fn element_id(&self) -> ElementId {
        self.target.element.id()
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    fn key(&self) -> EntryKey {
        (self.scope_id(), self.element_id())
    }

    pub(crate) fn is_current(&self) -> bool {
        self.target.is_current(self.kind, self.generation)
    }
}

/// Pending retries of every element linked through one controller,
/// at most one per `(scope, element)`.
#[derive(Default)]
pub struct PendingRegistry {
    entries: Mutex<HashMap<EntryKey, PendingEntry>>,
    watched_scopes: Mutex<HashSet<ScopeId>>,
}

impl PendingRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<EntryKey, PendingEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Prunes the scope's entries when it is destroyed. Hooks a scope only once.
    pub(crate) fn watch_scope(self: &Arc<Self>, scope: &Scope) {
        let newly_watched = self
            .watched_scopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scope.id());

        if !newly_watched {
            return;
        }

        let registry: Weak<Self> = Arc::downgrade(self);
        let hooked = scope.on_destroy(move |scope_id| {
            if let Some(registry) = registry.upgrade() {
                registry.prune_scope(scope_id);
                registry.unwatch_scope(scope_id);
            }
        });

        if !hooked {
            self.unwatch_scope(scope.id());
        }
    }

    fn unwatch_scope(&self, scope: ScopeId) {
        self.watched_scopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&scope);
    }

    /// Parks `entry` unless its element is already parked or its scope is gone.
    pub(crate) fn register(&self, entry: PendingEntry) -> bool {
        let mut entries = self.entries();

        if entry.target.scope.is_destroyed() {
            trace!("Not parking {} for destroyed {}", entry.src, entry.scope_id());
            return false;
        }

        let key = entry.key();
        if entries.contains_key(&key) {
            trace!("{} in {} is already pending", key.1, key.0);
            return false;
        }

        debug!("Parking {} for {} in {}", entry.src, key.1, key.0);
        entries.insert(key, entry);

        true
    }

    /// Drops the element's entry if it still targets `src`.
    pub(crate) fn remove_if_src(&self, scope: ScopeId, element: ElementId, src: &str) -> bool {
        let mut entries = self.entries();

        match entries.get(&(scope, element)) {
            Some(entry) if entry.src == src => {
                entries.remove(&(scope, element));
                true
            }
            _ => false,
        }
    }

    /// A new load of `src` for `kind` drops an entry parked on another source.
    pub(crate) fn supersede(
        &self,
        scope: ScopeId,
        element: ElementId,
        kind: BindingKind,
        src: &str,
        generation: u64,
    ) {
        let mut entries = self.entries();

        let Some(entry) = entries.get_mut(&(scope, element)) else {
            return;
        };

        if entry.kind != kind {
            return;
        }

        if entry.src == src {
            entry.generation = generation;
        } else {
            debug!("Dropping {} pending for {element}, now showing {src}", entry.src);
            entries.remove(&(scope, element));
        }
    }

    pub(crate) fn take_matching(&self, src: &str) -> Vec<PendingEntry> {
        let mut entries = self.entries();

        let keys: Vec<EntryKey> = entries
            .iter()
            .filter(|(_, entry)| entry.src == src)
            .map(|(key, _)| *key)
            .collect();

        keys.iter().filter_map(|key| entries.remove(key)).collect()
    }

    pub fn prune_scope(&self, scope: ScopeId) -> usize {
        let mut entries = self.entries();
        let before = entries.len();

        entries.retain(|(entry_scope, _), _| *entry_scope != scope);

        let pruned = before - entries.len();
        debug!("Pruned {pruned} pending entries of {scope}");

        pruned
    }

    pub fn pending_src(&self, scope: ScopeId, element: ElementId) -> Option<String> {
        self.entries()
            .get(&(scope, element))
            .map(|entry| entry.src.clone())
    }

    pub fn snapshot(&self) -> Vec<PendingEntry> {
        self.entries().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ImageElement, MemoryElement};

    fn entry(scope: &Arc<Scope>, element: &Arc<MemoryElement>, src: &str) -> PendingEntry {
        PendingEntry {
            target: Arc::new(BindingTarget::new(scope.clone(), element.clone())),
            kind: BindingKind::Src,
            src: src.to_string(),
            generation: 0,
        }
    }

    #[test]
    fn one_entry_per_scope_and_element() {
        let registry = PendingRegistry::new();
        let scope = Scope::new();
        let element = Arc::new(MemoryElement::new());

        assert!(registry.register(entry(&scope, &element, "a.jpg")));
        assert!(!registry.register(entry(&scope, &element, "b.jpg")));

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.pending_src(scope.id(), element.id()).as_deref(),
            Some("a.jpg")
        );
    }

    #[test]
    fn same_source_on_different_elements_is_tracked_separately() {
        let registry = PendingRegistry::new();
        let scope = Scope::new();
        let first = Arc::new(MemoryElement::new());
        let second = Arc::new(MemoryElement::new());

        assert!(registry.register(entry(&scope, &first, "a.jpg")));
        assert!(registry.register(entry(&scope, &second, "a.jpg")));

        let taken = registry.take_matching("a.jpg");
        assert_eq!(taken.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_only_when_source_still_matches() {
        let registry = PendingRegistry::new();
        let scope = Scope::new();
        let element = Arc::new(MemoryElement::new());
        registry.register(entry(&scope, &element, "a.jpg"));

        assert!(!registry.remove_if_src(scope.id(), element.id(), "b.jpg"));
        assert!(registry.remove_if_src(scope.id(), element.id(), "a.jpg"));
        assert!(registry.is_empty());
    }

    #[test]
    fn new_value_drops_entry_parked_on_another_source() {
        let registry = PendingRegistry::new();
        let scope = Scope::new();
        let element = Arc::new(MemoryElement::new());
        registry.register(entry(&scope, &element, "a.jpg"));

        registry.supersede(scope.id(), element.id(), BindingKind::Background, "b.jpg", 1);
        assert_eq!(registry.len(), 1);

        registry.supersede(scope.id(), element.id(), BindingKind::Src, "a.jpg", 2);
        assert_eq!(registry.snapshot()[0].generation, 2);

        registry.supersede(scope.id(), element.id(), BindingKind::Src, "b.jpg", 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn scope_teardown_prunes_only_its_entries() {
        let registry = PendingRegistry::new();
        let doomed = Scope::new();
        let survivor = Scope::new();
        let element = Arc::new(MemoryElement::new());

        registry.watch_scope(&doomed);
        registry.watch_scope(&doomed);
        registry.watch_scope(&survivor);

        registry.register(entry(&doomed, &element, "a.jpg"));
        registry.register(entry(&survivor, &element, "a.jpg"));

        doomed.destroy();

        let remaining = registry.snapshot();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].scope_id(), survivor.id());
    }

    #[test]
    fn destroyed_scope_cannot_park() {
        let registry = PendingRegistry::new();
        let scope = Scope::new();
        let element = Arc::new(MemoryElement::new());

        scope.destroy();

        assert!(!registry.register(entry(&scope, &element, "a.jpg")));
        assert!(registry.is_empty());
    }
}
