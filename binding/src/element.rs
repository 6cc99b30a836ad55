use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use common::binding::{BindingKind, ElementId};

pub const SRC_ATTRIBUTE: &str = "src";
pub const BACKGROUND_IMAGE_STYLE: &str = "background-image";

/// A host element an image binding can write to.
pub trait ImageElement: Send + Sync {
    fn id(&self) -> ElementId;

    fn set_attribute(&self, name: &str, value: &str);

    fn set_style(&self, property: &str, value: &str);
}

fn to_style(url: &str) -> String {
    format!("url({url})")
}

/// Writes `src` to the part of `element` the binding kind targets.
pub fn apply_img(element: &dyn ImageElement, kind: BindingKind, src: &str) {
    match kind {
        BindingKind::Src => element.set_attribute(SRC_ATTRIBUTE, src),
        BindingKind::Background => element.set_style(BACKGROUND_IMAGE_STYLE, &to_style(src)),
    }
}

#[derive(Default)]
struct ElementState {
    attributes: HashMap<String, String>,
    styles: HashMap<String, String>,
}

/// Element kept entirely in memory, for headless hosts and tests.
pub struct MemoryElement {
    id: ElementId,
    state: Mutex<ElementState>,
    writes: AtomicUsize,
}

impl Default for MemoryElement {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryElement {
    pub fn new() -> Self {
        Self {
            id: ElementId::next(),
            state: Mutex::new(ElementState::default()),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.lock().attributes.get(name).cloned()
    }

    pub fn style(&self, property: &str) -> Option<String> {
        self.lock().styles.get(property).cloned()
    }

    pub fn src(&self) -> Option<String> {
        self.attribute(SRC_ATTRIBUTE)
    }

    pub fn background_image(&self) -> Option<String> {
        self.style(BACKGROUND_IMAGE_STYLE)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, ElementState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ImageElement for MemoryElement {
    fn id(&self) -> ElementId {
        self.id
    }

    fn set_attribute(&self, name: &str, value: &str) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .attributes
            .insert(name.to_string(), value.to_string());
    }

    fn set_style(&self, property: &str, value: &str) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .styles
            .insert(property.to_string(), value.to_string());
    }
}
