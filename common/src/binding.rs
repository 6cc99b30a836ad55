use std::{
    fmt::{Display, Formatter, Result},
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use strum_macros::EnumString;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Which part of an element a binding writes to.
///
/// Parses from the attribute names a host uses to declare the binding,
/// `ic-src` for the image source and `ic-bg` for the background image.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Deserialize, Serialize, EnumString)]
#[serde(rename_all = "kebab-case")]
pub enum BindingKind {
    #[strum(serialize = "ic-src", serialize = "src")]
    #[serde(rename = "ic-src")]
    Src,
    #[strum(serialize = "ic-bg", serialize = "bg")]
    #[serde(rename = "ic-bg")]
    Background,
}

impl BindingKind {
    pub fn attribute_name(&self) -> &'static str {
        match self {
            BindingKind::Src => "ic-src",
            BindingKind::Background => "ic-bg",
        }
    }
}

impl Display for BindingKind {
    fn fmt(&self, format: &mut Formatter) -> Result {
        write!(format, "{}", self.attribute_name())
    }
}

/// Identity of a host view whose teardown releases its pending retries.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    pub fn next() -> Self {
        Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for ScopeId {
    fn fmt(&self, format: &mut Formatter) -> Result {
        write!(format, "scope#{}", self.0)
    }
}

/// Identity of a bound element, stable for the element's lifetime.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    pub fn next() -> Self {
        Self(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for ElementId {
    fn fmt(&self, format: &mut Formatter) -> Result {
        write!(format, "element#{}", self.0)
    }
}
