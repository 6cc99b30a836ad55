mod controller;
pub mod element;
pub mod errors;
mod registry;
mod scope;

pub use controller::{Binding, ImgCacheBinding, LoadOutcome, RetryStatus};
pub use element::{ImageElement, MemoryElement};
pub use errors::BindingError;
pub use registry::{PendingEntry, PendingRegistry};
pub use scope::Scope;
