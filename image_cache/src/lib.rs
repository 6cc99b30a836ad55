mod cache;
pub mod errors;
mod memory_cache;
pub mod retry;
pub mod traits;

pub use cache::ImgCache;
pub use errors::{CacheError, EngineError};
pub use memory_cache::{EngineStats, MemoryEngine};
pub use retry::{RetryCallback, RetryCallbacks, RetryDecision, RetryError, RetryFn};
pub use traits::CacheEngine;
