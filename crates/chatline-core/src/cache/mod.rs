//! Conversation cache: backend port, in-process backend and the TTL cache
//! layer that degrades to a no-op when the backend is unreachable.

pub mod backend;
pub mod layer;
pub mod memory;

pub use backend::CacheBackend;
pub use layer::{CacheLayer, CacheStats, Lookup};
pub use memory::MemoryCacheBackend;
