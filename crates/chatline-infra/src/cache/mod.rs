//! Cache backends: Redis, plus runtime selection between Redis and the
//! in-process backend from `chatline-core`.

pub mod redis;
pub mod selected;

pub use self::redis::RedisCacheBackend;
pub use self::selected::SelectedCacheBackend;
