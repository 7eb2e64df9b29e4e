//! Key-value store adapters implementing [`KeyValueStore`].
//!
//! [`KeyValueStore`]: crate::domain::ports::KeyValueStore

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::{RedisPool, RedisPoolConfig, RedisStore};
