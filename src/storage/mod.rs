use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppResult;

#[cfg(test)]
pub mod memory;
pub mod postgres;
pub mod redis;
pub mod repository;

pub use repository::{TagRepository, TaskRepository, UserRepository};

/// Key-value store whose entries expire on their own.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Returns whether a key was removed.
    async fn del(&self, key: &str) -> AppResult<bool>;

    /// Removes `key` only while it still holds `expected`, atomically.
    async fn del_if_eq(&self, key: &str, expected: &str) -> AppResult<bool>;

    /// Increments a counter, (re)arming its expiry, and returns the new value.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> AppResult<i64>;
}
