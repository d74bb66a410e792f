use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::{NewTag, NewTask, NewUser, Tag, TagUpdate, Task, TaskUpdate, User, UserKey, UserUpdate},
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by(&self, key: UserKey) -> AppResult<Option<User>>;

    async fn create(&self, user: NewUser) -> AppResult<User>;

    async fn update(&self, id: i64, update: UserUpdate) -> AppResult<User>;
}

/// Tasks are always scoped to their owner's internal user id.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn list(&self, owner: i64) -> AppResult<Vec<Task>>;

    async fn create(&self, owner: i64, task: NewTask) -> AppResult<Task>;

    async fn update(&self, owner: i64, id: i64, update: TaskUpdate) -> AppResult<Option<Task>>;

    async fn delete(&self, owner: i64, id: i64) -> AppResult<bool>;
}

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn list(&self, owner: i64) -> AppResult<Vec<Tag>>;

    async fn create_many(&self, owner: i64, tags: Vec<NewTag>) -> AppResult<Vec<Tag>>;

    /// Returns how many of the given tags belonged to `owner` and were updated.
    async fn update_many(&self, owner: i64, tags: Vec<TagUpdate>) -> AppResult<u64>;

    async fn delete_many(&self, owner: i64, ids: Vec<i64>) -> AppResult<u64>;
}
