//! In-process stand-ins for Redis and PostgreSQL used by the test suite.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{
    repository::{TagRepository, TaskRepository, UserRepository},
    KvStore,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        NewTag, NewTask, NewUser, Tag, TagUpdate, Task, TaskUpdate, User, UserKey, UserUpdate,
        DEFAULT_PRIORITY, DEFAULT_STATUS, DEFAULT_TAG_COLOR,
    },
};

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a live key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .and_then(|(_, expires_at)| expires_at.checked_duration_since(Instant::now()))
    }

    /// Drops a key as if its TTL had run out.
    pub fn expire(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    fn live(entries: &mut HashMap<String, (String, Instant)>, key: &str) -> Option<String> {
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                entries.remove(key);
                None
            }
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        Ok(Self::live(&mut entries, key))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn del(&self, key: &str) -> AppResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        let existed = Self::live(&mut entries, key).is_some();
        entries.remove(key);
        Ok(existed)
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> AppResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        if Self::live(&mut entries, key).as_deref() == Some(expected) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> AppResult<i64> {
        let mut entries = self.entries.lock().unwrap();
        let current = Self::live(&mut entries, key)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        entries.insert(key.to_string(), (next.to_string(), Instant::now() + ttl));
        Ok(next)
    }
}

#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<Vec<User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by(&self, key: UserKey) -> AppResult<Option<User>> {
        let users = self.users.lock().unwrap();
        let found = users.iter().find(|u| match &key {
            UserKey::UserId(user_id) => u.user_id == *user_id,
            UserKey::Email(email) => u.email.as_ref() == Some(email),
            UserKey::Phone(phone) => u.phone.as_ref() == Some(phone),
            UserKey::WxId(wx_id) => u.wx_id.as_ref() == Some(wx_id),
            UserKey::GoogleId(google_id) => u.google_id.as_ref() == Some(google_id),
        });
        Ok(found.cloned())
    }

    async fn create(&self, user: NewUser) -> AppResult<User> {
        user.validate()?;

        let mut users = self.users.lock().unwrap();
        let duplicate = users.iter().any(|u| {
            (user.email.is_some() && u.email == user.email)
                || (user.phone.is_some() && u.phone == user.phone)
                || (user.wx_id.is_some() && u.wx_id == user.wx_id)
                || (user.google_id.is_some() && u.google_id == user.google_id)
        });
        if duplicate {
            return Err(AppError::UserAlreadyExists);
        }

        let now = Utc::now();
        let created = User {
            id: users.len() as i64 + 1,
            user_id: Uuid::new_v4(),
            email: user.email,
            phone: user.phone,
            password_hash: user.password_hash,
            google_id: user.google_id,
            wx_id: user.wx_id,
            github_id: None,
            name: user.name,
            avatar: user.avatar,
            created_at: now,
            updated_at: now,
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, update: UserUpdate) -> AppResult<User> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(AppError::UserNotFound)?;

        if update.password_hash.is_some() {
            user.password_hash = update.password_hash;
        }
        if update.google_id.is_some() {
            user.google_id = update.google_id;
        }
        if update.wx_id.is_some() {
            user.wx_id = update.wx_id;
        }
        if update.name.is_some() {
            user.name = update.name;
        }
        if update.avatar.is_some() {
            user.avatar = update.avatar;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[derive(Default)]
pub struct MemoryTodoRepository {
    tasks: Mutex<Vec<Task>>,
    tags: Mutex<Vec<Tag>>,
    next_id: Mutex<i64>,
}

impl MemoryTodoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        *next
    }
}

#[async_trait]
impl TaskRepository for MemoryTodoRepository {
    async fn list(&self, owner: i64) -> AppResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks.iter().filter(|t| t.user_id == owner).cloned().collect())
    }

    async fn create(&self, owner: i64, task: NewTask) -> AppResult<Task> {
        let now = Utc::now();
        let created = Task {
            id: self.next_id(),
            user_id: owner,
            title: task.title,
            description: task.description,
            priority: task.priority.unwrap_or(DEFAULT_PRIORITY),
            status: DEFAULT_STATUS.to_string(),
            favorite: task.favorite,
            tags: task.tags,
            end_at: task.end_at,
            created_at: now,
            updated_at: now,
        };
        self.tasks.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update(&self, owner: i64, id: i64, update: TaskUpdate) -> AppResult<Option<Task>> {
        let mut tasks = self.tasks.lock().unwrap();
        let Some(task) = tasks.iter_mut().find(|t| t.id == id && t.user_id == owner) else {
            return Ok(None);
        };

        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(favorite) = update.favorite {
            task.favorite = favorite;
        }
        if let Some(tags) = update.tags {
            task.tags = tags;
        }
        if let Some(end_at) = update.end_at {
            task.end_at = end_at;
        }
        task.updated_at = Utc::now();
        Ok(Some(task.clone()))
    }

    async fn delete(&self, owner: i64, id: i64) -> AppResult<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|t| !(t.id == id && t.user_id == owner));
        Ok(tasks.len() < before)
    }
}

#[async_trait]
impl TagRepository for MemoryTodoRepository {
    async fn list(&self, owner: i64) -> AppResult<Vec<Tag>> {
        let tags = self.tags.lock().unwrap();
        Ok(tags.iter().filter(|t| t.user_id == owner).cloned().collect())
    }

    async fn create_many(&self, owner: i64, tags: Vec<NewTag>) -> AppResult<Vec<Tag>> {
        let created: Vec<Tag> = tags
            .into_iter()
            .map(|tag| Tag {
                id: self.next_id(),
                user_id: owner,
                text: tag.text,
                color: tag.color.unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string()),
                created_at: Utc::now(),
            })
            .collect();
        self.tags.lock().unwrap().extend(created.iter().cloned());
        Ok(created)
    }

    async fn update_many(&self, owner: i64, updates: Vec<TagUpdate>) -> AppResult<u64> {
        let mut tags = self.tags.lock().unwrap();
        let mut updated = 0;
        for update in updates {
            if let Some(tag) = tags.iter_mut().find(|t| t.id == update.id && t.user_id == owner) {
                tag.text = update.text;
                tag.color = update.color;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_many(&self, owner: i64, ids: Vec<i64>) -> AppResult<u64> {
        let mut tags = self.tags.lock().unwrap();
        let before = tags.len();
        tags.retain(|t| !(t.user_id == owner && ids.contains(&t.id)));
        Ok((before - tags.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn del_if_eq_only_removes_matching_value() {
        let store = MemoryStore::new();
        store
            .set_ex("wx:code:abc", "st-1-oid", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(!store.del_if_eq("wx:code:abc", "st-0").await.unwrap());
        assert!(store.del_if_eq("wx:code:abc", "st-1-oid").await.unwrap());
        assert!(!store.del_if_eq("wx:code:abc", "st-1-oid").await.unwrap());
        assert_eq!(store.get("wx:code:abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", Duration::ZERO).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.incr_with_ttl("n", Duration::from_secs(5)).await.unwrap(), 1);
        assert_eq!(store.incr_with_ttl("n", Duration::from_secs(5)).await.unwrap(), 2);
    }
}
