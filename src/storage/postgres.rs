use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repository::{TagRepository, TaskRepository, UserRepository};
use crate::{
    error::{AppError, AppResult},
    models::{
        NewTag, NewTask, NewUser, Tag, TagUpdate, Task, TaskUpdate, User, UserKey, UserUpdate,
        DEFAULT_PRIORITY, DEFAULT_STATUS, DEFAULT_TAG_COLOR,
    },
};

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by(&self, key: UserKey) -> AppResult<Option<User>> {
        let user: Option<User> = match key {
            UserKey::UserId(user_id) => {
                sqlx::query_as("SELECT * FROM users WHERE user_id = $1")
                    .bind(user_id)
                    .fetch_optional(&self.db)
                    .await?
            }
            UserKey::Email(email) => {
                sqlx::query_as("SELECT * FROM users WHERE email = $1")
                    .bind(email)
                    .fetch_optional(&self.db)
                    .await?
            }
            UserKey::Phone(phone) => {
                sqlx::query_as("SELECT * FROM users WHERE phone = $1")
                    .bind(phone)
                    .fetch_optional(&self.db)
                    .await?
            }
            UserKey::WxId(wx_id) => {
                sqlx::query_as("SELECT * FROM users WHERE wx_id = $1")
                    .bind(wx_id)
                    .fetch_optional(&self.db)
                    .await?
            }
            UserKey::GoogleId(google_id) => {
                sqlx::query_as("SELECT * FROM users WHERE google_id = $1")
                    .bind(google_id)
                    .fetch_optional(&self.db)
                    .await?
            }
        };

        Ok(user)
    }

    async fn create(&self, user: NewUser) -> AppResult<User> {
        user.validate()?;

        let created: User = sqlx::query_as(
            r#"
            INSERT INTO users (user_id, email, phone, password_hash, google_id, wx_id, name, avatar)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(&user.google_id)
        .bind(&user.wx_id)
        .bind(&user.name)
        .bind(&user.avatar)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::UserAlreadyExists,
            other => AppError::Database(other),
        })?;

        Ok(created)
    }

    async fn update(&self, id: i64, update: UserUpdate) -> AppResult<User> {
        let user: Option<User> = sqlx::query_as(
            r#"
            UPDATE users
            SET password_hash = COALESCE($1, password_hash),
                google_id = COALESCE($2, google_id),
                wx_id = COALESCE($3, wx_id),
                name = COALESCE($4, name),
                avatar = COALESCE($5, avatar),
                updated_at = NOW()
            WHERE id = $6
            RETURNING *
            "#,
        )
        .bind(&update.password_hash)
        .bind(&update.google_id)
        .bind(&update.wx_id)
        .bind(&update.name)
        .bind(&update.avatar)
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        user.ok_or(AppError::UserNotFound)
    }
}

#[derive(Clone)]
pub struct PgTodoRepository {
    db: PgPool,
}

impl PgTodoRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskRepository for PgTodoRepository {
    async fn list(&self, owner: i64) -> AppResult<Vec<Task>> {
        let tasks: Vec<Task> =
            sqlx::query_as("SELECT * FROM tasks WHERE user_id = $1 ORDER BY created_at DESC")
                .bind(owner)
                .fetch_all(&self.db)
                .await?;
        Ok(tasks)
    }

    async fn create(&self, owner: i64, task: NewTask) -> AppResult<Task> {
        let created: Task = sqlx::query_as(
            r#"
            INSERT INTO tasks (user_id, title, description, priority, status, favorite, tags, end_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(owner)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority.unwrap_or(DEFAULT_PRIORITY))
        .bind(DEFAULT_STATUS)
        .bind(task.favorite)
        .bind(&task.tags)
        .bind(task.end_at)
        .fetch_one(&self.db)
        .await?;
        Ok(created)
    }

    async fn update(&self, owner: i64, id: i64, update: TaskUpdate) -> AppResult<Option<Task>> {
        let task: Option<Task> = sqlx::query_as(
            r#"
            UPDATE tasks
            SET title = COALESCE($1, title),
                description = CASE WHEN $2 THEN $3 ELSE description END,
                priority = COALESCE($4, priority),
                status = COALESCE($5, status),
                favorite = COALESCE($6, favorite),
                tags = COALESCE($7, tags),
                end_at = CASE WHEN $8 THEN $9 ELSE end_at END,
                updated_at = NOW()
            WHERE id = $10 AND user_id = $11
            RETURNING *
            "#,
        )
        .bind(&update.title)
        .bind(update.description.is_some())
        .bind(update.description.flatten())
        .bind(update.priority)
        .bind(&update.status)
        .bind(update.favorite)
        .bind(&update.tags)
        .bind(update.end_at.is_some())
        .bind(update.end_at.flatten())
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?;
        Ok(task)
    }

    async fn delete(&self, owner: i64, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TagRepository for PgTodoRepository {
    async fn list(&self, owner: i64) -> AppResult<Vec<Tag>> {
        let tags: Vec<Tag> =
            sqlx::query_as("SELECT * FROM tags WHERE user_id = $1 ORDER BY id")
                .bind(owner)
                .fetch_all(&self.db)
                .await?;
        Ok(tags)
    }

    async fn create_many(&self, owner: i64, tags: Vec<NewTag>) -> AppResult<Vec<Tag>> {
        let mut tx = self.db.begin().await?;

        let mut created = Vec::with_capacity(tags.len());
        for tag in tags {
            let row: Tag = sqlx::query_as(
                "INSERT INTO tags (user_id, text, color) VALUES ($1, $2, $3) RETURNING *",
            )
            .bind(owner)
            .bind(&tag.text)
            .bind(tag.color.as_deref().unwrap_or(DEFAULT_TAG_COLOR))
            .fetch_one(&mut *tx)
            .await?;
            created.push(row);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn update_many(&self, owner: i64, tags: Vec<TagUpdate>) -> AppResult<u64> {
        let mut tx = self.db.begin().await?;

        let mut updated = 0;
        for tag in tags {
            let result =
                sqlx::query("UPDATE tags SET text = $1, color = $2 WHERE id = $3 AND user_id = $4")
                    .bind(&tag.text)
                    .bind(&tag.color)
                    .bind(tag.id)
                    .bind(owner)
                    .execute(&mut *tx)
                    .await?;
            updated += result.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_many(&self, owner: i64, ids: Vec<i64>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM tags WHERE id = ANY($1) AND user_id = $2")
            .bind(&ids)
            .bind(owner)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
