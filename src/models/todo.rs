use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};

pub const DEFAULT_PRIORITY: i32 = 3;
pub const MAX_PRIORITY: i32 = 5;
pub const DEFAULT_STATUS: &str = "doing";
pub const DEFAULT_TAG_COLOR: &str = "#ffffff";
pub const TASK_STATUSES: [&str; 4] = ["doing", "done", "late", "unknow"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    #[serde(skip_serializing)]
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub priority: i32,
    pub status: String,
    pub favorite: bool,
    pub tags: Vec<i64>,
    pub end_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<i32>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub tags: Vec<i64>,
    pub end_at: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn validate(&self) -> AppResult<()> {
        validate_title(&self.title)?;
        if let Some(priority) = self.priority {
            validate_priority(priority)?;
        }
        Ok(())
    }
}

/// Partial task update. For `description` and `endAt`, an absent field keeps
/// the column and an explicit `null` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub priority: Option<i32>,
    pub status: Option<String>,
    pub favorite: Option<bool>,
    pub tags: Option<Vec<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub end_at: Option<Option<DateTime<Utc>>>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TaskUpdate {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(priority) = self.priority {
            validate_priority(priority)?;
        }
        if let Some(status) = &self.status {
            if !TASK_STATUSES.contains(&status.as_str()) {
                return Err(AppError::Validation(format!("Unknown task status: {}", status)));
            }
        }
        Ok(())
    }
}

fn validate_title(title: &str) -> AppResult<()> {
    if title.trim().is_empty() {
        return Err(AppError::Validation("Task title is required".to_string()));
    }
    Ok(())
}

fn validate_priority(priority: i32) -> AppResult<()> {
    if !(0..=MAX_PRIORITY).contains(&priority) {
        return Err(AppError::Validation(format!(
            "Priority must be between 0 and {}",
            MAX_PRIORITY
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    #[serde(skip_serializing)]
    pub user_id: i64,
    pub text: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTag {
    pub text: String,
    pub color: Option<String>,
}

impl NewTag {
    pub fn validate(&self) -> AppResult<()> {
        if self.text.trim().is_empty() {
            return Err(AppError::Validation("Tag text is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagUpdate {
    pub id: i64,
    pub text: String,
    pub color: String,
}
