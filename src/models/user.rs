use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i64,
    pub user_id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub wx_id: Option<String>,
    pub github_id: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lookup keys accepted by the user repository.
#[derive(Debug, Clone)]
pub enum UserKey {
    UserId(Uuid),
    Email(String),
    Phone(String),
    WxId(String),
    GoogleId(String),
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub wx_id: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

impl NewUser {
    /// A user must be reachable through at least one identity.
    pub fn validate(&self) -> AppResult<()> {
        let has_identity = [&self.email, &self.phone, &self.google_id, &self.wx_id]
            .iter()
            .any(|field| field.as_deref().is_some_and(|v| !v.is_empty()));

        if !has_identity {
            return Err(AppError::Validation(
                "One of email, phone, Google or WeChat identity is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub wx_id: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.password_hash.is_none()
            && self.google_id.is_none()
            && self.wx_id.is_none()
            && self.name.is_none()
            && self.avatar.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_ttl: Duration,
}
