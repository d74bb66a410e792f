use axum::{extract::State, Extension};
use serde::Deserialize;

use crate::{
    api::{extract::ApiJson, response::ApiResponse},
    error::{AppError, AppResult},
    models::{NewTag, Tag, TagUpdate, User},
    AppState,
};

async fn current_tags(state: &AppState, user: &User, message: &str) -> AppResult<ApiResponse<Vec<Tag>>> {
    let tags = state.tags.list(user.id).await?;
    Ok(ApiResponse::ok(tags, message))
}

pub async fn list_tags(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> AppResult<ApiResponse<Vec<Tag>>> {
    current_tags(&state, &user, "ok").await
}

pub async fn create_tags(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiJson(req): ApiJson<Vec<NewTag>>,
) -> AppResult<ApiResponse<Vec<Tag>>> {
    for tag in &req {
        tag.validate()?;
    }

    if !req.is_empty() {
        state.tags.create_many(user.id, req).await?;
    }
    current_tags(&state, &user, "Tags created").await
}

pub async fn update_tags(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiJson(req): ApiJson<Vec<TagUpdate>>,
) -> AppResult<ApiResponse<Vec<Tag>>> {
    if !req.is_empty() && state.tags.update_many(user.id, req).await? == 0 {
        return Err(AppError::TagNotFound);
    }
    current_tags(&state, &user, "Tags updated").await
}

#[derive(Debug, Deserialize)]
pub struct DeleteTagsRequest {
    pub id: Vec<i64>,
}

pub async fn delete_tags(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiJson(req): ApiJson<DeleteTagsRequest>,
) -> AppResult<ApiResponse<Vec<Tag>>> {
    let deleted = state.tags.delete_many(user.id, req.id).await?;
    tracing::debug!(deleted, "Tags deleted");
    current_tags(&state, &user, "Tags deleted").await
}
