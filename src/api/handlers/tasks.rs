use axum::{extract::State, Extension};
use serde::Deserialize;

use crate::{
    api::{extract::ApiJson, response::ApiResponse},
    error::{AppError, AppResult},
    models::{NewTask, Task, TaskUpdate, User},
    AppState,
};

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> AppResult<ApiResponse<Vec<Task>>> {
    let tasks = state.tasks.list(user.id).await?;
    Ok(ApiResponse::ok(tasks, "ok"))
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiJson(req): ApiJson<NewTask>,
) -> AppResult<ApiResponse<Task>> {
    req.validate()?;

    let task = state.tasks.create(user.id, req).await?;
    tracing::debug!(task_id = task.id, "Task created");
    Ok(ApiResponse::ok(task, "Task created"))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub id: i64,
    #[serde(flatten)]
    pub fields: TaskUpdate,
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiJson(req): ApiJson<UpdateTaskRequest>,
) -> AppResult<ApiResponse<Task>> {
    req.fields.validate()?;

    let task = state
        .tasks
        .update(user.id, req.id, req.fields)
        .await?
        .ok_or(AppError::TaskNotFound)?;
    Ok(ApiResponse::ok(task, "Task updated"))
}

#[derive(Debug, Deserialize)]
pub struct DeleteTaskRequest {
    pub id: i64,
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiJson(req): ApiJson<DeleteTaskRequest>,
) -> AppResult<ApiResponse<()>> {
    if !state.tasks.delete(user.id, req.id).await? {
        return Err(AppError::TaskNotFound);
    }
    Ok(ApiResponse::message("Task deleted"))
}
