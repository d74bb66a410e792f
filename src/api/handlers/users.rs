use axum::Extension;

use crate::{api::response::ApiResponse, models::User};

pub async fn get_current_user(Extension(user): Extension<User>) -> ApiResponse<User> {
    ApiResponse::ok(user, "ok")
}
