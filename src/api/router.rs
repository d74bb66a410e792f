use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use super::{handlers, middleware::require_user};
use crate::AppState;

pub fn create_router(state: AppState) -> Router<AppState> {
    // Public auth routes
    let auth_routes = Router::new()
        .route("/otp/send", post(handlers::auth::send_otp))
        .route("/otp/check", post(handlers::auth::check_otp))
        .route("/login", post(handlers::auth::login))
        .route("/register", post(handlers::auth::register))
        .route("/reset-password", post(handlers::auth::reset_password))
        .route("/oauth", post(handlers::auth::oauth))
        .route("/refresh", post(handlers::auth::refresh))
        .route("/logout", post(handlers::auth::logout))
        .route(
            "/wx/code",
            get(handlers::wechat::generate_qr_code).post(handlers::wechat::poll_login),
        )
        .route(
            "/wx",
            get(handlers::wechat::verify_server).post(handlers::wechat::handle_event),
        );

    // Protected auth routes
    let auth_protected = Router::new()
        .route(
            "/reset-password/set-password",
            post(handlers::auth::set_password),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_user));

    // User routes (protected)
    let user_routes = Router::new()
        .route("/me", get(handlers::users::get_current_user))
        .layer(middleware::from_fn_with_state(state.clone(), require_user));

    // Task routes (protected)
    let task_routes = Router::new()
        .route(
            "/",
            get(handlers::tasks::list_tasks)
                .put(handlers::tasks::create_task)
                .post(handlers::tasks::update_task)
                .delete(handlers::tasks::delete_task),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_user));

    // Tag routes (protected)
    let tag_routes = Router::new()
        .route(
            "/",
            get(handlers::tags::list_tags)
                .put(handlers::tags::create_tags)
                .post(handlers::tags::update_tags)
                .delete(handlers::tags::delete_tags),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_user));

    // Combine all routes
    Router::new()
        .nest("/auth", auth_routes.merge(auth_protected))
        .nest("/users", user_routes)
        .nest("/tasks", task_routes)
        .nest("/tags", tag_routes)
        .with_state(state)
}
