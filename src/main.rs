use std::{any::Any, sync::Arc};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod models;
mod services;
mod storage;

#[cfg(test)]
mod tests;

use api::response::ApiResponse;
use config::Config;
use services::{
    notifier::{LogNotifier, Notifier, SmtpNotifier},
    oauth::{GoogleProvider, OAuthProvider},
    token::TokenService,
    wechat::{WechatApi, WechatClient},
};
use storage::{
    postgres::{PgTodoRepository, PgUserRepository},
    redis::RedisClient,
    KvStore, TagRepository, TaskRepository, UserRepository,
};

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub kv: Arc<dyn KvStore>,
    pub users: Arc<dyn UserRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub tags: Arc<dyn TagRepository>,
    pub notifier: Arc<dyn Notifier>,
    pub wechat: Arc<dyn WechatApi>,
    pub google: Arc<dyn OAuthProvider>,
    pub tokens: TokenService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lifepilot_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load();
    tracing::info!("Starting server in {} mode", config.server.environment);

    // Initialize database pool
    let db = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database_url())
        .await?;
    tracing::info!("Connected to PostgreSQL");

    // Run migrations
    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations completed");

    // Initialize Redis
    let redis = RedisClient::new(&config.redis_url()).await?;
    tracing::info!("Connected to Redis");

    // Upstream providers
    let wechat = WechatClient::new(config.wechat.clone())?;
    let google = GoogleProvider::new(&config.google)?;
    if config.wechat.app_id.is_empty() {
        tracing::warn!("WECHAT_APP_ID is not set, WeChat login will fail");
    }
    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => {
            tracing::info!("Delivering mail through {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpNotifier::new(smtp)?)
        }
        None => {
            tracing::warn!("SMTP_HOST is not set, verification codes are only logged");
            Arc::new(LogNotifier::new(&config.server.environment))
        }
    };

    // Create app state
    let todos = Arc::new(PgTodoRepository::new(db.clone()));
    let state = AppState {
        kv: Arc::new(redis),
        users: Arc::new(PgUserRepository::new(db)),
        tasks: todos.clone(),
        tags: todos,
        notifier,
        wechat: Arc::new(wechat),
        google: Arc::new(google),
        tokens: TokenService::new(&config.jwt),
        config: Arc::new(config.clone()),
    };

    let app = build_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api::router::create_router(state.clone()))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Handler panicked: {}", detail);

    ApiResponse::<()>::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        .into_response()
}
