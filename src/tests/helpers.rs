use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, Once,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    Router,
};
use serde_json::Value;
use sha1::{Digest, Sha1};
use tower::ServiceExt;
use tracing::{info, Level};

use crate::{
    build_router,
    config::{
        Config, DatabaseConfig, GoogleConfig, JwtConfig, OtpConfig, RedisConfig, ServerConfig,
        WechatConfig,
    },
    error::{AppError, AppResult},
    models::{OtpScenario, OtpType, QrTicket, WechatAccessToken},
    services::{
        auth::{AuthService, AuthSession},
        notifier::Notifier,
        oauth::{OAuthProfile, OAuthProvider},
        token::TokenService,
        wechat::WechatApi,
    },
    storage::memory::{MemoryStore, MemoryTodoRepository, MemoryUserRepository},
    AppState,
};

pub const WECHAT_TOKEN: &str = "wechat-webhook-token";
pub const TEST_PASSWORD: &str = "Abc123!@";

static INIT: Once = Once::new();

/// Initialize logging exactly once
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_target(false)
            .with_max_level(Level::ERROR)
            .init();
    });
}

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            environment: "test".into(),
        },
        database: DatabaseConfig {
            host: "localhost".into(),
            port: 5432,
            user: "postgres".into(),
            password: "postgres".into(),
            database: "lifepilot_test".into(),
            ssl_mode: "disable".into(),
            max_connections: 1,
        },
        redis: RedisConfig {
            host: "localhost".into(),
            port: 6379,
            password: None,
            db: 0,
        },
        jwt: JwtConfig {
            secret: "test-secret".into(),
            access_token_ttl: Duration::from_secs(5 * 60 * 60),
            refresh_token_ttl: Duration::from_secs(15 * 24 * 60 * 60),
            short_refresh_token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        },
        otp: OtpConfig {
            length: 6,
            ttl: Duration::from_secs(300),
            max_attempts: 5,
        },
        wechat: WechatConfig {
            app_id: "wx-test-app".into(),
            app_secret: "wx-test-secret".into(),
            token: WECHAT_TOKEN.into(),
            template_id: Some("login-template".into()),
            api_base: "http://127.0.0.1:9".into(),
            qr_ttl: Duration::from_secs(600),
            scanned_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        },
        google: GoogleConfig {
            userinfo_url: "http://127.0.0.1:9/userinfo".into(),
        },
        smtp: None,
    }
}

/// Captures outgoing messages instead of delivering them.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    fn last_for(&self, principal: &str) -> Option<(String, String)> {
        let sent = self.sent.lock().unwrap();
        sent.iter()
            .rev()
            .find(|(to, _, _)| to == principal)
            .map(|(_, subject, body)| (subject.clone(), body.clone()))
    }

    /// First all-digit word of the last message sent to `principal`.
    pub fn last_code(&self, principal: &str) -> Option<String> {
        let (_, body) = self.last_for(principal)?;
        body.split_whitespace()
            .map(|word| word.trim_end_matches('.'))
            .find(|word| !word.is_empty() && word.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
    }

    pub fn last_subject(&self, principal: &str) -> Option<String> {
        self.last_for(principal).map(|(subject, _)| subject)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, principal: &str, subject: &str, body: &str) -> AppResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((principal.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeWechat {
    scenes: Mutex<Vec<String>>,
    notified: Mutex<Vec<String>>,
    token_fetches: AtomicUsize,
    fail_notifications: AtomicBool,
    revoked: Mutex<Vec<String>>,
}

impl FakeWechat {
    pub fn scenes(&self) -> Vec<String> {
        self.scenes.lock().unwrap().clone()
    }

    pub fn notified(&self) -> Vec<String> {
        self.notified.lock().unwrap().clone()
    }

    pub fn token_fetches(&self) -> usize {
        self.token_fetches.load(Ordering::SeqCst)
    }

    pub fn fail_notifications(&self) {
        self.fail_notifications.store(true, Ordering::SeqCst);
    }

    /// Make WeChat answer errcode 40001 for calls made with `token`.
    pub fn revoke_token(&self, token: &str) {
        self.revoked.lock().unwrap().push(token.to_string());
    }

    fn check_token(&self, access_token: &str) -> AppResult<()> {
        if self.revoked.lock().unwrap().iter().any(|t| t == access_token) {
            return Err(AppError::StaleAccessToken(
                "WeChat errcode 40001: invalid credential".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl WechatApi for FakeWechat {
    async fn fetch_access_token(&self) -> AppResult<WechatAccessToken> {
        let n = self.token_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(WechatAccessToken {
            access_token: format!("access-token-{}", n),
            expires_in: 7200,
        })
    }

    async fn create_qr_ticket(
        &self,
        access_token: &str,
        scene: &str,
        expire_seconds: u64,
    ) -> AppResult<QrTicket> {
        self.check_token(access_token)?;
        self.scenes.lock().unwrap().push(scene.to_string());
        Ok(QrTicket {
            ticket: format!("gQH47joAAAAAAAAAASxodHRw{}", scene),
            expire_seconds,
            url: format!("http://weixin.qq.com/q/{}", scene),
            qrcode_url: None,
        })
    }

    async fn send_template_message(&self, access_token: &str, open_id: &str) -> AppResult<()> {
        self.check_token(access_token)?;
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("errcode 43004: require subscribe".into()));
        }
        self.notified.lock().unwrap().push(open_id.to_string());
        Ok(())
    }
}

/// Google stand-in: any token other than `invalid` resolves to a fixed profile.
pub struct FakeGoogle {
    profile: OAuthProfile,
}

impl FakeGoogle {
    pub fn with_profile(sub: &str, email: &str) -> Self {
        Self {
            profile: OAuthProfile {
                sub: sub.to_string(),
                email: Some(email.to_string()),
                email_verified: Some(true),
                name: Some("Test User".into()),
                picture: Some("https://lh3.googleusercontent.com/a/test".into()),
            },
        }
    }
}

impl Default for FakeGoogle {
    fn default() -> Self {
        Self::with_profile("117189423587624091284", "google.user@gmail.com")
    }
}

#[async_trait]
impl OAuthProvider for FakeGoogle {
    fn name(&self) -> &str {
        "google"
    }

    async fn fetch_profile(&self, access_token: &str) -> AppResult<OAuthProfile> {
        if access_token == "invalid" {
            return Err(AppError::Unauthorized);
        }
        Ok(self.profile.clone())
    }
}

/// Application state wired to in-memory collaborators, with handles kept for assertions.
pub struct TestContext {
    pub state: AppState,
    pub users: Arc<MemoryUserRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub wechat: Arc<FakeWechat>,
}

impl TestContext {
    pub fn app(&self) -> Router {
        build_router(self.state.clone())
    }
}

pub fn test_state() -> TestContext {
    init_tracing();

    let config = test_config();
    let users = Arc::new(MemoryUserRepository::new());
    let todos = Arc::new(MemoryTodoRepository::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let wechat = Arc::new(FakeWechat::default());

    let state = AppState {
        kv: Arc::new(MemoryStore::new()),
        users: users.clone(),
        tasks: todos.clone(),
        tags: todos,
        notifier: notifier.clone(),
        wechat: wechat.clone(),
        google: Arc::new(FakeGoogle::default()),
        tokens: TokenService::new(&config.jwt),
        config: Arc::new(config),
    };

    TestContext {
        state,
        users,
        notifier,
        wechat,
    }
}

/// Register `email` with the test password through the service layer.
pub async fn signed_in(ctx: &TestContext, email: &str) -> AuthSession {
    let auth = AuthService::new(&ctx.state);
    auth.send_otp(email, OtpType::Email, OtpScenario::Register)
        .await
        .unwrap();
    let code = ctx.notifier.last_code(email).unwrap();
    auth.register(email, OtpType::Email, TEST_PASSWORD, TEST_PASSWORD, &code)
        .await
        .unwrap()
}

pub fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    headers
}

/// Value of a cookie set by the response, if any.
pub fn set_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let prefix = format!("{}=", name);
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&prefix))
}

pub fn cookie_value(set_cookie: &str) -> &str {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value)
        .unwrap_or_default()
}

pub fn wechat_signature(timestamp: &str, nonce: &str) -> String {
    let mut parts = [WECHAT_TOKEN, timestamp, nonce];
    parts.sort_unstable();
    hex::encode(Sha1::digest(parts.concat().as_bytes()))
}

pub fn scan_event_xml(scene: &str, open_id: &str) -> String {
    format!(
        "<xml>\
         <ToUserName><![CDATA[gh_3fe5a4a1b0c2]]></ToUserName>\
         <FromUserName><![CDATA[{open_id}]]></FromUserName>\
         <CreateTime>1700000000</CreateTime>\
         <MsgType><![CDATA[event]]></MsgType>\
         <Event><![CDATA[SCAN]]></Event>\
         <EventKey><![CDATA[{scene}]]></EventKey>\
         <Ticket><![CDATA[gQH47joAAAAAAAAAASxodHRw{scene}]]></Ticket>\
         </xml>"
    )
}

pub async fn test_request(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: Option<HeaderMap>,
    cookies: Option<&[(&str, &str)]>,
) -> (StatusCode, Value, HeaderMap) {
    let body = match body {
        Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
        None => Body::empty(),
    };

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");

    // Add cookies if provided
    if let Some(cookies) = cookies {
        if !cookies.is_empty() {
            let cookie_header = cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header("cookie", cookie_header);
        }
    }

    // Add custom headers if provided
    if let Some(custom_headers) = headers {
        for (key, value) in custom_headers.iter() {
            request = request.header(key, value);
        }
    }

    let (status, text, headers) = send(app, request.body(body).unwrap()).await;
    let json = serde_json::from_str(&text).unwrap_or(Value::String(text));
    (status, json, headers)
}

/// Request with a raw body and a plain-text reply, as the WeChat webhook uses.
pub async fn text_request(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "text/xml")
        .body(Body::from(body.to_string()))
        .unwrap();

    let (status, text, _) = send(app, request).await;
    (status, text)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String, HeaderMap) {
    info!(method = %request.method(), uri = %request.uri(), "Making test request");

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = String::from_utf8(
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec(),
    )
    .unwrap();

    info!(status = %status, body = %body, "Test response received");
    (status, body, headers)
}
