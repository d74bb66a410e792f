use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

use crate::{
    config::WechatConfig,
    error::{AppError, AppResult},
    models::{LoginSession, QrTicket, ScanEvent, WechatAccessToken},
    storage::KvStore,
};

const ACCESS_TOKEN_KEY: &str = "wx:access_token";
/// Refresh the upstream token this long before WeChat expires it.
const ACCESS_TOKEN_MARGIN_SECS: u64 = 300;
const SHOW_QRCODE_URL: &str = "https://mp.weixin.qq.com/cgi-bin/showqrcode";
const MAX_SCENE_LEN: usize = 64;
/// Errcodes meaning the access token itself was rejected: invalid, malformed, expired.
const STALE_TOKEN_ERRCODES: [i64; 3] = [40001, 40014, 42001];

/// Calls into the WeChat Official Account API.
#[async_trait]
pub trait WechatApi: Send + Sync {
    async fn fetch_access_token(&self) -> AppResult<WechatAccessToken>;

    async fn create_qr_ticket(
        &self,
        access_token: &str,
        scene: &str,
        expire_seconds: u64,
    ) -> AppResult<QrTicket>;

    async fn send_template_message(&self, access_token: &str, open_id: &str) -> AppResult<()>;
}

pub struct WechatClient {
    http: reqwest::Client,
    config: WechatConfig,
}

impl WechatClient {
    pub fn new(config: WechatConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }
}

/// WeChat reports failures as HTTP 200 with a non-zero `errcode`.
fn parse_reply<T: DeserializeOwned>(reply: Value) -> AppResult<T> {
    if let Some(code) = reply.get("errcode").and_then(Value::as_i64) {
        if code != 0 {
            let message = reply.get("errmsg").and_then(Value::as_str).unwrap_or_default();
            let detail = format!("WeChat errcode {}: {}", code, message);
            if STALE_TOKEN_ERRCODES.contains(&code) {
                return Err(AppError::StaleAccessToken(detail));
            }
            return Err(AppError::Upstream(detail));
        }
    }
    serde_json::from_value(reply)
        .map_err(|e| AppError::Upstream(format!("Unexpected WeChat reply: {}", e)))
}

#[async_trait]
impl WechatApi for WechatClient {
    async fn fetch_access_token(&self) -> AppResult<WechatAccessToken> {
        let reply: Value = self
            .http
            .get(self.url("/cgi-bin/token"))
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", self.config.app_id.as_str()),
                ("secret", self.config.app_secret.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_reply(reply)
    }

    async fn create_qr_ticket(
        &self,
        access_token: &str,
        scene: &str,
        expire_seconds: u64,
    ) -> AppResult<QrTicket> {
        let body = json!({
            "expire_seconds": expire_seconds,
            "action_name": "QR_STR_SCENE",
            "action_info": { "scene": { "scene_str": scene } },
        });
        let reply: Value = self
            .http
            .post(self.url("/cgi-bin/qrcode/create"))
            .query(&[("access_token", access_token)])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_reply(reply)
    }

    async fn send_template_message(&self, access_token: &str, open_id: &str) -> AppResult<()> {
        let Some(template_id) = &self.config.template_id else {
            return Ok(());
        };

        let body = json!({
            "touser": open_id,
            "template_id": template_id,
            "data": {
                "result": { "value": "Login successful" },
                "time": { "value": Utc::now().format("%Y-%m-%d %H:%M:%S").to_string() },
            },
        });
        let reply: Value = self
            .http
            .post(self.url("/cgi-bin/message/template/send"))
            .query(&[("access_token", access_token)])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_reply::<Value>(reply).map(|_| ())
    }
}

/// Webhook signature: sha1 over the sorted concatenation of token, timestamp and nonce.
pub fn verify_signature(token: &str, signature: &str, timestamp: &str, nonce: &str) -> bool {
    let mut parts = [token, timestamp, nonce];
    parts.sort_unstable();
    let expected = hex::encode(Sha1::digest(parts.concat().as_bytes()));
    expected
        .as_bytes()
        .ct_eq(signature.to_ascii_lowercase().as_bytes())
        .into()
}

pub fn session_key(code: &str) -> String {
    format!("wx:code:{}", code)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Not a QR scan; acknowledged and dropped.
    Ignored,
    /// Pending session moved to scanned.
    Confirmed,
    /// Unknown, expired or already scanned session.
    Rejected,
}

/// QR login handshake: generate, scan callback, poll.
pub struct WechatLogin {
    kv: Arc<dyn KvStore>,
    api: Arc<dyn WechatApi>,
    config: WechatConfig,
}

impl WechatLogin {
    pub fn new(kv: Arc<dyn KvStore>, api: Arc<dyn WechatApi>, config: WechatConfig) -> Self {
        Self { kv, api, config }
    }

    /// Cached upstream access token, refreshed through the API when missing.
    async fn access_token(&self) -> AppResult<String> {
        if let Some(token) = self.kv.get(ACCESS_TOKEN_KEY).await? {
            return Ok(token);
        }
        self.refresh_access_token().await
    }

    /// Drop a token WeChat rejected and fetch a replacement.
    async fn replace_access_token(&self, stale: &str, reason: &str) -> AppResult<String> {
        tracing::warn!(reason, "WeChat rejected cached access token");
        self.kv.del_if_eq(ACCESS_TOKEN_KEY, stale).await?;
        self.refresh_access_token().await
    }

    async fn refresh_access_token(&self) -> AppResult<String> {
        let fresh = self.api.fetch_access_token().await?;
        let ttl = fresh
            .expires_in
            .saturating_sub(ACCESS_TOKEN_MARGIN_SECS)
            .max(60);
        self.kv
            .set_ex(ACCESS_TOKEN_KEY, &fresh.access_token, Duration::from_secs(ttl))
            .await?;
        tracing::info!(expires_in = fresh.expires_in, "Refreshed WeChat access token");
        Ok(fresh.access_token)
    }

    pub async fn generate(&self, code: &str, state: &str) -> AppResult<QrTicket> {
        validate_code(code)?;
        validate_state(state)?;

        let access_token = self.access_token().await?;
        let expire_seconds = self.config.qr_ttl.as_secs();
        let mut ticket = match self
            .api
            .create_qr_ticket(&access_token, code, expire_seconds)
            .await
        {
            Err(AppError::StaleAccessToken(reason)) => {
                let access_token = self.replace_access_token(&access_token, &reason).await?;
                self.api
                    .create_qr_ticket(&access_token, code, expire_seconds)
                    .await?
            }
            other => other?,
        };

        let qrcode_url = reqwest::Url::parse_with_params(SHOW_QRCODE_URL, &[("ticket", &ticket.ticket)])
            .map_err(|e| AppError::Internal(e.into()))?;
        ticket.qrcode_url = Some(qrcode_url.to_string());

        self.kv
            .set_ex(
                &session_key(code),
                &LoginSession::pending(state).encode(),
                self.config.qr_ttl,
            )
            .await?;

        tracing::info!(code, "WeChat login QR code issued");
        Ok(ticket)
    }

    pub async fn handle_scan(&self, event: &ScanEvent) -> AppResult<ScanOutcome> {
        let Some(scene) = event.scene() else {
            return Ok(ScanOutcome::Ignored);
        };
        if event.open_id.is_empty() {
            return Ok(ScanOutcome::Rejected);
        }

        let key = session_key(scene);
        let Some(raw) = self.kv.get(&key).await? else {
            tracing::warn!(scene, "Scan for unknown or expired login session");
            return Ok(ScanOutcome::Rejected);
        };

        let session = LoginSession::parse(&raw);
        if !session.is_pending() {
            tracing::warn!(scene, "Repeated scan for login session rejected");
            return Ok(ScanOutcome::Rejected);
        }

        let scanned = session.scanned_by(&event.open_id);
        self.kv
            .set_ex(&key, &scanned.encode(), self.config.scanned_ttl)
            .await?;
        tracing::info!(scene, "WeChat login session scanned");

        if let Err(e) = self.notify(&event.open_id).await {
            tracing::warn!(error = %e, "Failed to send WeChat login notification");
        }

        Ok(ScanOutcome::Confirmed)
    }

    async fn notify(&self, open_id: &str) -> AppResult<()> {
        let access_token = self.access_token().await?;
        match self.api.send_template_message(&access_token, open_id).await {
            Err(AppError::StaleAccessToken(reason)) => {
                let access_token = self.replace_access_token(&access_token, &reason).await?;
                self.api.send_template_message(&access_token, open_id).await
            }
            other => other,
        }
    }

    /// Consume a scanned session and return the scanner's open id.
    /// Succeeds at most once per session.
    pub async fn consume(&self, code: &str, state: &str) -> AppResult<String> {
        let key = session_key(code);
        let Some(raw) = self.kv.get(&key).await? else {
            return Err(AppError::LoginPending);
        };

        let session = LoginSession::parse(&raw);
        let Some(open_id) = session.confirmed_open_id(state) else {
            return Err(AppError::LoginNotConfirmed);
        };

        if !self.kv.del_if_eq(&key, &raw).await? {
            // A concurrent poll got here first.
            return Err(AppError::LoginPending);
        }

        Ok(open_id.to_string())
    }
}

fn validate_code(code: &str) -> AppResult<()> {
    if code.is_empty() || code.len() > MAX_SCENE_LEN || code.chars().any(char::is_whitespace) {
        return Err(AppError::Validation("code is required".to_string()));
    }
    Ok(())
}

fn validate_state(state: &str) -> AppResult<()> {
    if state.is_empty() || state.len() > MAX_SCENE_LEN || state.contains('-') {
        return Err(AppError::Validation("state is required".to_string()));
    }
    Ok(())
}
