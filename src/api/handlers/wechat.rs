use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::{
    api::{
        extract::{ApiJson, ApiQuery},
        response::ApiResponse,
    },
    error::AppResult,
    models::{QrTicket, ScanEvent},
    services::{
        auth::AuthService,
        wechat::{verify_signature, ScanOutcome, WechatLogin},
    },
    AppState,
};

use super::auth::{session_response, SessionResponse};

fn wechat_login(state: &AppState) -> WechatLogin {
    WechatLogin::new(
        state.kv.clone(),
        state.wechat.clone(),
        state.config.wechat.clone(),
    )
}

#[derive(Debug, Deserialize)]
pub struct QrCodeRequest {
    pub code: String,
    pub state: String,
}

pub async fn generate_qr_code(
    State(state): State<AppState>,
    ApiQuery(req): ApiQuery<QrCodeRequest>,
) -> AppResult<ApiResponse<QrTicket>> {
    let ticket = wechat_login(&state).generate(&req.code, &req.state).await?;
    Ok(ApiResponse::ok(ticket, "ok"))
}

/// Client poll; succeeds once the QR code was scanned from this browser's session.
pub async fn poll_login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<QrCodeRequest>,
) -> AppResult<SessionResponse> {
    let open_id = wechat_login(&state).consume(&req.code, &req.state).await?;

    let auth_service = AuthService::new(&state);
    let session = auth_service.login_with_wechat(&open_id).await?;

    Ok(session_response(&state, jar, session, true, "Login successful"))
}

#[derive(Debug, Default, Deserialize)]
pub struct SignatureQuery {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    pub echostr: Option<String>,
}

enum SignatureCheck {
    Valid,
    Missing,
    Invalid,
}

fn check_signature(state: &AppState, query: &SignatureQuery) -> SignatureCheck {
    let (Some(signature), Some(timestamp), Some(nonce)) =
        (&query.signature, &query.timestamp, &query.nonce)
    else {
        return SignatureCheck::Missing;
    };

    if verify_signature(&state.config.wechat.token, signature, timestamp, nonce) {
        SignatureCheck::Valid
    } else {
        SignatureCheck::Invalid
    }
}

/// Server URL verification from the WeChat console.
pub async fn verify_server(
    State(state): State<AppState>,
    Query(query): Query<SignatureQuery>,
) -> Response {
    match check_signature(&state, &query) {
        SignatureCheck::Valid => match query.echostr {
            Some(echostr) => echostr.into_response(),
            None => (StatusCode::BAD_REQUEST, "missing echostr").into_response(),
        },
        SignatureCheck::Missing => (StatusCode::BAD_REQUEST, "missing parameters").into_response(),
        SignatureCheck::Invalid => {
            tracing::warn!("Rejected WeChat verification with a bad signature");
            (StatusCode::FORBIDDEN, "invalid signature").into_response()
        }
    }
}

/// Event push from WeChat. Replies are plain text as the platform expects.
pub async fn handle_event(
    State(state): State<AppState>,
    Query(query): Query<SignatureQuery>,
    body: String,
) -> Response {
    match check_signature(&state, &query) {
        SignatureCheck::Valid => {}
        SignatureCheck::Missing => return (StatusCode::BAD_REQUEST, "error").into_response(),
        SignatureCheck::Invalid => {
            tracing::warn!("Rejected WeChat event with a bad signature");
            return (StatusCode::FORBIDDEN, "error").into_response();
        }
    }

    let event = match ScanEvent::from_xml(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable WeChat event");
            return (StatusCode::BAD_REQUEST, "error").into_response();
        }
    };

    tracing::debug!(
        to = %event.to_user,
        msg_type = %event.msg_type,
        event = ?event.event,
        created = ?event.create_time,
        "WeChat event received"
    );

    match wechat_login(&state).handle_scan(&event).await {
        Ok(ScanOutcome::Ignored) | Ok(ScanOutcome::Confirmed) => "success".into_response(),
        Ok(ScanOutcome::Rejected) => (StatusCode::BAD_REQUEST, "error").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to handle WeChat event");
            (StatusCode::INTERNAL_SERVER_ERROR, "error").into_response()
        }
    }
}
