use axum::{extract::State, Extension};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use crate::{
    api::{
        cookies::{clear_refresh_cookie, refresh_cookie, refresh_token},
        extract::ApiJson,
        response::ApiResponse,
    },
    error::{AppError, AppResult},
    models::{OtpScenario, OtpType, User},
    services::auth::{AuthService, AuthSession},
    AppState,
};

/// Body of every session-establishing response.
#[derive(Debug, Serialize)]
pub struct SessionData {
    pub atk: String,
    #[serde(rename = "isNewUser", skip_serializing_if = "Option::is_none")]
    pub is_new_user: Option<bool>,
    pub user: User,
}

pub type SessionResponse = (CookieJar, ApiResponse<SessionData>);

/// Put the refresh token in the `rtk` cookie and the access token in the body.
pub fn session_response(
    state: &AppState,
    jar: CookieJar,
    session: AuthSession,
    report_new_user: bool,
    message: &str,
) -> SessionResponse {
    let AuthSession {
        user,
        tokens,
        is_new_user,
    } = session;

    let jar = jar.add(refresh_cookie(
        tokens.refresh_token,
        tokens.refresh_ttl,
        state.config.is_production(),
    ));
    let data = SessionData {
        atk: tokens.access_token,
        is_new_user: report_new_user.then_some(is_new_user),
        user,
    };
    (jar, ApiResponse::ok(data, message))
}

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub email: String,
    #[serde(rename = "type", default)]
    pub otp_type: OtpType,
    #[serde(alias = "sence")]
    pub scenario: OtpScenario,
}

pub async fn send_otp(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SendOtpRequest>,
) -> AppResult<ApiResponse<()>> {
    let auth_service = AuthService::new(&state);
    auth_service
        .send_otp(&req.email, req.otp_type, req.scenario)
        .await?;

    Ok(ApiResponse::message("Verification code sent"))
}

#[derive(Debug, Deserialize)]
pub struct CheckOtpRequest {
    pub email: String,
    #[serde(rename = "type", default)]
    pub otp_type: OtpType,
    #[serde(alias = "sence")]
    pub scenario: OtpScenario,
    pub otp: String,
}

pub async fn check_otp(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CheckOtpRequest>,
) -> AppResult<ApiResponse<()>> {
    let auth_service = AuthService::new(&state);
    auth_service
        .check_otp(&req.email, req.otp_type, req.scenario, &req.otp)
        .await?;

    Ok(ApiResponse::message("Verification code correct"))
}

/// Password login when `password` is present, OTP login when `otp` is.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: Option<String>,
    pub otp: Option<String>,
    #[serde(rename = "type", default)]
    pub otp_type: OtpType,
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> AppResult<SessionResponse> {
    let auth_service = AuthService::new(&state);

    let (session, report_new_user) = match (req.password.as_deref(), req.otp.as_deref()) {
        (Some(password), _) if !password.is_empty() => (
            auth_service.login_with_password(&req.email, password).await?,
            false,
        ),
        (_, Some(otp)) if !otp.is_empty() => (
            auth_service
                .login_with_otp(&req.email, req.otp_type, otp)
                .await?,
            true,
        ),
        _ => {
            return Err(AppError::Validation(
                "Password or verification code is required".to_string(),
            ))
        }
    };

    Ok(session_response(&state, jar, session, report_new_user, "Login successful"))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "type", default)]
    pub otp_type: OtpType,
    pub email: String,
    pub password: String,
    #[serde(rename = "rePassword")]
    pub re_password: String,
    pub otp: String,
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> AppResult<SessionResponse> {
    let auth_service = AuthService::new(&state);
    let session = auth_service
        .register(
            &req.email,
            req.otp_type,
            &req.password,
            &req.re_password,
            &req.otp,
        )
        .await?;

    Ok(session_response(&state, jar, session, false, "Registration successful"))
}

pub type ResetPasswordRequest = RegisterRequest;

pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> AppResult<ApiResponse<()>> {
    let auth_service = AuthService::new(&state);
    auth_service
        .reset_password(
            &req.email,
            req.otp_type,
            &req.password,
            &req.re_password,
            &req.otp,
        )
        .await?;

    Ok(ApiResponse::message("Password reset successful"))
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub email: String,
    pub password: String,
}

pub async fn set_password(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ApiJson(req): ApiJson<SetPasswordRequest>,
) -> AppResult<ApiResponse<()>> {
    let auth_service = AuthService::new(&state);
    auth_service
        .set_password(&user, &req.email, &req.password)
        .await?;

    Ok(ApiResponse::message("Password set successfully"))
}

#[derive(Debug, Deserialize)]
pub struct OAuthRequest {
    pub token: String,
    pub provider: Option<String>,
}

pub async fn oauth(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<OAuthRequest>,
) -> AppResult<SessionResponse> {
    let provider = state.google.clone();
    if let Some(requested) = req.provider.as_deref() {
        if !requested.eq_ignore_ascii_case(provider.name()) {
            return Err(AppError::Validation(format!("Unsupported provider: {}", requested)));
        }
    }
    if req.token.trim().is_empty() {
        return Err(AppError::Validation("token is required".to_string()));
    }

    let auth_service = AuthService::new(&state);
    let session = auth_service
        .login_with_oauth(provider.as_ref(), req.token.trim())
        .await?;

    Ok(session_response(&state, jar, session, true, "Login successful"))
}

#[derive(Debug, Serialize)]
pub struct RefreshData {
    pub atk: String,
}

pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<ApiResponse<RefreshData>> {
    let token = refresh_token(&jar).ok_or(AppError::Unauthorized)?;

    let auth_service = AuthService::new(&state);
    let (_, atk) = auth_service.refresh(&token).await?;

    Ok(ApiResponse::ok(RefreshData { atk }, "Token refreshed"))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, ApiResponse<()>) {
    let jar = clear_refresh_cookie(jar, state.config.is_production());
    (jar, ApiResponse::message("Logged out"))
}
