use std::{sync::Arc, time::Duration};

use bcrypt::{hash, verify};
use uuid::Uuid;

use crate::{
    config::JwtConfig,
    error::{AppError, AppResult},
    models::{NewUser, OtpScenario, OtpType, TokenPair, User, UserKey, UserUpdate},
    services::{
        oauth::OAuthProvider,
        otp::OtpService,
        token::{TokenClass, TokenService},
    },
    storage::UserRepository,
    AppState,
};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MIN_PASSWORD_CLASSES: usize = 3;
const PASSWORD_HASH_COST: u32 = 10;

/// Number of character classes (digit, upper, lower, special) present.
pub fn password_classes(password: &str) -> usize {
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let upper = password.chars().any(|c| c.is_uppercase());
    let lower = password.chars().any(|c| c.is_lowercase());
    let special = password.chars().any(|c| !c.is_alphanumeric());
    [digit, upper, lower, special].into_iter().filter(|x| *x).count()
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if password_classes(password) < MIN_PASSWORD_CLASSES {
        return Err(AppError::Validation(
            "Password must contain at least three of: digits, uppercase letters, lowercase letters, special characters"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_new_password(password: &str, confirmation: &str) -> AppResult<()> {
    validate_password(password)?;
    if password != confirmation {
        return Err(AppError::Validation("The two passwords do not match".to_string()));
    }
    Ok(())
}

/// Canonical form of an email or phone principal.
pub fn normalize_principal(otp_type: OtpType, raw: &str) -> AppResult<String> {
    let value = raw.trim();
    match otp_type {
        OtpType::Email => {
            let valid = value
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
            if !valid {
                return Err(AppError::Validation("A valid email is required".to_string()));
            }
            Ok(value.to_lowercase())
        }
        OtpType::Phone => {
            let digits = value.trim_start_matches('+');
            if digits.len() < 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(AppError::Validation("A valid phone number is required".to_string()));
            }
            Ok(value.to_string())
        }
    }
}

fn principal_key(otp_type: OtpType, principal: &str) -> UserKey {
    match otp_type {
        OtpType::Email => UserKey::Email(principal.to_string()),
        OtpType::Phone => UserKey::Phone(principal.to_string()),
    }
}

fn hash_password(password: &str) -> AppResult<String> {
    hash(password, PASSWORD_HASH_COST).map_err(|e| anyhow::anyhow!("Hash error: {}", e).into())
}

/// Outcome of any login or registration.
#[derive(Debug)]
pub struct AuthSession {
    pub user: User,
    pub tokens: TokenPair,
    pub is_new_user: bool,
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    otp: OtpService,
    tokens: TokenService,
    jwt: JwtConfig,
}

impl AuthService {
    pub fn new(state: &AppState) -> Self {
        Self {
            users: state.users.clone(),
            otp: OtpService::new(
                state.kv.clone(),
                state.notifier.clone(),
                state.config.otp.clone(),
            ),
            tokens: state.tokens.clone(),
            jwt: state.config.jwt.clone(),
        }
    }

    // OTP Management
    pub async fn send_otp(&self, principal: &str, otp_type: OtpType, scenario: OtpScenario) -> AppResult<()> {
        let principal = normalize_principal(otp_type, principal)?;
        self.otp.send(&principal, otp_type, scenario).await
    }

    pub async fn check_otp(
        &self,
        principal: &str,
        otp_type: OtpType,
        scenario: OtpScenario,
        code: &str,
    ) -> AppResult<()> {
        let principal = normalize_principal(otp_type, principal)?;
        self.otp.consume(&principal, otp_type, scenario, code).await
    }

    // Login
    pub async fn login_with_password(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        let email = normalize_principal(OtpType::Email, email)?;
        let user = self
            .users
            .find_by(UserKey::Email(email))
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let Some(password_hash) = user.password_hash.as_deref() else {
            return Err(AppError::InvalidCredentials);
        };
        let matches = verify(password, password_hash)
            .map_err(|e| anyhow::anyhow!("Verify error: {}", e))?;
        if !matches {
            return Err(AppError::InvalidCredentials);
        }

        self.start_session(user, false, self.jwt.refresh_token_ttl)
    }

    /// Passwordless login; the first successful login creates the account.
    pub async fn login_with_otp(&self, principal: &str, otp_type: OtpType, code: &str) -> AppResult<AuthSession> {
        let principal = normalize_principal(otp_type, principal)?;
        self.otp
            .consume(&principal, otp_type, OtpScenario::Login, code)
            .await?;

        let (user, is_new_user) = match self.users.find_by(principal_key(otp_type, &principal)).await? {
            Some(user) => (user, false),
            None => {
                let new_user = match otp_type {
                    OtpType::Email => NewUser {
                        email: Some(principal.clone()),
                        ..Default::default()
                    },
                    OtpType::Phone => NewUser {
                        phone: Some(principal.clone()),
                        ..Default::default()
                    },
                };
                (self.create_user(new_user).await?, true)
            }
        };

        self.start_session(user, is_new_user, self.jwt.refresh_token_ttl)
    }

    // Registration
    pub async fn register(
        &self,
        principal: &str,
        otp_type: OtpType,
        password: &str,
        confirmation: &str,
        code: &str,
    ) -> AppResult<AuthSession> {
        validate_new_password(password, confirmation)?;
        let principal = normalize_principal(otp_type, principal)?;

        if self
            .users
            .find_by(principal_key(otp_type, &principal))
            .await?
            .is_some()
        {
            return Err(AppError::UserAlreadyExists);
        }

        self.otp
            .consume(&principal, otp_type, OtpScenario::Register, code)
            .await?;

        let password_hash = hash_password(password)?;
        let mut new_user = NewUser {
            password_hash: Some(password_hash),
            ..Default::default()
        };
        match otp_type {
            OtpType::Email => new_user.email = Some(principal),
            OtpType::Phone => new_user.phone = Some(principal),
        }

        let user = self.create_user(new_user).await?;
        self.start_session(user, true, self.jwt.short_refresh_token_ttl)
    }

    // Password reset
    pub async fn reset_password(
        &self,
        principal: &str,
        otp_type: OtpType,
        password: &str,
        confirmation: &str,
        code: &str,
    ) -> AppResult<()> {
        validate_new_password(password, confirmation)?;
        let principal = normalize_principal(otp_type, principal)?;

        self.otp
            .consume(&principal, otp_type, OtpScenario::Forgot, code)
            .await?;

        let user = self
            .users
            .find_by(principal_key(otp_type, &principal))
            .await?
            .ok_or(AppError::UserNotFound)?;

        self.users
            .update(
                user.id,
                UserUpdate {
                    password_hash: Some(hash_password(password)?),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(user_id = %user.user_id, "Password reset");
        Ok(())
    }

    /// Set a password on the caller's own account, e.g. after a WeChat or OAuth signup.
    pub async fn set_password(&self, current: &User, email: &str, password: &str) -> AppResult<()> {
        validate_password(password)?;
        let email = normalize_principal(OtpType::Email, email)?;

        let user = self
            .users
            .find_by(UserKey::Email(email))
            .await?
            .ok_or(AppError::UserNotFound)?;
        if user.id != current.id {
            return Err(AppError::Forbidden);
        }

        self.users
            .update(
                user.id,
                UserUpdate {
                    password_hash: Some(hash_password(password)?),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    // OAuth
    pub async fn login_with_oauth(&self, provider: &dyn OAuthProvider, token: &str) -> AppResult<AuthSession> {
        let profile = provider.fetch_profile(token).await?;
        if profile.email_verified == Some(false) {
            return Err(AppError::Validation("The provider has not verified this email".to_string()));
        }

        // A linked account is found by provider id even if its email changed since.
        if let Some(user) = self
            .users
            .find_by(UserKey::GoogleId(profile.sub.clone()))
            .await?
        {
            return self.start_session(user, false, self.jwt.refresh_token_ttl);
        }

        let email = profile
            .email
            .as_deref()
            .ok_or_else(|| AppError::Validation("The provider did not share an email".to_string()))
            .and_then(|email| normalize_principal(OtpType::Email, email))?;

        let (user, is_new_user) = match self.users.find_by(UserKey::Email(email.clone())).await? {
            Some(user) => {
                let update = UserUpdate {
                    google_id: user.google_id.is_none().then(|| profile.sub.clone()),
                    name: user.name.is_none().then(|| profile.name.clone()).flatten(),
                    avatar: user.avatar.is_none().then(|| profile.picture.clone()).flatten(),
                    ..Default::default()
                };
                if update.is_empty() {
                    (user, false)
                } else {
                    tracing::info!(provider = provider.name(), user_id = %user.user_id, "Linked provider identity");
                    (self.users.update(user.id, update).await?, false)
                }
            }
            None => {
                let user = self
                    .create_user(NewUser {
                        email: Some(email),
                        google_id: Some(profile.sub.clone()),
                        name: profile.name.clone(),
                        avatar: profile.picture.clone(),
                        ..Default::default()
                    })
                    .await?;
                (user, true)
            }
        };

        self.start_session(user, is_new_user, self.jwt.refresh_token_ttl)
    }

    // WeChat
    pub async fn login_with_wechat(&self, open_id: &str) -> AppResult<AuthSession> {
        let (user, is_new_user) = match self.users.find_by(UserKey::WxId(open_id.to_string())).await? {
            Some(user) => (user, false),
            None => {
                let user = self
                    .create_user(NewUser {
                        wx_id: Some(open_id.to_string()),
                        ..Default::default()
                    })
                    .await?;
                (user, true)
            }
        };

        self.start_session(user, is_new_user, self.jwt.short_refresh_token_ttl)
    }

    // Tokens
    /// Mint a new access token from a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<(User, String)> {
        let user = self.user_for(refresh_token, TokenClass::Refresh).await?;
        let access_token = self
            .tokens
            .issue(&user.user_id.to_string(), TokenClass::Access)?;
        Ok((user, access_token))
    }

    /// Resolve the user behind an access token.
    pub async fn authenticate(&self, access_token: &str) -> AppResult<User> {
        self.user_for(access_token, TokenClass::Access).await
    }

    async fn user_for(&self, token: &str, class: TokenClass) -> AppResult<User> {
        let claims = self.tokens.validate(token, class)?;
        let user_id = Uuid::parse_str(&claims.id).map_err(|_| AppError::Unauthorized)?;

        self.users
            .find_by(UserKey::UserId(user_id))
            .await?
            .ok_or(AppError::Unauthorized)
    }

    // Helper methods
    async fn create_user(&self, new_user: NewUser) -> AppResult<User> {
        let user = self.users.create(new_user).await?;
        tracing::info!(user_id = %user.user_id, "User created");
        Ok(user)
    }

    fn start_session(&self, user: User, is_new_user: bool, refresh_ttl: Duration) -> AppResult<AuthSession> {
        let tokens = self
            .tokens
            .issue_pair(&user.user_id.to_string(), refresh_ttl)?;
        Ok(AuthSession {
            user,
            tokens,
            is_new_user,
        })
    }
}
