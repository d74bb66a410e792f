use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    config::JwtConfig,
    error::{AppError, AppResult},
    models::TokenPair,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenClass {
    #[serde(rename = "at")]
    Access,
    #[serde(rename = "rt")]
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    #[serde(default)]
    pub id: String, // public user id
    #[serde(rename = "type")]
    pub class: TokenClass,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    enc_key: EncodingKey,
    dec_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            enc_key: EncodingKey::from_secret(config.secret.as_bytes()),
            dec_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
        }
    }

    /// Sign a token of the given class with that class's default lifetime.
    pub fn issue(&self, subject: &str, class: TokenClass) -> AppResult<String> {
        let ttl = match class {
            TokenClass::Access => self.access_ttl,
            TokenClass::Refresh => self.refresh_ttl,
        };
        self.issue_with_ttl(subject, class, ttl)
    }

    pub fn issue_with_ttl(&self, subject: &str, class: TokenClass, ttl: Duration) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            id: subject.to_string(),
            class,
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };
        Ok(encode(&Header::default(), &claims, &self.enc_key)?)
    }

    /// Access token with the default lifetime plus a refresh token living `refresh_ttl`.
    pub fn issue_pair(&self, subject: &str, refresh_ttl: Duration) -> AppResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue(subject, TokenClass::Access)?,
            refresh_token: self.issue_with_ttl(subject, TokenClass::Refresh, refresh_ttl)?,
            refresh_ttl,
        })
    }

    /// Checks the signature only. Malformed or forged tokens yield `None`.
    pub fn decode(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        decode::<Claims>(token, &self.dec_key, &validation)
            .map(|data| data.claims)
            .ok()
    }

    /// Decode plus policy: unexpired, carries a subject, and of the expected class.
    pub fn validate(&self, token: &str, class: TokenClass) -> AppResult<Claims> {
        let claims = self.decode(token).ok_or(AppError::Unauthorized)?;

        if claims.exp < Utc::now().timestamp() {
            return Err(AppError::Unauthorized);
        }
        if claims.id.is_empty() || claims.class != class {
            return Err(AppError::Unauthorized);
        }

        Ok(claims)
    }
}
