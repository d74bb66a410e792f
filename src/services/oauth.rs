use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    config::GoogleConfig,
    error::{AppError, AppResult},
};

/// Profile returned by an identity provider for an access token.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProfile {
    /// Provider-side subject identifier.
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Exchange a provider access token for the user's profile.
    async fn fetch_profile(&self, access_token: &str) -> AppResult<OAuthProfile>;
}

pub struct GoogleProvider {
    http: reqwest::Client,
    userinfo_url: String,
}

impl GoogleProvider {
    pub fn new(config: &GoogleConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            userinfo_url: config.userinfo_url.clone(),
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn fetch_profile(&self, access_token: &str) -> AppResult<OAuthProfile> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        // Google answers 401 for a bad or expired token.
        if response.status().is_client_error() {
            return Err(AppError::Unauthorized);
        }

        let profile: OAuthProfile = response.error_for_status()?.json().await?;
        Ok(profile)
    }
}
