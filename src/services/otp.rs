use std::sync::Arc;

use rand::Rng;
use subtle::ConstantTimeEq;

use crate::{
    config::{OtpConfig, MAX_OTP_LENGTH, MIN_OTP_LENGTH},
    error::{AppError, AppResult},
    models::{OtpScenario, OtpType},
    services::notifier::Notifier,
    storage::KvStore,
};

pub struct OtpService {
    kv: Arc<dyn KvStore>,
    notifier: Arc<dyn Notifier>,
    config: OtpConfig,
}

/// Storage key of the live code for one (channel, principal, scenario).
pub fn otp_key(otp_type: OtpType, principal: &str, scenario: OtpScenario) -> String {
    format!("otp:{}-{}-{}", otp_type, principal, scenario)
}

fn attempts_key(key: &str) -> String {
    format!("{}:attempts", key)
}

impl OtpService {
    pub fn new(kv: Arc<dyn KvStore>, notifier: Arc<dyn Notifier>, config: OtpConfig) -> Self {
        Self {
            kv,
            notifier,
            config,
        }
    }

    /// Issue a fresh code, replacing any live one, and dispatch it.
    pub async fn send(&self, principal: &str, otp_type: OtpType, scenario: OtpScenario) -> AppResult<()> {
        let key = otp_key(otp_type, principal, scenario);
        let code = self.generate_code();

        self.kv.set_ex(&key, &code, self.config.ttl).await?;
        self.kv.del(&attempts_key(&key)).await?;

        let minutes = (self.config.ttl.as_secs() / 60).max(1);
        let body = format!(
            "Your verification code is {}. It expires in {} minutes.",
            code, minutes
        );
        self.notifier.send(principal, scenario.subject(), &body).await?;

        tracing::info!(%otp_type, %scenario, "Verification code sent");
        Ok(())
    }

    /// Check `candidate` against the live code and consume it on a match.
    pub async fn verify(
        &self,
        principal: &str,
        otp_type: OtpType,
        scenario: OtpScenario,
        candidate: &str,
    ) -> AppResult<bool> {
        let key = otp_key(otp_type, principal, scenario);
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Ok(false);
        }
        let Some(stored) = self.kv.get(&key).await? else {
            return Ok(false);
        };

        if bool::from(stored.as_bytes().ct_eq(candidate.as_bytes())) {
            // Only the caller that actually removes the code wins.
            let consumed = self.kv.del_if_eq(&key, &stored).await?;
            self.kv.del(&attempts_key(&key)).await?;
            return Ok(consumed);
        }

        let attempts = self
            .kv
            .incr_with_ttl(&attempts_key(&key), self.config.ttl)
            .await?;
        if attempts >= self.config.max_attempts as i64 {
            tracing::warn!(%otp_type, %scenario, attempts, "Too many wrong codes, burning code");
            self.kv.del_if_eq(&key, &stored).await?;
            self.kv.del(&attempts_key(&key)).await?;
        }

        Ok(false)
    }

    /// `verify` for flows that abort on a mismatch.
    pub async fn consume(
        &self,
        principal: &str,
        otp_type: OtpType,
        scenario: OtpScenario,
        candidate: &str,
    ) -> AppResult<()> {
        if self.verify(principal, otp_type, scenario, candidate).await? {
            Ok(())
        } else {
            Err(AppError::InvalidOtp)
        }
    }

    fn generate_code(&self) -> String {
        let length = self.config.length.clamp(MIN_OTP_LENGTH, MAX_OTP_LENGTH);
        let mut rng = rand::thread_rng();
        let max = 10_u64.pow(length as u32);
        let code: u64 = rng.gen_range(0..max);
        format!("{:0>width$}", code, width = length)
    }
}
