use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::{
    config::SmtpConfig,
    error::{AppError, AppResult},
};

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound channel for verification codes (mail or SMS relay).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, principal: &str, subject: &str, body: &str) -> AppResult<()>;
}

/// Writes messages to the log instead of delivering them. Outside development
/// every send fails.
pub struct LogNotifier {
    environment: String,
}

impl LogNotifier {
    pub fn new(environment: &str) -> Self {
        Self {
            environment: environment.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, principal: &str, subject: &str, body: &str) -> AppResult<()> {
        if self.environment == "development" {
            tracing::info!("Message to {} [{}]: {}", principal, subject, body);
            return Ok(());
        }

        tracing::error!(principal, subject, "Mail delivery is not configured");
        Err(AppError::Upstream("Mail delivery is not configured".to_string()))
    }
}

/// Delivers plain-text mail through an authenticated SMTP relay over TLS.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> AppResult<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid SMTP_FROM: {}", e)))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid SMTP_HOST: {}", e)))?
            .port(config.port)
            .credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, principal: &str, subject: &str, body: &str) -> AppResult<()> {
        let to: Mailbox = principal
            .parse()
            .map_err(|_| AppError::Validation("A valid email address is required".to_string()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build mail: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Upstream(format!("SMTP delivery failed: {}", e)))?;

        tracing::info!(subject, "Mail sent");
        Ok(())
    }
}
