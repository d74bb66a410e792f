use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub otp: OtpConfig,
    pub wechat: WechatConfig,
    pub google: GoogleConfig,
    /// Present only when `SMTP_HOST` is set.
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_ttl: Duration,
    /// Refresh lifetime for password, OTP and OAuth logins.
    pub refresh_token_ttl: Duration,
    /// Refresh lifetime for registration and WeChat logins.
    pub short_refresh_token_ttl: Duration,
}

pub const MIN_OTP_LENGTH: usize = 4;
pub const MAX_OTP_LENGTH: usize = 10;

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub length: usize,
    pub ttl: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct WechatConfig {
    pub app_id: String,
    pub app_secret: String,
    /// Token shared with the WeChat console, used for webhook signatures.
    pub token: String,
    pub template_id: Option<String>,
    pub api_base: String,
    pub qr_ttl: Duration,
    pub scanned_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub userinfo_url: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Sender mailbox, e.g. `"Life Pilot" <noreply@example.com>`.
    pub from: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn secs_or(key: &str, default: u64) -> Duration {
    Duration::from_secs(parse_or(key, default))
}

fn otp_length(requested: usize) -> usize {
    requested.clamp(MIN_OTP_LENGTH, MAX_OTP_LENGTH)
}

impl Config {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        Config {
            server: ServerConfig {
                host: var_or("SERVER_HOST", "0.0.0.0"),
                port: parse_or("SERVER_PORT", 8080),
                environment: var_or("ENVIRONMENT", "development"),
            },
            database: DatabaseConfig {
                host: var_or("DB_HOST", "localhost"),
                port: parse_or("DB_PORT", 5432),
                user: var_or("DB_USER", "postgres"),
                password: var_or("DB_PASSWORD", "postgres"),
                database: var_or("DB_NAME", "lifepilot"),
                ssl_mode: var_or("DB_SSL_MODE", "disable"),
                max_connections: parse_or("DB_MAX_CONNS", 25),
            },
            redis: RedisConfig {
                host: var_or("REDIS_HOST", "localhost"),
                port: parse_or("REDIS_PORT", 6379),
                password: env::var("REDIS_PASSWORD").ok(),
                db: parse_or("REDIS_DB", 0),
            },
            jwt: JwtConfig {
                secret: var_or("JWT_SECRET", "super-secret-jwt-key-change-in-production"),
                access_token_ttl: secs_or("JWT_ACCESS_TOKEN_TTL", 5 * 60 * 60), // 5 hours
                refresh_token_ttl: secs_or("JWT_REFRESH_TOKEN_TTL", 15 * 24 * 60 * 60), // 15 days
                short_refresh_token_ttl: secs_or("JWT_SHORT_REFRESH_TOKEN_TTL", 7 * 24 * 60 * 60), // 7 days
            },
            otp: OtpConfig {
                length: otp_length(parse_or("OTP_LENGTH", 6)),
                ttl: secs_or("OTP_TTL", 5 * 60),
                max_attempts: parse_or("OTP_MAX_ATTEMPTS", 5),
            },
            wechat: WechatConfig {
                app_id: var_or("WECHAT_APP_ID", ""),
                app_secret: var_or("WECHAT_APP_SECRET", ""),
                token: var_or("WECHAT_TOKEN", ""),
                template_id: env::var("WECHAT_TEMPLATE_ID").ok().filter(|v| !v.is_empty()),
                api_base: var_or("WECHAT_API_BASE", "https://api.weixin.qq.com"),
                qr_ttl: secs_or("WECHAT_QR_TTL", 600),
                scanned_ttl: secs_or("WECHAT_SCANNED_TTL", 7 * 24 * 60 * 60),
            },
            google: GoogleConfig {
                userinfo_url: var_or(
                    "GOOGLE_USERINFO_URL",
                    "https://www.googleapis.com/oauth2/v3/userinfo",
                ),
            },
            smtp: env::var("SMTP_HOST")
                .ok()
                .filter(|host| !host.is_empty())
                .map(|host| SmtpConfig {
                    host,
                    port: parse_or("SMTP_PORT", 465),
                    user: var_or("SMTP_USER", ""),
                    password: var_or("SMTP_PASSWORD", ""),
                    from: var_or("SMTP_FROM", "\"Life Pilot\" <noreply@lifepilot.app>"),
                }),
        }
    }

    pub fn is_production(&self) -> bool {
        self.server.environment == "production"
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.database.user,
            self.database.password,
            self.database.host,
            self.database.port,
            self.database.database,
            self.database.ssl_mode
        )
    }

    pub fn redis_url(&self) -> String {
        match &self.redis.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.redis.host, self.redis.port, self.redis.db
            ),
            None => format!(
                "redis://{}:{}/{}",
                self.redis.host, self.redis.port, self.redis.db
            ),
        }
    }
}
