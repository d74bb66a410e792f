pub mod auth;
pub mod notifier;
pub mod oauth;
pub mod otp;
pub mod token;
pub mod wechat;
