use std::fmt;

use serde::{Deserialize, Serialize};

/// Delivery channel of a one-time code; the `type` field of OTP requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpType {
    Email,
    Phone,
}

impl OtpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpType::Email => "email",
            OtpType::Phone => "phone",
        }
    }
}

impl Default for OtpType {
    fn default() -> Self {
        Self::Email
    }
}

impl fmt::Display for OtpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flow a code was issued for. Codes never cross flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpScenario {
    Login,
    Register,
    Forgot,
}

impl OtpScenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpScenario::Login => "login",
            OtpScenario::Register => "register",
            OtpScenario::Forgot => "forgot",
        }
    }

    /// Subject line of the notification carrying the code.
    pub fn subject(&self) -> &'static str {
        match self {
            OtpScenario::Login => "Sign in to Life Pilot",
            OtpScenario::Register => "Create your Life Pilot account",
            OtpScenario::Forgot => "Reset your Life Pilot password",
        }
    }
}

impl fmt::Display for OtpScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
