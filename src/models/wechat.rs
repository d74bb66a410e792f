use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Prefix WeChat puts on the scene value when the scanner is a new follower.
const NEW_FOLLOWER_SCENE_PREFIX: &str = "qrscene_";

#[derive(Debug, Clone, Deserialize)]
pub struct WechatAccessToken {
    pub access_token: String,
    pub expires_in: u64,
}

/// Ticket returned by `cgi-bin/qrcode/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrTicket {
    pub ticket: String,
    pub expire_seconds: u64,
    pub url: String,
    #[serde(default)]
    pub qrcode_url: Option<String>,
}

/// Event pushed by WeChat to the webhook, XML encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanEvent {
    #[serde(rename = "ToUserName", default)]
    pub to_user: String,
    #[serde(rename = "FromUserName", default)]
    pub open_id: String,
    #[serde(rename = "CreateTime", default)]
    pub create_time: Option<i64>,
    #[serde(rename = "MsgType", default)]
    pub msg_type: String,
    #[serde(rename = "Event", default)]
    pub event: Option<String>,
    #[serde(rename = "EventKey", default)]
    pub event_key: Option<String>,
    #[serde(rename = "Ticket", default)]
    pub ticket: Option<String>,
}

impl ScanEvent {
    pub fn from_xml(xml: &str) -> AppResult<Self> {
        quick_xml::de::from_str(xml)
            .map_err(|e| AppError::BadRequest(format!("Malformed event payload: {}", e)))
    }

    /// Scene value of a QR scan, or `None` for events that are not QR scans.
    pub fn scene(&self) -> Option<&str> {
        self.ticket.as_ref()?;
        let key = self.event_key.as_deref()?;
        let scene = key.strip_prefix(NEW_FOLLOWER_SCENE_PREFIX).unwrap_or(key);
        (!scene.is_empty()).then_some(scene)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Scanned,
}

impl SessionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "0",
            SessionStatus::Scanned => "1",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "0" => Some(SessionStatus::Pending),
            "1" => Some(SessionStatus::Scanned),
            _ => None,
        }
    }
}

/// QR login session as stored in the TTL store: `{state}-{status}[-{openId}]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSession {
    pub state: String,
    pub status: Option<SessionStatus>,
    pub open_id: Option<String>,
}

impl LoginSession {
    pub fn pending(state: &str) -> Self {
        Self {
            state: state.to_string(),
            status: Some(SessionStatus::Pending),
            open_id: None,
        }
    }

    /// Parses a stored value. Missing or unknown parts come back as `None`
    /// and fail every later check.
    pub fn parse(raw: &str) -> Self {
        // Open ids may contain '-', so only the first two separators count.
        let mut parts = raw.splitn(3, '-');
        let state = parts.next().unwrap_or_default().to_string();
        let status = parts.next().and_then(SessionStatus::parse);
        let open_id = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        Self {
            state,
            status,
            open_id,
        }
    }

    pub fn encode(&self) -> String {
        let status = self.status.map(|s| s.as_str()).unwrap_or_default();
        match &self.open_id {
            Some(open_id) => format!("{}-{}-{}", self.state, status, open_id),
            None => format!("{}-{}", self.state, status),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == Some(SessionStatus::Pending)
    }

    pub fn scanned_by(&self, open_id: &str) -> Self {
        Self {
            state: self.state.clone(),
            status: Some(SessionStatus::Scanned),
            open_id: Some(open_id.to_string()),
        }
    }

    /// The scanner's open id, if this session was scanned and `state` matches.
    pub fn confirmed_open_id(&self, state: &str) -> Option<&str> {
        if self.state.is_empty() || self.state != state {
            return None;
        }
        if self.status != Some(SessionStatus::Scanned) {
            return None;
        }
        self.open_id.as_deref()
    }
}
