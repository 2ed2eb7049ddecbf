//! Wire shapes for both sockets of a call.
//!
//! Telephony side uses camelCase JSON keyed by `event`; the agent side uses
//! snake_case `{mime_type, data, role}` objects. Audio is always base64 text.

use serde::{Deserialize, Serialize};

/// Events received from the telephony platform.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    Connected,
    Start { start: StartPayload },
    Media { media: MediaPayload },
    Stop,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    pub call_id: String,
    pub account_id: String,
    #[serde(default)]
    pub caller_id_number: Option<String>,
    #[serde(default)]
    pub callee_id_number: Option<String>,
    #[serde(default)]
    pub media_format: Option<MediaFormatPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormatPayload {
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaPayload {
    pub payload: String,
}

/// Media event sent back to the telephony platform.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMediaEvent {
    pub event: &'static str,
    pub call_id: String,
    pub account_id: String,
    pub media: MediaPayload,
}

impl OutboundMediaEvent {
    pub fn new(call_id: &str, account_id: &str, payload: String) -> Self {
        Self {
            event: "media",
            call_id: call_id.to_string(),
            account_id: account_id.to_string(),
            media: MediaPayload { payload },
        }
    }
}

/// Message received from the voice agent.
///
/// Every field is optional: turn signals arrive without a mime type and
/// content messages arrive without turn flags.
#[derive(Debug, Default, Deserialize)]
pub struct AgentMessage {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub turn_complete: Option<bool>,
    #[serde(default)]
    pub interrupted: Option<bool>,
}

impl AgentMessage {
    /// Base64 audio carried by this message, if any.
    pub fn audio(&self) -> Option<(&str, &str)> {
        match (self.mime_type.as_deref(), self.data.as_deref()) {
            (Some(mime), Some(data)) if mime.starts_with("audio/") && !data.is_empty() => Some((mime, data)),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self.mime_type.as_deref() {
            Some("text/plain") => self.data.as_deref(),
            _ => None,
        }
    }

    /// Mime type of a message that is neither audio nor plain text.
    pub fn unsupported_mime_type(&self) -> Option<&str> {
        self.mime_type
            .as_deref()
            .filter(|mime| !mime.starts_with("audio/") && *mime != "text/plain")
    }

    pub fn is_turn_complete(&self) -> bool {
        self.turn_complete.unwrap_or(false)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.unwrap_or(false)
    }
}

/// Message sent to the voice agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentRequest {
    pub mime_type: String,
    pub data: String,
    pub role: String,
}

impl AgentRequest {
    pub fn audio(mime_type: &str, data: String) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data,
            role: "user".to_string(),
        }
    }

    pub fn text(text: &str) -> Self {
        Self {
            mime_type: "text/plain".to_string(),
            data: text.to_string(),
            role: "user".to_string(),
        }
    }
}
