//! # Call Session State Machine
//!
//! Per-call state record owned by exactly one media bridge.
//!
//! ## Session Lifecycle:
//! 1. **Idle**: socket accepted, no `start` yet. Media is dropped.
//! 2. **Active**: `start` bound the identifiers and media format.
//! 3. **Closed**: `stop` or either socket went away. Terminal.
//!
//! Transitions are named methods that report whether they took effect, so
//! callers decide what to log without peeking at internal fields.

use crate::bridge::messages::StartPayload;
use chrono::{DateTime, Utc};
use std::fmt;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Active,
    Closed,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Active => "active",
            CallState::Closed => "closed",
        }
    }
}

/// Audio encoding declared by the telephony side at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    Pcm16,
    G711Ulaw,
    Opus,
    Unset,
}

impl AudioEncoding {
    /// Map a declared encoding name (and its aliases) to an encoding.
    pub fn from_declared(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "g711_ulaw" | "ulaw" | "mulaw" | "pcmu" | "audio/x-mulaw" => AudioEncoding::G711Ulaw,
            "pcm16" | "linear16" | "l16" | "audio/x-l16" => AudioEncoding::Pcm16,
            "opus" | "audio/opus" => AudioEncoding::Opus,
            _ => AudioEncoding::Unset,
        }
    }
}

impl fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioEncoding::Pcm16 => "pcm16",
            AudioEncoding::G711Ulaw => "g711_ulaw",
            AudioEncoding::Opus => "opus",
            AudioEncoding::Unset => "unset",
        };
        f.write_str(name)
    }
}

/// A resolved media format: encoding plus the rate it runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaFormat {
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
}

/// Frame counters for the teardown summary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallStats {
    pub frames_to_agent: u64,
    pub frames_to_telephony: u64,
    pub dropped_frames: u64,
}

/// State of one call.
#[derive(Debug)]
pub struct CallSession {
    state: CallState,
    call_id: Option<String>,
    account_id: Option<String>,
    caller_id_number: Option<String>,
    callee_id_number: Option<String>,
    encoding: AudioEncoding,
    sample_rate: Option<u32>,
    agent_connected: bool,
    has_delivered_audio: bool,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    pub stats: CallStats,
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CallSession {
    pub fn new() -> Self {
        Self {
            state: CallState::Idle,
            call_id: None,
            account_id: None,
            caller_id_number: None,
            callee_id_number: None,
            encoding: AudioEncoding::Unset,
            sample_rate: None,
            agent_connected: false,
            has_delivered_audio: false,
            started_at: None,
            ended_at: None,
            stats: CallStats::default(),
        }
    }

    /// Idle -> Active. Binds identifiers and media format exactly once.
    ///
    /// A missing encoding or a missing/zero rate leaves the encoding `Unset`,
    /// which suppresses audio for the rest of the call.
    ///
    /// Returns `false` when the session was not idle; nothing changes then.
    pub fn start(&mut self, start: StartPayload) -> bool {
        if self.state != CallState::Idle {
            return false;
        }

        let (encoding, sample_rate) = match start.media_format {
            Some(format) => match (format.encoding, format.sample_rate) {
                (Some(encoding), Some(rate)) if rate > 0 => (AudioEncoding::from_declared(&encoding), Some(rate)),
                _ => (AudioEncoding::Unset, None),
            },
            None => (AudioEncoding::Unset, None),
        };

        self.call_id = Some(start.call_id);
        self.account_id = Some(start.account_id);
        self.caller_id_number = start.caller_id_number;
        self.callee_id_number = start.callee_id_number;
        self.encoding = encoding;
        self.sample_rate = if encoding == AudioEncoding::Unset { None } else { sample_rate };
        self.started_at = Some(Utc::now());
        self.state = CallState::Active;
        true
    }

    /// Active -> Closed after a `stop` event. Returns `false` if not active.
    pub fn stop(&mut self) -> bool {
        if self.state != CallState::Active {
            return false;
        }
        self.close();
        true
    }

    /// Any -> Closed after either socket went away. Returns `false` if already closed.
    pub fn disconnect(&mut self) -> bool {
        if self.state == CallState::Closed {
            return false;
        }
        self.close();
        true
    }

    fn close(&mut self) {
        self.state = CallState::Closed;
        self.ended_at = Some(Utc::now());
    }

    pub fn mark_agent_connected(&mut self) {
        self.agent_connected = true;
    }

    pub fn mark_audio_delivered(&mut self) {
        self.has_delivered_audio = true;
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn is_call_active(&self) -> bool {
        self.state == CallState::Active
    }

    pub fn agent_connected(&self) -> bool {
        self.agent_connected
    }

    pub fn has_delivered_audio(&self) -> bool {
        self.has_delivered_audio
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn caller_id_number(&self) -> Option<&str> {
        self.caller_id_number.as_deref()
    }

    pub fn callee_id_number(&self) -> Option<&str> {
        self.callee_id_number.as_deref()
    }

    pub fn encoding(&self) -> AudioEncoding {
        self.encoding
    }

    /// Caller audio may flow to the agent.
    pub fn can_forward_to_agent(&self) -> bool {
        self.is_call_active() && self.agent_connected
    }

    /// Format for agent audio heading to the telephony side, once resolved.
    pub fn telephony_format(&self) -> Option<MediaFormat> {
        if !self.is_call_active() {
            return None;
        }
        match (self.encoding, self.sample_rate) {
            (AudioEncoding::Unset, _) | (_, None) => None,
            (encoding, Some(sample_rate)) => Some(MediaFormat { encoding, sample_rate }),
        }
    }

    /// Identifiers for outbound media events while the call is live.
    pub fn call_ids(&self) -> Option<(&str, &str)> {
        if !self.is_call_active() {
            return None;
        }
        Some((self.call_id.as_deref()?, self.account_id.as_deref()?))
    }

    /// Seconds between `start` and the end of the call (or now).
    pub fn duration_seconds(&self) -> f64 {
        match self.started_at {
            Some(started) => {
                let end = self.ended_at.unwrap_or_else(Utc::now);
                end.signed_duration_since(started).num_milliseconds() as f64 / 1000.0
            }
            None => 0.0,
        }
    }
}
