//! # Call Relay
//!
//! Socket-free core of a media bridge. [`CallBridge`] takes raw text frames
//! from either side, updates the [`CallSession`], runs the codec and resampler
//! and answers with the [`BridgeAction`]s the transport layer must carry out.
//!
//! ## Audio Paths:
//! - **Caller -> agent**: μ-law is decoded and resampled up to the agent input
//!   rate; PCM16 passes through untouched.
//! - **Agent -> caller**: PCM is resampled down to the call rate and μ-law
//!   encoded; PCM16 sessions receive the agent payload untouched.
//!
//! Errors are returned per frame. The caller logs them and keeps the call up.

use crate::audio::{codec, resample::resample};
use crate::bridge::messages::{AgentMessage, AgentRequest, OutboundMediaEvent, StartPayload, TelephonyEvent};
use crate::bridge::session::{AudioEncoding, CallSession, CallState};
use crate::config::AppConfig;
use crate::error::BridgeError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{debug, info, warn};

/// Fixed facts about the agent side plus per-call relay switches.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub agent_input_rate: u32,
    pub agent_output_rate: u32,
    pub greeting_text: String,
    pub farewell_text: String,
    pub opus_passthrough: bool,
}

impl From<&AppConfig> for RelaySettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            agent_input_rate: config.agent.input_sample_rate,
            agent_output_rate: config.agent.output_sample_rate,
            greeting_text: config.agent.greeting_text.clone(),
            farewell_text: config.agent.farewell_text.clone(),
            opus_passthrough: config.bridge.opus_passthrough,
        }
    }
}

/// Work the transport layer performs on behalf of the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeAction {
    /// Send a message on the agent socket
    ToAgent(AgentRequest),
    /// Send a media event on the telephony socket
    ToTelephony(OutboundMediaEvent),
    /// The call ended normally; tear both sockets down after the grace delay
    Hangup,
}

/// Relay state for one call.
#[derive(Debug)]
pub struct CallBridge {
    session: CallSession,
    settings: RelaySettings,
    greeted: bool,
}

impl CallBridge {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            session: CallSession::new(),
            settings,
            greeted: false,
        }
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    /// The agent socket is open. May release the greeting.
    pub fn on_agent_connected(&mut self) -> Vec<BridgeAction> {
        self.session.mark_agent_connected();
        self.greeting_if_ready().into_iter().collect()
    }

    /// Either socket went away. Returns `true` if this closed the session.
    pub fn on_disconnect(&mut self) -> bool {
        self.session.disconnect()
    }

    /// Handle one text frame from the telephony socket.
    pub fn on_telephony_text(&mut self, text: &str) -> Result<Vec<BridgeAction>, BridgeError> {
        if self.session.state() == CallState::Closed {
            debug!("Ignoring telephony frame after call closed");
            return Ok(Vec::new());
        }

        match serde_json::from_str::<TelephonyEvent>(text)? {
            TelephonyEvent::Connected => {
                info!("Telephony stream connected");
                Ok(Vec::new())
            }
            TelephonyEvent::Start { start } => Ok(self.handle_start(start)),
            TelephonyEvent::Media { media } => {
                let result = self.caller_audio(media.payload);
                if self.session.is_call_active() && !matches!(result, Ok(Some(_))) {
                    self.session.stats.dropped_frames += 1;
                }
                Ok(result?.map(BridgeAction::ToAgent).into_iter().collect())
            }
            TelephonyEvent::Stop => Ok(self.handle_stop()),
            TelephonyEvent::Unknown => {
                debug!("Ignoring unrecognised telephony event");
                Ok(Vec::new())
            }
        }
    }

    /// Handle one text frame from the agent socket.
    pub fn on_agent_text(&mut self, text: &str) -> Result<Vec<BridgeAction>, BridgeError> {
        let message: AgentMessage = serde_json::from_str(text)?;

        if let Some((mime_type, data)) = message.audio() {
            let result = self.agent_audio(mime_type, data);
            if self.session.is_call_active() && !matches!(result, Ok(Some(_))) {
                self.session.stats.dropped_frames += 1;
            }
            return Ok(result?.map(BridgeAction::ToTelephony).into_iter().collect());
        }

        if let Some(text) = message.text() {
            debug!(role = message.role.as_deref().unwrap_or("model"), "Agent text: {}", text);
        } else if let Some(mime_type) = message.unsupported_mime_type() {
            warn!(mime_type, "Unsupported mime type from agent; message dropped");
        }

        if message.is_interrupted() {
            info!("Agent reported interruption");
        }

        if message.is_turn_complete() {
            if self.session.has_delivered_audio() {
                debug!("Agent turn complete");
            } else {
                warn!("Agent turn complete but no audio has reached the caller yet");
            }
        }

        Ok(Vec::new())
    }

    fn handle_start(&mut self, start: StartPayload) -> Vec<BridgeAction> {
        if !self.session.start(start) {
            warn!(state = self.session.state().as_str(), "Ignoring start event; identifiers already bound");
            return Vec::new();
        }

        let encoding = self.session.encoding();
        info!(
            call_id = self.session.call_id().unwrap_or_default(),
            account_id = self.session.account_id().unwrap_or_default(),
            caller = self.session.caller_id_number().unwrap_or("unknown"),
            callee = self.session.callee_id_number().unwrap_or("unknown"),
            encoding = %encoding,
            "Call started"
        );

        match self.session.telephony_format() {
            None => warn!("Start event carried no usable media format; audio will not flow on this call"),
            Some(format) if encoding == AudioEncoding::Opus && !self.settings.opus_passthrough => {
                warn!(sample_rate = format.sample_rate, "Opus has no conversion path; frames will be dropped");
            }
            Some(format) if encoding == AudioEncoding::Pcm16 && format.sample_rate != self.settings.agent_input_rate => {
                warn!(
                    "PCM16 call at {} Hz forwarded unchanged to agent expecting {} Hz",
                    format.sample_rate, self.settings.agent_input_rate
                );
            }
            Some(_) => {}
        }

        self.greeting_if_ready().into_iter().collect()
    }

    fn handle_stop(&mut self) -> Vec<BridgeAction> {
        let agent_connected = self.session.agent_connected();
        if !self.session.stop() {
            debug!("Stop received before start; closing without notice");
            self.session.disconnect();
            return vec![BridgeAction::Hangup];
        }

        info!(call_id = self.session.call_id().unwrap_or_default(), "Call stopped by telephony side");

        let mut actions = Vec::with_capacity(2);
        if agent_connected {
            actions.push(BridgeAction::ToAgent(AgentRequest::text(&self.settings.farewell_text)));
        }
        actions.push(BridgeAction::Hangup);
        actions
    }

    fn greeting_if_ready(&mut self) -> Option<BridgeAction> {
        if self.greeted || !self.session.can_forward_to_agent() || self.settings.greeting_text.is_empty() {
            return None;
        }
        self.greeted = true;
        Some(BridgeAction::ToAgent(AgentRequest::text(&self.settings.greeting_text)))
    }

    /// Caller audio -> agent request. `Ok(None)` means the frame is dropped.
    fn caller_audio(&mut self, payload: String) -> Result<Option<AgentRequest>, BridgeError> {
        if !self.session.can_forward_to_agent() {
            debug!(
                state = self.session.state().as_str(),
                agent_connected = self.session.agent_connected(),
                "Dropping caller audio"
            );
            return Ok(None);
        }

        let Some(format) = self.session.telephony_format() else {
            return Ok(None);
        };

        let request = match format.encoding {
            AudioEncoding::G711Ulaw => {
                let ulaw = BASE64.decode(payload.as_bytes())?;
                let pcm = codec::decode(&ulaw);
                let pcm = resample(&pcm, format.sample_rate, self.settings.agent_input_rate);
                AgentRequest::audio("audio/pcm", BASE64.encode(pcm.as_ref()))
            }
            AudioEncoding::Pcm16 => AgentRequest::audio("audio/pcm", payload),
            AudioEncoding::Opus if self.settings.opus_passthrough => AgentRequest::audio("audio/opus", payload),
            AudioEncoding::Opus | AudioEncoding::Unset => return Ok(None),
        };

        self.session.stats.frames_to_agent += 1;
        Ok(Some(request))
    }

    /// Agent audio -> telephony media event. `Ok(None)` means the frame is dropped.
    fn agent_audio(&mut self, mime_type: &str, data: &str) -> Result<Option<OutboundMediaEvent>, BridgeError> {
        let Some((call_id, account_id)) = self.session.call_ids() else {
            debug!(mime_type, "Dropping agent audio; call not active");
            return Ok(None);
        };
        let Some(format) = self.session.telephony_format() else {
            return Ok(None);
        };

        let payload = match format.encoding {
            AudioEncoding::G711Ulaw => {
                let pcm = BASE64.decode(data.as_bytes())?;
                let pcm = resample(&pcm, self.settings.agent_output_rate, format.sample_rate);
                let ulaw = codec::encode(&pcm)?;
                BASE64.encode(ulaw)
            }
            AudioEncoding::Pcm16 => data.to_string(),
            AudioEncoding::Opus if self.settings.opus_passthrough => data.to_string(),
            AudioEncoding::Opus | AudioEncoding::Unset => return Ok(None),
        };

        let event = OutboundMediaEvent::new(call_id, account_id, payload);
        self.session.mark_audio_delivered();
        self.session.stats.frames_to_telephony += 1;
        Ok(Some(event))
    }
}
