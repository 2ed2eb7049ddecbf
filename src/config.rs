//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml, optional)
//! - Environment variables (with APP_ prefix, `__` between nesting levels)
//! - Deployment overrides (HOST, PORT, AGENT_WS_URL, PUBLIC_WS_URL)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Deployment overrides
//! 2. Environment variables (APP_SERVER__PORT, APP_AGENT__BASE_URL, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! ## The Two Remote Addresses:
//! - `agent.base_url`: where the bridge dials the voice agent for every call
//! - `telephony.public_ws_url`: where the telephony platform can reach *us*;
//!   it is embedded in the call-control document returned by the webhook

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub telephony: TelephonyConfig,
    pub agent: AgentConfig,
    pub bridge: BridgeConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// How the telephony platform reaches the media socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    /// Public base address, e.g. `wss://bridge.example.com`
    pub public_ws_url: String,
    /// Path of the media WebSocket, appended to `public_ws_url`
    pub stream_path: String,
    /// Content type requested from the platform in the control document
    pub content_type: String,
}

/// The voice agent on the other side of every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent WebSocket base address, e.g. `ws://agent:8001`
    pub base_url: String,
    /// How long to wait for the agent socket before abandoning the call
    pub connect_timeout_ms: u64,
    /// Rate at which the agent expects caller PCM
    pub input_sample_rate: u32,
    /// Rate at which the agent produces PCM
    pub output_sample_rate: u32,
    /// Sent once the call is live so the agent speaks first
    pub greeting_text: String,
    /// Sent when the telephony side stops the stream
    pub farewell_text: String,
}

/// Per-call relay behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Delay between the stop event and tearing down the agent socket
    pub stop_grace_ms: u64,
    /// Forward opus frames untouched instead of dropping them
    pub opus_passthrough: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            telephony: TelephonyConfig {
                public_ws_url: "ws://localhost:8000".to_string(),
                stream_path: "/media".to_string(),
                content_type: "audio/x-mulaw;rate=8000".to_string(),
            },
            agent: AgentConfig {
                base_url: "ws://localhost:8001".to_string(),
                connect_timeout_ms: 10_000,
                input_sample_rate: 24_000,
                output_sample_rate: 24_000,
                greeting_text: "The caller has joined the call. Please greet them.".to_string(),
                farewell_text: "The caller has ended the call.".to_string(),
            },
            bridge: BridgeConfig {
                stop_grace_ms: 500,
                opus_passthrough: false,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from every source in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_AGENT__CONNECT_TIMEOUT_MS=5000`: Shorter agent connect bound
    /// - `PORT=3000`: Special case for deployment platforms
    /// - `AGENT_WS_URL=wss://agent.internal`: Agent base address
    /// - `PUBLIC_WS_URL=wss://bridge.example.com`: Address given to the telephony platform
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // Double underscore keeps snake_case field names intact
            .add_source(config::Environment::with_prefix("APP").prefix_separator("_").separator("__"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(agent_url) = env::var("AGENT_WS_URL") {
            settings = settings.set_override("agent.base_url", agent_url)?;
        }

        if let Ok(public_url) = env::var("PUBLIC_WS_URL") {
            settings = settings.set_override("telephony.public_ws_url", public_url)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if !is_ws_url(&self.agent.base_url) {
            return Err(anyhow::anyhow!(
                "Agent base URL must start with ws:// or wss://, got '{}'",
                self.agent.base_url
            ));
        }

        if !is_ws_url(&self.telephony.public_ws_url) {
            return Err(anyhow::anyhow!(
                "Public WebSocket URL must start with ws:// or wss://, got '{}'",
                self.telephony.public_ws_url
            ));
        }

        if !self.telephony.stream_path.starts_with('/') {
            return Err(anyhow::anyhow!("Stream path must start with '/'"));
        }

        if self.agent.connect_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Agent connect timeout must be greater than 0"));
        }

        if self.agent.input_sample_rate == 0 || self.agent.output_sample_rate == 0 {
            return Err(anyhow::anyhow!("Agent sample rates must be greater than 0"));
        }

        Ok(())
    }

    /// Apply a partial JSON update to the agent and bridge sections.
    ///
    /// Only fields present in the JSON change, so `{"agent": {"connect_timeout_ms": 5000}}`
    /// touches exactly one value. Server and telephony settings are fixed at
    /// startup because the listener and the published stream URL depend on them.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(agent) = partial_config.get("agent") {
            if let Some(url) = agent.get("base_url").and_then(|v| v.as_str()) {
                self.agent.base_url = url.to_string();
            }
            if let Some(timeout) = agent.get("connect_timeout_ms").and_then(|v| v.as_u64()) {
                self.agent.connect_timeout_ms = timeout;
            }
            if let Some(rate) = agent.get("input_sample_rate").and_then(|v| v.as_u64()) {
                self.agent.input_sample_rate = u32::try_from(rate)?;
            }
            if let Some(rate) = agent.get("output_sample_rate").and_then(|v| v.as_u64()) {
                self.agent.output_sample_rate = u32::try_from(rate)?;
            }
            if let Some(text) = agent.get("greeting_text").and_then(|v| v.as_str()) {
                self.agent.greeting_text = text.to_string();
            }
            if let Some(text) = agent.get("farewell_text").and_then(|v| v.as_str()) {
                self.agent.farewell_text = text.to_string();
            }
        }

        if let Some(bridge) = partial_config.get("bridge") {
            if let Some(grace) = bridge.get("stop_grace_ms").and_then(|v| v.as_u64()) {
                self.bridge.stop_grace_ms = grace;
            }
            if let Some(passthrough) = bridge.get("opus_passthrough").and_then(|v| v.as_bool()) {
                self.bridge.opus_passthrough = passthrough;
            }
        }

        self.validate()?;
        Ok(())
    }

    /// Full URL the telephony platform should open for media.
    pub fn public_stream_url(&self) -> String {
        format!(
            "{}{}",
            self.telephony.public_ws_url.trim_end_matches('/'),
            self.telephony.stream_path
        )
    }

    pub fn agent_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.agent.connect_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.bridge.stop_grace_ms)
    }
}

fn is_ws_url(url: &str) -> bool {
    url.starts_with("ws://") || url.starts_with("wss://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.agent.connect_timeout_ms, 10_000);
        assert_eq!(config.agent.input_sample_rate, 24_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.base_url = "http://agent:8001".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.connect_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.telephony.stream_path = "media".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"agent": {"connect_timeout_ms": 2500}, "bridge": {"opus_passthrough": true}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.agent.connect_timeout_ms, 2500);
        assert!(config.bridge.opus_passthrough);
        // Untouched fields keep their values
        assert_eq!(config.agent.base_url, "ws://localhost:8001");
        assert_eq!(config.bridge.stop_grace_ms, 500);
    }

    #[test]
    fn test_config_update_rejects_invalid_values() {
        let mut config = AppConfig::default();
        let json = r#"{"agent": {"input_sample_rate": 0}}"#;
        assert!(config.update_from_json(json).is_err());
    }

    #[test]
    fn test_public_stream_url() {
        let mut config = AppConfig::default();
        config.telephony.public_ws_url = "wss://bridge.example.com/".to_string();
        assert_eq!(config.public_stream_url(), "wss://bridge.example.com/media");
    }
}
