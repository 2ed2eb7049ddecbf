//! # Telephony Media WebSocket
//!
//! Each telephony connection on the stream path becomes one [`MediaBridge`]
//! actor. The actor owns the telephony socket and dials its own agent socket;
//! neither is shared with any other call.
//!
//! ## Bridge Lifecycle:
//! 1. **Upgrade**: the platform opens the stream path and the actor starts
//! 2. **Dial**: the agent socket is opened, bounded by `agent.connect_timeout_ms`.
//!    If it is not ready in time the telephony socket is closed and the call abandoned
//! 3. **Relay**: frames from both sockets go through [`CallBridge`]
//! 4. **Stop**: on `stop` the farewell goes out and both sockets close after
//!    `bridge.stop_grace_ms`
//! 5. **Disconnect**: if either socket closes first, the other is closed immediately
//!
//! ## Message Format:
//! - **Telephony**: JSON text frames (`connected`, `start`, `media`, `stop`)
//! - **Agent**: JSON text frames `{mime_type, data, role}` plus turn signals

use crate::bridge::agent::{self, AgentStream};
use crate::bridge::messages::AgentRequest;
use crate::bridge::relay::{BridgeAction, CallBridge, RelaySettings};
use crate::error::BridgeError;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as AgentSocketError, Message as AgentFrame};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Upper bound on a reassembled telephony message.
const MAX_FRAGMENTED_MESSAGE: usize = 1 << 20;

/// Partial telephony message split across continuation frames.
struct Fragments {
    is_text: bool,
    buffer: web::BytesMut,
}

/// One call: telephony socket in, agent socket out.
pub struct MediaBridge {
    id: Uuid,
    span: Span,
    bridge: CallBridge,
    app_state: AppState,
    agent_url: String,
    connect_timeout: Duration,
    stop_grace: Duration,
    /// Writer half of the agent socket; `None` until connected and after close
    agent_tx: Option<mpsc::UnboundedSender<AgentFrame>>,
    fragments: Option<Fragments>,
    hangup_scheduled: bool,
    closing: bool,
}

impl MediaBridge {
    /// Snapshot the current config; runtime updates only reach later calls.
    pub fn new(app_state: AppState) -> Self {
        let config = app_state.get_config();
        let id = Uuid::new_v4();

        Self {
            id,
            span: info_span!("call", bridge_id = %id),
            bridge: CallBridge::new(RelaySettings::from(&config)),
            agent_url: agent::session_url(&config.agent.base_url, &id),
            connect_timeout: config.agent_connect_timeout(),
            stop_grace: config.stop_grace(),
            app_state,
            agent_tx: None,
            fragments: None,
            hangup_scheduled: false,
            closing: false,
        }
    }

    fn on_agent_dialed(&mut self, result: Result<AgentStream, BridgeError>, ctx: &mut ws::WebsocketContext<Self>) {
        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                error!("Voice agent unavailable, abandoning call: {}", e);
                self.app_state.call_failed();
                let reason = ws::CloseReason {
                    code: ws::CloseCode::Again,
                    description: Some("voice agent unavailable".to_string()),
                };
                self.shutdown(Some(reason), ctx);
                return;
            }
        };

        info!("Voice agent connected");
        let (mut sink, stream) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<AgentFrame>();

        // Single writer keeps agent frames in the order the relay produced them.
        actix_web::rt::spawn(
            async move {
                while let Some(frame) = rx.recv().await {
                    if let Err(e) = sink.send(frame).await {
                        warn!("Agent write failed: {}", e);
                        break;
                    }
                }
                if let Err(e) = sink.close().await {
                    debug!("Agent close handshake: {}", e);
                }
            }
            .instrument(self.span.clone()),
        );

        self.agent_tx = Some(tx);
        ctx.add_stream(stream);

        let actions = self.bridge.on_agent_connected();
        self.apply(actions, ctx);
    }

    fn apply(&mut self, actions: Vec<BridgeAction>, ctx: &mut ws::WebsocketContext<Self>) {
        for action in actions {
            match action {
                BridgeAction::ToAgent(request) => self.send_to_agent(&request),
                BridgeAction::ToTelephony(event) => match serde_json::to_string(&event) {
                    Ok(json) => ctx.text(json),
                    Err(e) => error!("Failed to serialize media event: {}", e),
                },
                BridgeAction::Hangup => self.schedule_hangup(ctx),
            }
        }
    }

    fn send_to_agent(&self, request: &AgentRequest) {
        let Some(tx) = &self.agent_tx else {
            debug!("Agent socket not open; dropping {}", request.mime_type);
            return;
        };

        match serde_json::to_string(request) {
            Ok(json) => {
                if tx.send(AgentFrame::Text(json)).is_err() {
                    warn!("Agent writer has stopped; dropping {}", request.mime_type);
                }
            }
            Err(e) => error!("Failed to serialize agent request: {}", e),
        }
    }

    fn on_telephony_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match self.bridge.on_telephony_text(text) {
            Ok(actions) => self.apply(actions, ctx),
            Err(e) => warn!("Dropping telephony frame: {}", e),
        }
    }

    fn begin_fragments(&mut self, is_text: bool, data: &[u8]) {
        if self.fragments.is_some() {
            warn!("New fragmented message before the previous one finished; discarding partial data");
        }
        self.fragments = Some(Fragments {
            is_text,
            buffer: web::BytesMut::from(data),
        });
    }

    /// Reassemble a fragmented telephony message and relay it once complete.
    fn on_fragment(&mut self, item: actix_http::ws::Item, ctx: &mut ws::WebsocketContext<Self>) {
        let (data, is_last) = match item {
            actix_http::ws::Item::FirstText(data) => return self.begin_fragments(true, &data),
            actix_http::ws::Item::FirstBinary(data) => return self.begin_fragments(false, &data),
            actix_http::ws::Item::Continue(data) => (data, false),
            actix_http::ws::Item::Last(data) => (data, true),
        };

        let Some(fragments) = self.fragments.as_mut() else {
            warn!("Continuation frame without a first fragment");
            return;
        };
        if fragments.buffer.len() + data.len() > MAX_FRAGMENTED_MESSAGE {
            warn!("Fragmented telephony message exceeds {} bytes; discarding", MAX_FRAGMENTED_MESSAGE);
            self.fragments = None;
            return;
        }
        fragments.buffer.extend_from_slice(&data);

        if !is_last {
            return;
        }
        let Some(message) = self.fragments.take() else {
            return;
        };
        if !message.is_text {
            debug!("Ignoring {} byte fragmented binary message from telephony", message.buffer.len());
            return;
        }
        match std::str::from_utf8(&message.buffer) {
            Ok(text) => self.on_telephony_text(text, ctx),
            Err(e) => warn!("Dropping fragmented telephony message with invalid UTF-8: {}", e),
        }
    }

    /// Give the farewell time to reach the agent, then close both sides.
    fn schedule_hangup(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if self.hangup_scheduled {
            return;
        }
        self.hangup_scheduled = true;
        debug!("Closing both sockets in {:?}", self.stop_grace);

        ctx.run_later(self.stop_grace, |act, ctx| {
            let span = act.span.clone();
            let _enter = span.enter();
            act.shutdown(Some(ws::CloseCode::Normal.into()), ctx);
        });
    }

    fn close_agent(&mut self) {
        // Dropping the sender lets the writer drain and send the close frame.
        if self.agent_tx.take().is_some() {
            debug!("Closing agent socket");
        }
    }

    /// Close both sockets and stop the actor. Safe to call more than once.
    fn shutdown(&mut self, reason: Option<ws::CloseReason>, ctx: &mut ws::WebsocketContext<Self>) {
        self.bridge.on_disconnect();
        if !self.closing {
            self.closing = true;
            self.close_agent();
            ctx.close(reason);
        }
        ctx.stop();
    }
}

impl Actor for MediaBridge {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let span = self.span.clone();
        let _enter = span.enter();

        info!("Telephony stream opened; dialing {}", self.agent_url);
        self.app_state.call_started();

        let url = self.agent_url.clone();
        let timeout = self.connect_timeout;
        let dial = async move { agent::connect(&url, timeout).await };
        ctx.spawn(dial.into_actor(self).map(|result, act, ctx| {
            let span = act.span.clone();
            let _enter = span.enter();
            act.on_agent_dialed(result, ctx);
        }));
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let span = self.span.clone();
        let _enter = span.enter();

        self.bridge.on_disconnect();
        self.close_agent();
        self.app_state.call_ended();

        let session = self.bridge.session();
        info!(
            bridge_id = %self.id,
            call_id = session.call_id().unwrap_or("none"),
            duration_secs = session.duration_seconds(),
            frames_to_agent = session.stats.frames_to_agent,
            frames_to_telephony = session.stats.frames_to_telephony,
            dropped_frames = session.stats.dropped_frames,
            "Media bridge closed"
        );
    }
}

/// Frames from the telephony platform.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MediaBridge {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let span = self.span.clone();
        let _enter = span.enter();

        match msg {
            Ok(ws::Message::Text(text)) => self.on_telephony_text(&text, ctx),
            Ok(ws::Message::Binary(data)) => {
                debug!("Ignoring {} byte binary frame from telephony", data.len());
            }
            Ok(ws::Message::Ping(data)) => ctx.pong(&data),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!("Telephony socket closed: {:?}", reason);
                self.shutdown(reason, ctx);
            }
            Ok(ws::Message::Continuation(item)) => self.on_fragment(item, ctx),
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                error!("Telephony protocol error: {}", e);
                self.shutdown(None, ctx);
            }
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        let span = self.span.clone();
        let _enter = span.enter();
        debug!("Telephony stream ended");
        self.shutdown(None, ctx);
    }
}

/// Frames from the voice agent.
impl StreamHandler<Result<AgentFrame, AgentSocketError>> for MediaBridge {
    fn handle(&mut self, msg: Result<AgentFrame, AgentSocketError>, ctx: &mut Self::Context) {
        let span = self.span.clone();
        let _enter = span.enter();

        match msg {
            Ok(AgentFrame::Text(text)) => match self.bridge.on_agent_text(&text) {
                Ok(actions) => self.apply(actions, ctx),
                Err(e) => warn!("Dropping agent frame: {}", e),
            },
            Ok(AgentFrame::Binary(data)) => {
                debug!("Ignoring {} byte binary frame from agent", data.len());
            }
            Ok(AgentFrame::Close(frame)) => {
                info!("Agent closed the session: {:?}", frame);
                self.agent_tx = None;
                let reason = ws::CloseReason {
                    code: ws::CloseCode::Normal,
                    description: Some("voice agent disconnected".to_string()),
                };
                self.shutdown(Some(reason), ctx);
            }
            Ok(_) => {}
            Err(e) => {
                let e = BridgeError::from(e);
                error!("Agent socket failed: {}", e);
                self.agent_tx = None;
                self.shutdown(Some(ws::CloseCode::Error.into()), ctx);
            }
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        let span = self.span.clone();
        let _enter = span.enter();
        debug!("Agent stream ended");
        self.agent_tx = None;
        self.shutdown(None, ctx);
    }
}

/// WebSocket endpoint for the telephony media stream.
///
/// ## HTTP to WebSocket Upgrade:
/// Upgrades the request and hands the socket to a fresh [`MediaBridge`].
pub async fn media_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!("New telephony media connection from: {:?}", req.connection_info().peer_addr());
    let bridge = MediaBridge::new(app_state.get_ref().clone());
    ws::start(bridge, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec;
    use crate::config::AppConfig;
    use actix_web::{App, HttpServer};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use futures_util::stream::Stream;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::{Data, OpCode};
    use tokio_tungstenite::tungstenite::protocol::frame::Frame;
    use tokio_tungstenite::{accept_async, connect_async};

    const WAIT: Duration = Duration::from_secs(3);

    async fn spawn_server(config: AppConfig) -> (SocketAddr, AppState) {
        let state = AppState::new(config.clone());
        let app_state = state.clone();
        let path = config.telephony.stream_path.clone();

        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(app_state.clone()))
                .route(&path, web::get().to(media_websocket))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        (addr, state)
    }

    fn test_config(agent_addr: SocketAddr) -> AppConfig {
        let mut config = AppConfig::default();
        config.agent.base_url = format!("ws://{}", agent_addr);
        config.agent.greeting_text = "hello".to_string();
        config.agent.farewell_text = "bye".to_string();
        config.bridge.stop_grace_ms = 50;
        config
    }

    /// Next text frame, skipping control frames.
    async fn next_text<S>(socket: &mut S) -> String
    where
        S: Stream<Item = Result<AgentFrame, AgentSocketError>> + Unpin,
    {
        loop {
            let frame = tokio::time::timeout(WAIT, socket.next())
                .await
                .expect("timed out waiting for a text frame")
                .expect("socket ended")
                .expect("socket error");
            match frame {
                AgentFrame::Text(text) => return text,
                AgentFrame::Close(frame) => panic!("Socket closed early: {:?}", frame),
                _ => continue,
            }
        }
    }

    /// Wait until the peer closes or the stream ends.
    async fn expect_closed<S>(socket: &mut S)
    where
        S: Stream<Item = Result<AgentFrame, AgentSocketError>> + Unpin,
    {
        let closed = tokio::time::timeout(WAIT, async {
            loop {
                match socket.next().await {
                    None | Some(Err(_)) | Some(Ok(AgentFrame::Close(_))) => return,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "socket was not closed");
    }

    fn start_event(encoding: &str, rate: u32) -> String {
        json!({
            "event": "start",
            "start": {
                "callId": "call-1",
                "accountId": "acct-9",
                "mediaFormat": { "encoding": encoding, "sampleRate": rate }
            }
        })
        .to_string()
    }

    #[actix_web::test]
    async fn test_unreachable_agent_closes_telephony_socket() {
        // Accepts TCP but never completes the WebSocket handshake.
        let agent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let agent_addr = agent.local_addr().unwrap();
        let holder = tokio::spawn(async move {
            let (socket, _) = agent.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(socket);
        });

        let mut config = test_config(agent_addr);
        config.agent.connect_timeout_ms = 200;
        let (addr, state) = spawn_server(config).await;

        let (mut telephony, _) = connect_async(format!("ws://{}/media", addr)).await.unwrap();
        expect_closed(&mut telephony).await;

        holder.abort();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.failed_calls, 1);
        assert_eq!(metrics.active_calls, 0);
    }

    #[actix_web::test]
    async fn test_ulaw_call_round_trip() {
        let agent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (addr, _state) = spawn_server(test_config(agent.local_addr().unwrap())).await;

        let (mut telephony, _) = connect_async(format!("ws://{}/media", addr)).await.unwrap();
        let (socket, _) = tokio::time::timeout(WAIT, agent.accept()).await.unwrap().unwrap();
        let mut agent_ws = accept_async(socket).await.unwrap();

        telephony.send(AgentFrame::Text(start_event("g711_ulaw", 8000))).await.unwrap();
        let greeting: AgentRequest = serde_json::from_str(&next_text(&mut agent_ws).await).unwrap();
        assert_eq!(greeting, AgentRequest::text("hello"));

        // Caller audio: 20 ms of μ-law at 8 kHz becomes 20 ms of PCM at 24 kHz.
        let ulaw = vec![0x55u8; 160];
        let media = json!({"event": "media", "media": {"payload": BASE64.encode(&ulaw)}});
        telephony.send(AgentFrame::Text(media.to_string())).await.unwrap();

        let request: AgentRequest = serde_json::from_str(&next_text(&mut agent_ws).await).unwrap();
        assert_eq!(request.mime_type, "audio/pcm");
        assert_eq!(request.role, "user");
        assert_eq!(BASE64.decode(&request.data).unwrap().len(), 960);

        // Agent audio: 480 samples at 24 kHz become 160 μ-law bytes.
        let pcm: Vec<u8> = (0..480i16).flat_map(|s| s.to_le_bytes()).collect();
        let reply = json!({"mime_type": "audio/pcm", "data": BASE64.encode(&pcm), "role": "model"});
        agent_ws.send(AgentFrame::Text(reply.to_string())).await.unwrap();

        let event: Value = serde_json::from_str(&next_text(&mut telephony).await).unwrap();
        assert_eq!(event["event"], "media");
        assert_eq!(event["callId"], "call-1");
        assert_eq!(event["accountId"], "acct-9");
        let payload = BASE64.decode(event["media"]["payload"].as_str().unwrap()).unwrap();
        assert_eq!(payload.len(), 160);
        assert_eq!(payload[1], codec::linear_to_ulaw(3));

        // Stop: farewell reaches the agent, then both sockets close.
        telephony.send(AgentFrame::Text(r#"{"event":"stop"}"#.to_string())).await.unwrap();
        let farewell: AgentRequest = serde_json::from_str(&next_text(&mut agent_ws).await).unwrap();
        assert_eq!(farewell, AgentRequest::text("bye"));

        expect_closed(&mut agent_ws).await;
        expect_closed(&mut telephony).await;
    }

    #[actix_web::test]
    async fn test_agent_disconnect_closes_telephony() {
        let agent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (addr, _state) = spawn_server(test_config(agent.local_addr().unwrap())).await;

        let (mut telephony, _) = connect_async(format!("ws://{}/media", addr)).await.unwrap();
        let (socket, _) = tokio::time::timeout(WAIT, agent.accept()).await.unwrap().unwrap();
        let mut agent_ws = accept_async(socket).await.unwrap();

        telephony.send(AgentFrame::Text(start_event("pcm16", 24000))).await.unwrap();
        next_text(&mut agent_ws).await;

        agent_ws.close(None).await.unwrap();
        expect_closed(&mut telephony).await;
    }

    #[actix_web::test]
    async fn test_telephony_disconnect_closes_agent() {
        let agent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (addr, state) = spawn_server(test_config(agent.local_addr().unwrap())).await;

        let (mut telephony, _) = connect_async(format!("ws://{}/media", addr)).await.unwrap();
        let (socket, _) = tokio::time::timeout(WAIT, agent.accept()).await.unwrap().unwrap();
        let mut agent_ws = accept_async(socket).await.unwrap();

        telephony.send(AgentFrame::Text(start_event("g711_ulaw", 8000))).await.unwrap();
        next_text(&mut agent_ws).await;
        assert_eq!(state.get_metrics_snapshot().active_calls, 1);

        telephony.close(None).await.unwrap();
        expect_closed(&mut agent_ws).await;
    }

    #[actix_web::test]
    async fn test_each_call_gets_its_own_agent_socket() {
        let agent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (addr, state) = spawn_server(test_config(agent.local_addr().unwrap())).await;
        let url = format!("ws://{}/media", addr);

        let (_first, _) = connect_async(url.as_str()).await.unwrap();
        let (_second, _) = connect_async(url.as_str()).await.unwrap();

        for _ in 0..2 {
            let accepted = tokio::time::timeout(WAIT, agent.accept()).await;
            assert!(accepted.is_ok(), "expected one agent dial per call");
        }
        assert_eq!(state.get_metrics_snapshot().total_calls, 2);
    }

    /// Split a text message into a first fragment and a final continuation.
    fn fragmented(text: &str) -> (AgentFrame, AgentFrame) {
        let (head, tail) = text.as_bytes().split_at(text.len() / 2);
        (
            AgentFrame::Frame(Frame::message(head.to_vec(), OpCode::Data(Data::Text), false)),
            AgentFrame::Frame(Frame::message(tail.to_vec(), OpCode::Data(Data::Continue), true)),
        )
    }

    #[actix_web::test]
    async fn test_fragmented_telephony_messages_are_reassembled() {
        let agent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (addr, _state) = spawn_server(test_config(agent.local_addr().unwrap())).await;

        let (mut telephony, _) = connect_async(format!("ws://{}/media", addr)).await.unwrap();
        let (socket, _) = tokio::time::timeout(WAIT, agent.accept()).await.unwrap().unwrap();
        let mut agent_ws = accept_async(socket).await.unwrap();

        telephony.send(AgentFrame::Text(start_event("pcm16", 24000))).await.unwrap();
        next_text(&mut agent_ws).await;

        let media = json!({"event": "media", "media": {"payload": "AQIDBA=="}}).to_string();
        let (first, last) = fragmented(&media);
        telephony.send(first).await.unwrap();
        telephony.send(last).await.unwrap();

        let request: AgentRequest = serde_json::from_str(&next_text(&mut agent_ws).await).unwrap();
        assert_eq!(request, AgentRequest::audio("audio/pcm", "AQIDBA==".to_string()));

        let (first, last) = fragmented(r#"{"event":"stop"}"#);
        telephony.send(first).await.unwrap();
        telephony.send(last).await.unwrap();

        let farewell: AgentRequest = serde_json::from_str(&next_text(&mut agent_ws).await).unwrap();
        assert_eq!(farewell, AgentRequest::text("bye"));
        expect_closed(&mut telephony).await;
    }

    #[actix_web::test]
    async fn test_closing_one_call_leaves_others_running() {
        let agent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (addr, state) = spawn_server(test_config(agent.local_addr().unwrap())).await;
        let url = format!("ws://{}/media", addr);

        // Dial one call at a time so each agent socket is paired with its call.
        let (mut first, _) = connect_async(url.as_str()).await.unwrap();
        let (socket, _) = tokio::time::timeout(WAIT, agent.accept()).await.unwrap().unwrap();
        let mut first_agent = accept_async(socket).await.unwrap();

        let (mut second, _) = connect_async(url.as_str()).await.unwrap();
        let (socket, _) = tokio::time::timeout(WAIT, agent.accept()).await.unwrap().unwrap();
        let mut second_agent = accept_async(socket).await.unwrap();

        first.send(AgentFrame::Text(start_event("pcm16", 24000))).await.unwrap();
        next_text(&mut first_agent).await;
        second.send(AgentFrame::Text(start_event("pcm16", 24000))).await.unwrap();
        next_text(&mut second_agent).await;

        first.close(None).await.unwrap();
        expect_closed(&mut first_agent).await;

        let media = json!({"event": "media", "media": {"payload": "AQIDBA=="}});
        second.send(AgentFrame::Text(media.to_string())).await.unwrap();
        let request: AgentRequest = serde_json::from_str(&next_text(&mut second_agent).await).unwrap();
        assert_eq!(request, AgentRequest::audio("audio/pcm", "AQIDBA==".to_string()));
        assert_eq!(state.get_metrics_snapshot().total_calls, 2);
    }

    #[actix_web::test]
    async fn test_malformed_telephony_frame_keeps_call_up() {
        let agent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (addr, _state) = spawn_server(test_config(agent.local_addr().unwrap())).await;

        let (mut telephony, _) = connect_async(format!("ws://{}/media", addr)).await.unwrap();
        let (socket, _) = tokio::time::timeout(WAIT, agent.accept()).await.unwrap().unwrap();
        let mut agent_ws = accept_async(socket).await.unwrap();

        telephony.send(AgentFrame::Text(start_event("pcm16", 24000))).await.unwrap();
        next_text(&mut agent_ws).await;

        telephony.send(AgentFrame::Text("{not json".to_string())).await.unwrap();

        let media = json!({"event": "media", "media": {"payload": "AQIDBA=="}});
        telephony.send(AgentFrame::Text(media.to_string())).await.unwrap();
        let request: AgentRequest = serde_json::from_str(&next_text(&mut agent_ws).await).unwrap();
        assert_eq!(request, AgentRequest::audio("audio/pcm", "AQIDBA==".to_string()));
    }
}
