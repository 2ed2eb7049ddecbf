//! # Media Bridge Core
//!
//! Everything a call needs besides the sockets themselves.
//!
//! - `messages`: JSON shapes on both sockets
//! - `session`: per-call state machine
//! - `relay`: transcoding and forwarding decisions
//! - `agent`: dialing the voice agent

pub mod agent;
pub mod messages;
pub mod relay;
pub mod session;
