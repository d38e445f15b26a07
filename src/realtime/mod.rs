//! Realtime session channel and its auth-driven lifecycle

pub mod channel;
pub mod supervisor;

pub use channel::{ChannelState, RealtimeMessage, SessionChannel, WebSocketChannel};
pub use supervisor::RealtimeSupervisor;
