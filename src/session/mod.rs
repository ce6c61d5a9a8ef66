//! Session lifecycle: handshake, keepalive, state, and events

pub mod event;
pub(crate) mod handshake;
pub(crate) mod keepalive;
pub mod state;

pub use event::SessionEvent;
pub use handshake::{HandshakePhase, MediaPlan, NegotiatedComponent};
pub use state::StreamState;
