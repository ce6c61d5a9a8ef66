//! ftl-rs: FTL ingest client library
//!
//! This library implements the control side of the FTL (Faster Than Light)
//! low-latency streaming protocol:
//! - Full control handshake: resolve, connect, authenticate, negotiate
//! - HMAC-SHA512 challenge authentication
//! - Media negotiation with automatic RTP payload type and SSRC assignment
//! - Keepalive supervision with miss budgets and connection-loss events
//! - Clean teardown with best-effort disconnect delivery
//!
//! # Example: Going Live
//!
//! ```no_run
//! use ftl_rs::{AudioComponent, VideoComponent};
//!
//! #[tokio::main]
//! async fn main() -> ftl_rs::Result<()> {
//!     ftl_rs::init()?;
//!
//!     let mut slot = None;
//!     ftl_rs::create_stream(&mut slot)?;
//!     let stream = slot.as_mut().unwrap();
//!
//!     stream.set_ingest_location("ingest.example.com")?;
//!     stream.set_authentication(1234, "aBcDeF123456")?;
//!     stream.attach_audio_component(AudioComponent::opus())?;
//!     stream.attach_video_component(VideoComponent::vp8(1920, 1080)?)?;
//!
//!     stream.activate().await?;
//!     println!("negotiated: {:?}", stream.negotiated_media());
//!     println!("media port: {:?}", stream.media_port());
//!
//!     // ... send RTP to the media port using the negotiated parameters ...
//!
//!     stream.deactivate().await?;
//!     ftl_rs::destroy_stream(&mut slot).await?;
//!     Ok(())
//! }
//! ```

pub mod component;
pub mod config;
pub mod error;
pub mod init;
pub mod net;
pub mod protocol;
pub mod session;
pub mod stats;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use component::{AudioCodec, AudioComponent, VideoCodec, VideoComponent};
pub use config::FtlConfig;
pub use error::{FtlError, Result};
pub use init::init;
pub use session::{HandshakePhase, MediaPlan, NegotiatedComponent, SessionEvent, StreamState};
pub use stats::SessionStats;
pub use stream::{create_stream, create_stream_with_config, destroy_stream, FtlStream};
