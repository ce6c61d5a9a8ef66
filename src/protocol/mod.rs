//! FTL control protocol: constants, wire framing, and challenge auth
//!
//! Everything in here is sans-IO. The session layer owns the sockets and
//! feeds frames through these types.

pub mod auth;
pub mod constants;
pub mod wire;

pub use wire::{Command, Response, WireError};
